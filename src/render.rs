//! Rendering boundary
//!
//! Renderers only ever see a [`Snapshot`], never the controller, so a slow
//! or broken surface cannot stall sampling.

use crate::state::SessionStatus;
use crate::store::{Extent, Snapshot, StoreError};
use std::io::Write;

/// Something that draws snapshots
///
/// Return [`StoreError::ResourceUnavailable`] once the surface is gone; the
/// session then stops refreshing and the producer halts. Any other error
/// skips the frame.
pub trait Renderer: Send + 'static {
    fn render(&mut self, snapshot: &Snapshot, status: &SessionStatus) -> Result<(), StoreError>;
}

/// One text line per refresh
pub struct TerminalRenderer<W: Write + Send + 'static> {
    out: W,
}

impl<W: Write + Send + 'static> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send + 'static> Renderer for TerminalRenderer<W> {
    fn render(&mut self, snapshot: &Snapshot, status: &SessionStatus) -> Result<(), StoreError> {
        let capacity = snapshot.buffer().len();
        let latest = snapshot
            .buffer()
            .get(snapshot.write_pos)
            .copied()
            .ok_or(StoreError::IndexOutOfRange {
                position: snapshot.write_pos,
                capacity,
            })?;

        let extent = snapshot
            .last_streak()
            .and_then(|s| s.extent)
            .map(|e| describe_extent(&e))
            .unwrap_or_default();

        writeln!(
            self.out,
            "{} [{:>3}/{}] {:>12.2} | {} {}",
            if snapshot.recording { "●" } else { " " },
            snapshot.write_pos,
            capacity,
            latest,
            status.streak_text(),
            extent,
        )
        .and_then(|_| self.out.flush())
        .map_err(|e| StoreError::ResourceUnavailable(format!("terminal: {}", e)))
    }
}

/// Compact text form of a streak extent, e.g. `[0..1]+[3..4]`
pub fn describe_extent(extent: &Extent) -> String {
    extent
        .segments()
        .iter()
        .map(|s| format!("[{}..{}]", s.start, s.end))
        .collect::<Vec<_>>()
        .join("+")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ChannelSnapshot, Span, StreakSummary};
    use std::io;

    fn snapshot(samples: Vec<f64>, write_pos: usize) -> Snapshot {
        Snapshot {
            write_pos,
            total_writes: 1,
            recording: true,
            max_streak_len: None,
            channels: vec![ChannelSnapshot {
                samples,
                history: Vec::new(),
                active: Some(StreakSummary {
                    count: 4,
                    mean: 2.5,
                    standard_error: 0.65,
                    extent: Some(Extent::Wrapped {
                        head: Span::new(0, 1),
                        tail: Span::new(3, 4),
                    }),
                }),
            }],
        }
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn renders_position_value_and_streak() {
        let mut renderer = TerminalRenderer::new(Vec::new());
        let status = SessionStatus {
            last_streak: snapshot(vec![0.0; 5], 1).last_streak().cloned(),
            ..Default::default()
        };
        renderer
            .render(&snapshot(vec![0.0, 42.0, 0.0, 0.0, 0.0], 1), &status)
            .unwrap();

        let line = String::from_utf8(renderer.into_inner()).unwrap();
        assert!(line.contains("[  1/5]"), "{line}");
        assert!(line.contains("42.00"), "{line}");
        assert!(line.contains("Last streak = 2.50 ± 0.65"), "{line}");
        assert!(line.contains("[0..1]+[3..4]"), "{line}");
    }

    #[test]
    fn bad_write_position_is_an_index_error() {
        let mut renderer = TerminalRenderer::new(Vec::new());
        let err = renderer
            .render(&snapshot(vec![0.0; 3], 7), &SessionStatus::default())
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::IndexOutOfRange {
                position: 7,
                capacity: 3
            }
        );
    }

    #[test]
    fn closed_output_is_resource_unavailable() {
        let mut renderer = TerminalRenderer::new(ClosedPipe);
        let err = renderer
            .render(&snapshot(vec![0.0; 5], 0), &SessionStatus::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::ResourceUnavailable(_)));
    }

    #[test]
    fn describe_extent_lists_segments() {
        assert_eq!(describe_extent(&Extent::Simple(Span::new(2, 6))), "[2..6]");
        assert_eq!(describe_extent(&Extent::Full(Span::new(0, 79))), "[0..79]");
    }
}
