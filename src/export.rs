//! Streak export and plot capture
//!
//! Runs outside the controller lock: it only ever sees closed streaks,
//! which are immutable, and snapshots, which are copies.

use crate::store::{Snapshot, Streak};
use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Timestamp used in file names
const STAMP_FORMAT: &str = "%S%M%H%d%m%y";

/// Export errors
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Nothing to export")]
    Empty,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Writes closed streaks and plot captures into one directory
#[derive(Debug, Clone)]
pub struct Exporter {
    output_dir: PathBuf,
}

impl Exporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Save streaks to `data<stamp>.csv`, one row per streak
    pub fn export_streaks(&self, streaks: &[Arc<Streak>]) -> Result<PathBuf, ExportError> {
        if streaks.is_empty() {
            return Err(ExportError::Empty);
        }
        let (file, path) = self.create_stamped("data", "csv")?;
        write_streak_rows(file, streaks)?;
        log::info!("Saved {} streak(s) to {}", streaks.len(), path.display());
        Ok(path)
    }

    /// Save a snapshot to `sound<stamp>.json`
    pub fn capture_plot(&self, snapshot: &Snapshot) -> Result<PathBuf, ExportError> {
        let (mut file, path) = self.create_stamped("sound", "json")?;
        serde_json::to_writer(&mut file, snapshot)?;
        file.flush()?;
        log::info!("Plot captured to {}", path.display());
        Ok(path)
    }

    fn create_stamped(&self, prefix: &str, extension: &str) -> io::Result<(File, PathBuf)> {
        let stamp = Local::now().format(STAMP_FORMAT).to_string();
        create_unique(&self.output_dir, &format!("{prefix}{stamp}"), extension)
    }
}

/// Create `<stem>.<ext>` in `dir`, or `<stem>-N.<ext>` with the first free N.
///
/// Never opens an existing file, so two exports in the same second cannot
/// overwrite each other.
fn create_unique(dir: &Path, stem: &str, extension: &str) -> io::Result<(File, PathBuf)> {
    let mut n = 0;
    loop {
        let name = match n {
            0 => format!("{stem}.{extension}"),
            _ => format!("{stem}-{n}.{extension}"),
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((file, path)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => n += 1,
            Err(e) => return Err(e),
        }
    }
}

/// One CSV row per streak: the raw samples when retained, else
/// `count, mean, standard_error`
pub fn write_streak_rows<W: Write>(writer: W, streaks: &[Arc<Streak>]) -> Result<(), ExportError> {
    let mut rows = csv::WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_writer(writer);

    for streak in streaks {
        let row: Vec<String> = match streak.samples() {
            Some(samples) => samples.iter().map(|v| v.to_string()).collect(),
            None => vec![
                streak.len().to_string(),
                streak.mean().to_string(),
                streak.standard_error().to_string(),
            ],
        };
        rows.write_record(&row)?;
    }
    rows.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ControllerOptions, SamplingController, WrapPolicy};

    fn closed_streak(values: &[f64], retain: bool) -> Arc<Streak> {
        let mut streak = Streak::new(16, WrapPolicy::Accumulate, retain);
        for (i, &v) in values.iter().enumerate() {
            streak.extend(i, v);
        }
        Arc::new(streak)
    }

    #[test]
    fn retained_samples_are_written_as_one_row() {
        let mut out = Vec::new();
        write_streak_rows(&mut out, &[closed_streak(&[1.5, 2.0, 3.25], true)]).unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "1.5,2,3.25\n");
    }

    #[test]
    fn summary_row_without_retained_samples() {
        let mut out = Vec::new();
        write_streak_rows(&mut out, &[closed_streak(&[10.0, 20.0, 30.0], false)]).unwrap();

        let text = String::from_utf8(out).unwrap();
        let fields: Vec<&str> = text.trim_end().split(',').collect();
        assert_eq!(fields[0], "3");
        assert_eq!(fields[1], "20");
        assert!(fields[2].starts_with("5.77"));
    }

    #[test]
    fn export_creates_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = Exporter::new(dir.path());
        let streaks = [closed_streak(&[1.0, 2.0], true)];

        let first = exporter.export_streaks(&streaks).unwrap();
        let second = exporter.export_streaks(&streaks).unwrap();

        assert_ne!(first, second);
        assert!(first.file_name().unwrap().to_string_lossy().starts_with("data"));
        assert_eq!(std::fs::read_to_string(&second).unwrap(), "1,2\n");
    }

    #[test]
    fn existing_files_are_never_truncated() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data010203.csv"), "keep").unwrap();
        std::fs::write(dir.path().join("data010203-1.csv"), "keep too").unwrap();

        let (mut file, path) = create_unique(dir.path(), "data010203", "csv").unwrap();
        file.write_all(b"new").unwrap();

        assert_eq!(path, dir.path().join("data010203-2.csv"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("data010203.csv")).unwrap(),
            "keep"
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("data010203-1.csv")).unwrap(),
            "keep too"
        );
    }

    #[test]
    fn export_of_nothing_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = Exporter::new(dir.path());
        assert!(matches!(exporter.export_streaks(&[]), Err(ExportError::Empty)));
    }

    #[test]
    fn capture_plot_writes_snapshot_json() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = Exporter::new(dir.path());
        let controller = SamplingController::new(ControllerOptions {
            capacity: 4,
            ..Default::default()
        })
        .unwrap();
        controller.on_sample(7.0).unwrap();

        let path = exporter.capture_plot(&controller.snapshot()).unwrap();
        let restored: Snapshot =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();

        assert_eq!(restored.buffer(), &[7.0, 0.0, 0.0, 0.0]);
        assert_eq!(restored.write_pos, 0);
    }
}
