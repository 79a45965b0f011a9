//! Listening session: wires the producer, the controller and the UI together
//!
//! The producer (capture thread) writes into the controller and posts a
//! [`SessionEvent`] per sample. A single consumer task owns the renderer and
//! the exporter; it applies user [`Command`]s, exports streaks closed by
//! auto-stop, and redraws on a fixed refresh tick. Dropping the consumer
//! closes the event channel, which halts the producer on its next sample.

use crate::export::Exporter;
use crate::render::Renderer;
use crate::state::SessionStatus;
use crate::store::{SamplingController, StoreError, Streak};
use parking_lot::Mutex;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[cfg(feature = "capture")]
use crate::audio::AudioCaptureHandle;

/// User actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ClearPoints,
    ClearStreaks,
    StartStreak,
    StopStreak,
    /// `None` removes the limit
    SetStreakLimit(Option<usize>),
    SetExportOnStop(bool),
    CapturePlot,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command: {0}")]
    Unknown(String),

    #[error("Invalid argument for {command}: {argument}")]
    InvalidArgument { command: String, argument: String },
}

impl FromStr for Command {
    type Err = CommandParseError;

    /// Parse a console line such as `start`, `limit 20` or `export off`
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let name = words.next().ok_or(CommandParseError::Empty)?;
        let argument = words.next();

        let invalid = |arg: &str| CommandParseError::InvalidArgument {
            command: name.to_string(),
            argument: arg.to_string(),
        };

        match (name, argument) {
            ("clear-points", None) => Ok(Command::ClearPoints),
            ("clear-streaks", None) => Ok(Command::ClearStreaks),
            ("start", None) => Ok(Command::StartStreak),
            ("stop", None) => Ok(Command::StopStreak),
            ("capture", None) => Ok(Command::CapturePlot),
            ("limit", Some("off")) => Ok(Command::SetStreakLimit(None)),
            ("limit", Some(arg)) => arg
                .parse::<usize>()
                .map(|n| Command::SetStreakLimit(Some(n).filter(|&n| n > 0)))
                .map_err(|_| invalid(arg)),
            ("export", Some("on")) => Ok(Command::SetExportOnStop(true)),
            ("export", Some("off")) => Ok(Command::SetExportOnStop(false)),
            ("export", Some(arg)) => Err(invalid(arg)),
            ("limit" | "export", None) => Err(invalid("")),
            _ => Err(CommandParseError::Unknown(line.trim().to_string())),
        }
    }
}

/// Posted by the producer after every stored sample
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Sampled {
        position: usize,
        /// Streaks closed by auto-stop on this sample
        closed: Vec<Arc<Streak>>,
    },
}

/// Write side of a session, handed to the capture thread
pub struct Producer {
    controller: Arc<SamplingController>,
    events: mpsc::UnboundedSender<SessionEvent>,
    halted: AtomicBool,
}

impl Producer {
    /// Store one frame and notify the consumer.
    ///
    /// Once the consumer is gone this returns
    /// [`StoreError::ResourceUnavailable`] and keeps returning it.
    pub fn feed(&self, frame: &[f64]) -> Result<usize, StoreError> {
        if self.is_halted() {
            return Err(StoreError::ResourceUnavailable("session closed".into()));
        }

        let written = self.controller.on_frame(frame)?;
        let event = SessionEvent::Sampled {
            position: written.position,
            closed: written.closed,
        };
        if self.events.send(event).is_err() {
            self.halt();
            log::warn!("Session consumer is gone, producer halting");
            return Err(StoreError::ResourceUnavailable("session closed".into()));
        }
        Ok(written.position)
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    pub fn halt(&self) {
        self.halted.store(true, Ordering::Release);
    }
}

/// Session timing and export settings
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub refresh: Duration,
    pub export_on_stop: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            refresh: Duration::from_millis(100),
            export_on_stop: true,
        }
    }
}

/// Handle to a running session
pub struct Session {
    controller: Arc<SamplingController>,
    status: Arc<Mutex<SessionStatus>>,
    command_tx: mpsc::UnboundedSender<Command>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    task: Option<JoinHandle<()>>,
    #[cfg(feature = "capture")]
    capture: Option<AudioCaptureHandle>,
}

impl Session {
    /// Start the consumer task. Must be called inside a tokio runtime.
    pub fn spawn(
        controller: Arc<SamplingController>,
        renderer: Box<dyn Renderer>,
        exporter: Exporter,
        options: SessionOptions,
    ) -> (Session, Producer) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let status = Arc::new(Mutex::new(SessionStatus {
            export_on_stop: options.export_on_stop,
            max_streak_len: controller.snapshot().max_streak_len,
            ..Default::default()
        }));

        let consumer = Consumer {
            controller: controller.clone(),
            status: status.clone(),
            renderer,
            exporter,
        };
        let task = tokio::spawn(run_consumer(
            consumer,
            command_rx,
            event_rx,
            shutdown_rx,
            options.refresh,
        ));

        let producer = Producer {
            controller: controller.clone(),
            events: event_tx,
            halted: AtomicBool::new(false),
        };

        let session = Session {
            controller,
            status,
            command_tx,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
            #[cfg(feature = "capture")]
            capture: None,
        };
        (session, producer)
    }

    /// Keep the capture thread alive for as long as the session
    #[cfg(feature = "capture")]
    pub fn attach_capture(&mut self, capture: AudioCaptureHandle) {
        if let Some(mut previous) = self.capture.replace(capture) {
            previous.stop();
        }
    }

    /// Queue a command for the consumer
    pub fn send(&self, command: Command) -> Result<(), StoreError> {
        self.command_tx
            .send(command)
            .map_err(|_| StoreError::ResourceUnavailable("session closed".into()))
    }

    pub fn status(&self) -> SessionStatus {
        self.status.lock().clone()
    }

    pub fn controller(&self) -> &Arc<SamplingController> {
        &self.controller
    }

    /// Stop capture, then the consumer, and wait for it to finish
    pub async fn close(mut self) {
        // Joining the capture thread blocks
        #[cfg(feature = "capture")]
        if let Some(mut capture) = self.capture.take() {
            if let Err(e) = tokio::task::spawn_blocking(move || capture.stop()).await {
                log::error!("Failed to stop audio capture: {}", e);
            }
        }

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log::error!("Session consumer panicked: {}", e);
            }
        }
    }
}

struct Consumer {
    controller: Arc<SamplingController>,
    status: Arc<Mutex<SessionStatus>>,
    renderer: Box<dyn Renderer>,
    exporter: Exporter,
}

impl Consumer {
    fn apply(&mut self, command: Command) {
        log::debug!("Applying {:?}", command);
        let outcome = match command {
            Command::ClearPoints => self.controller.clear_points().map(|_| None),
            Command::ClearStreaks => {
                self.controller.clear_streaks();
                Ok(None)
            }
            Command::StartStreak => self.controller.start_recording().map(|_| {
                log::info!("Streak started");
                None
            }),
            Command::StopStreak => self.controller.stop_recording().map(|closed| {
                log::info!("Streak stopped");
                self.export_closed(&closed);
                None
            }),
            Command::SetStreakLimit(limit) => {
                self.controller.set_max_streak_len(limit);
                self.status.lock().max_streak_len = limit;
                Ok(None)
            }
            Command::SetExportOnStop(enabled) => {
                self.status.lock().export_on_stop = enabled;
                Ok(None)
            }
            Command::CapturePlot => {
                let snapshot = self.controller.snapshot();
                match self.exporter.capture_plot(&snapshot) {
                    Ok(path) => Ok(Some(format!("Plot captured to {}", path.display()))),
                    Err(e) => {
                        log::error!("Plot capture failed: {}", e);
                        Ok(Some(format!("Plot capture failed: {}", e)))
                    }
                }
            }
        };

        match outcome {
            Ok(Some(message)) => self.status.lock().message = Some(message),
            Ok(None) => {}
            Err(e) => {
                let message = e.to_string();
                log::warn!("{}", message);
                self.status.lock().message = Some(message);
            }
        }
    }

    fn on_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Sampled { position, closed } => {
                log::trace!("Sample stored at {}", position);
                if !closed.is_empty() {
                    log::info!("Streak reached its limit and stopped");
                    self.export_closed(&closed);
                }
            }
        }
    }

    /// Export freshly closed streaks if enabled. Called with no lock held.
    fn export_closed(&mut self, closed: &[Arc<Streak>]) {
        let enabled = self.status.lock().export_on_stop;
        if !enabled || closed.is_empty() {
            return;
        }
        let message = match self.exporter.export_streaks(closed) {
            Ok(path) => format!("Saved to {}", path.display()),
            Err(e) => {
                log::error!("Streak export failed: {}", e);
                format!("Streak export failed: {}", e)
            }
        };
        self.status.lock().message = Some(message);
    }

    /// Snapshot, update the status and draw
    fn refresh(&mut self) -> Result<(), StoreError> {
        let snapshot = self.controller.snapshot();
        let status = {
            let mut status = self.status.lock();
            status.recording = snapshot.recording;
            status.max_streak_len = snapshot.max_streak_len;
            status.samples_seen = snapshot.total_writes;
            status.last_streak = snapshot.last_streak().cloned();
            status.clone()
        };
        self.renderer.render(&snapshot, &status)
    }
}

async fn run_consumer(
    mut consumer: Consumer,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    mut shutdown_rx: mpsc::Receiver<()>,
    refresh: Duration,
) {
    let mut interval = tokio::time::interval(refresh);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    log::info!("Session consumer started");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                log::info!("Session consumer received shutdown signal");
                break;
            }
            Some(command) = commands.recv() => consumer.apply(command),
            Some(event) = events.recv() => consumer.on_event(event),
            _ = interval.tick() => match consumer.refresh() {
                Ok(()) => {}
                Err(StoreError::ResourceUnavailable(reason)) => {
                    log::error!("Display unavailable ({}), stopping session", reason);
                    consumer.status.lock().message = Some(format!("Display unavailable: {}", reason));
                    break;
                }
                Err(e) => log::warn!("Skipping frame: {}", e),
            },
        }
    }

    // Closing the event channel halts the producer; streaks it closed
    // before that are still exported
    events.close();
    while let Ok(event) = events.try_recv() {
        consumer.on_event(event);
    }
    log::info!("Session consumer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ControllerOptions, Snapshot};
    use std::path::Path;

    /// Keeps every snapshot it is asked to draw
    struct RecordingRenderer(Arc<Mutex<Vec<Snapshot>>>);

    impl Renderer for RecordingRenderer {
        fn render(&mut self, snapshot: &Snapshot, _: &SessionStatus) -> Result<(), StoreError> {
            self.0.lock().push(snapshot.clone());
            Ok(())
        }
    }

    struct GoneRenderer;

    impl Renderer for GoneRenderer {
        fn render(&mut self, _: &Snapshot, _: &SessionStatus) -> Result<(), StoreError> {
            Err(StoreError::ResourceUnavailable("window closed".into()))
        }
    }

    fn controller(max_streak_len: Option<usize>) -> Arc<SamplingController> {
        Arc::new(
            SamplingController::new(ControllerOptions {
                capacity: 10,
                max_streak_len,
                ..Default::default()
            })
            .unwrap(),
        )
    }

    fn options() -> SessionOptions {
        SessionOptions {
            refresh: Duration::from_millis(5),
            export_on_stop: true,
        }
    }

    fn csv_files(dir: &Path) -> Vec<std::path::PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.extension().is_some_and(|e| e == "csv"))
            .collect()
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..400 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[test]
    fn parses_console_commands() {
        assert_eq!("start".parse(), Ok(Command::StartStreak));
        assert_eq!(" stop ".parse(), Ok(Command::StopStreak));
        assert_eq!("clear-points".parse(), Ok(Command::ClearPoints));
        assert_eq!("clear-streaks".parse(), Ok(Command::ClearStreaks));
        assert_eq!("capture".parse(), Ok(Command::CapturePlot));
        assert_eq!("limit 20".parse(), Ok(Command::SetStreakLimit(Some(20))));
        assert_eq!("limit 0".parse(), Ok(Command::SetStreakLimit(None)));
        assert_eq!("limit off".parse(), Ok(Command::SetStreakLimit(None)));
        assert_eq!("export off".parse(), Ok(Command::SetExportOnStop(false)));
        assert_eq!("export on".parse(), Ok(Command::SetExportOnStop(true)));
    }

    #[test]
    fn rejects_bad_commands() {
        assert_eq!("".parse::<Command>(), Err(CommandParseError::Empty));
        assert!(matches!(
            "jump".parse::<Command>(),
            Err(CommandParseError::Unknown(_))
        ));
        assert!(matches!(
            "limit many".parse::<Command>(),
            Err(CommandParseError::InvalidArgument { .. })
        ));
        assert!(matches!(
            "export".parse::<Command>(),
            Err(CommandParseError::InvalidArgument { .. })
        ));
    }

    #[tokio::test]
    async fn stop_exports_the_streak() {
        let dir = tempfile::tempdir().unwrap();
        let frames = Arc::new(Mutex::new(Vec::new()));
        let controller = controller(None);
        let (session, producer) = Session::spawn(
            controller.clone(),
            Box::new(RecordingRenderer(frames.clone())),
            Exporter::new(dir.path()),
            options(),
        );

        session.send(Command::StartStreak).unwrap();
        wait_until(|| controller.is_recording()).await;
        for v in [1.0, 2.0, 3.0] {
            producer.feed(&[v]).unwrap();
        }
        session.send(Command::StopStreak).unwrap();
        wait_until(|| csv_files(dir.path()).len() == 1).await;

        let path = &csv_files(dir.path())[0];
        assert_eq!(std::fs::read_to_string(path).unwrap(), "1,2,3\n");

        wait_until(|| {
            let status = session.status();
            status.samples_seen == 3 && !status.recording
        })
        .await;
        let status = session.status();
        assert_eq!(status.last_streak.unwrap().mean, 2.0);
        assert!(!frames.lock().is_empty());

        session.close().await;
    }

    #[tokio::test]
    async fn auto_stop_exports_without_a_command() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(Some(3));
        let (session, producer) = Session::spawn(
            controller.clone(),
            Box::new(RecordingRenderer(Arc::default())),
            Exporter::new(dir.path()),
            options(),
        );

        session.send(Command::StartStreak).unwrap();
        wait_until(|| controller.is_recording()).await;
        for v in [4.0, 5.0, 6.0, 7.0] {
            producer.feed(&[v]).unwrap();
        }
        assert!(!controller.is_recording());

        wait_until(|| csv_files(dir.path()).len() == 1).await;
        let path = &csv_files(dir.path())[0];
        assert_eq!(std::fs::read_to_string(path).unwrap(), "4,5,6\n");

        session.close().await;
    }

    #[tokio::test]
    async fn streak_closed_right_before_close_is_still_exported() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(Some(3));
        let (session, producer) = Session::spawn(
            controller.clone(),
            Box::new(RecordingRenderer(Arc::default())),
            Exporter::new(dir.path()),
            SessionOptions {
                refresh: Duration::from_secs(60),
                export_on_stop: true,
            },
        );

        // Nothing below yields, so the events are still queued at close
        controller.start_recording().unwrap();
        for v in [7.0, 8.0, 9.0] {
            producer.feed(&[v]).unwrap();
        }
        session.close().await;

        let files = csv_files(dir.path());
        assert_eq!(files.len(), 1);
        assert_eq!(std::fs::read_to_string(&files[0]).unwrap(), "7,8,9\n");
    }

    #[tokio::test]
    async fn clear_points_while_recording_sets_a_message() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(None);
        let (session, producer) = Session::spawn(
            controller.clone(),
            Box::new(RecordingRenderer(Arc::default())),
            Exporter::new(dir.path()),
            options(),
        );

        producer.feed(&[5.0]).unwrap();
        session.send(Command::StartStreak).unwrap();
        session.send(Command::ClearPoints).unwrap();
        wait_until(|| session.status().message.is_some()).await;

        assert_eq!(
            session.status().message.as_deref(),
            Some("Cannot clear points while recording")
        );
        assert_eq!(controller.snapshot().buffer()[0], 5.0);
        session.close().await;
    }

    #[tokio::test]
    async fn export_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(None);
        let (session, producer) = Session::spawn(
            controller.clone(),
            Box::new(RecordingRenderer(Arc::default())),
            Exporter::new(dir.path()),
            options(),
        );

        session.send(Command::SetExportOnStop(false)).unwrap();
        session.send(Command::StartStreak).unwrap();
        wait_until(|| controller.is_recording()).await;
        producer.feed(&[1.0]).unwrap();
        session.send(Command::StopStreak).unwrap();
        wait_until(|| !controller.is_recording()).await;
        wait_until(|| session.status().samples_seen == 1).await;

        assert!(csv_files(dir.path()).is_empty());
        session.close().await;
    }

    #[tokio::test]
    async fn rejected_command_sets_a_message() {
        let dir = tempfile::tempdir().unwrap();
        let (session, _producer) = Session::spawn(
            controller(None),
            Box::new(RecordingRenderer(Arc::default())),
            Exporter::new(dir.path()),
            options(),
        );

        session.send(Command::StopStreak).unwrap();
        wait_until(|| session.status().message.is_some()).await;
        assert_eq!(
            session.status().message.as_deref(),
            Some("Cannot stop a streak while idle")
        );

        session.close().await;
    }

    #[tokio::test]
    async fn producer_halts_after_close() {
        let dir = tempfile::tempdir().unwrap();
        let (session, producer) = Session::spawn(
            controller(None),
            Box::new(RecordingRenderer(Arc::default())),
            Exporter::new(dir.path()),
            options(),
        );
        producer.feed(&[1.0]).unwrap();

        session.close().await;

        assert!(matches!(
            producer.feed(&[2.0]),
            Err(StoreError::ResourceUnavailable(_))
        ));
        assert!(producer.is_halted());
        assert!(matches!(
            producer.feed(&[3.0]),
            Err(StoreError::ResourceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn lost_display_ends_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let (session, producer) = Session::spawn(
            controller(None),
            Box::new(GoneRenderer),
            Exporter::new(dir.path()),
            options(),
        );

        wait_until(|| producer.feed(&[1.0]).is_err()).await;
        assert!(producer.is_halted());
        assert!(session
            .status()
            .message
            .is_some_and(|m| m.contains("window closed")));
        wait_until(|| session.send(Command::ClearPoints).is_err()).await;
    }

    #[tokio::test]
    async fn wrong_frame_width_is_reported_not_sent() {
        let dir = tempfile::tempdir().unwrap();
        let (session, producer) = Session::spawn(
            controller(None),
            Box::new(RecordingRenderer(Arc::default())),
            Exporter::new(dir.path()),
            options(),
        );

        assert_eq!(
            producer.feed(&[1.0, 2.0]),
            Err(StoreError::FrameWidth {
                expected: 1,
                actual: 2
            })
        );
        assert!(!producer.is_halted());
        session.close().await;
    }
}
