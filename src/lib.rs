//! Sonometer Library
//!
//! Captures audio, reduces it to a sliding plot of intensity (or spectrum)
//! points and records streaks over it with running mean and standard error.
//! Streaks can be exported as CSV and the plot captured as JSON.

pub mod audio;
pub mod config;
pub mod export;
pub mod render;
pub mod session;
pub mod state;
pub mod store;

use config::{ConfigError, SessionConfig};
use export::Exporter;
use render::TerminalRenderer;
use session::{Command, Session};
use store::{SamplingController, StoreError};

use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};

#[cfg(feature = "capture")]
use audio::{AudioCaptureHandle, CaptureError};

/// Errors that end the application
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[cfg(feature = "capture")]
    #[error("Audio capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run the sonometer: config from the first argument, commands from stdin
pub fn run() {
    env_logger::init();

    if let Err(e) = try_run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn try_run() -> Result<(), RunError> {
    let config = match std::env::args().nth(1) {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(listen(config))
}

async fn listen(config: SessionConfig) -> Result<(), RunError> {
    let controller = Arc::new(SamplingController::new(config.controller_options())?);
    let exporter = Exporter::new(&config.output_dir);

    #[cfg_attr(not(feature = "capture"), allow(unused_mut))]
    let (mut session, producer) = Session::spawn(
        controller,
        Box::new(TerminalRenderer::new(std::io::stdout())),
        exporter,
        config.session_options(),
    );

    #[cfg(feature = "capture")]
    {
        match audio::list_sources() {
            Ok(sources) => {
                for source in sources {
                    log::info!(
                        "Source: {} [{}]",
                        source.name,
                        source.id.as_deref().unwrap_or("default")
                    );
                }
            }
            Err(e) => log::warn!("Failed to list audio sources: {}", e),
        }

        let capture = AudioCaptureHandle::new(config.source_id.clone(), config.audio.clone(), producer)?;
        session.attach_capture(capture);
    }

    #[cfg(not(feature = "capture"))]
    {
        drop(producer);
        log::error!("Built without the capture feature, no samples will arrive");
    }

    log::info!("Commands: start, stop, clear-points, clear-streaks, limit <n|off>, export <on|off>, capture, quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            "quit" | "exit" => break,
            _ => {}
        }
        match line.parse::<Command>() {
            Ok(command) => {
                if session.send(command).is_err() {
                    log::warn!("Session has stopped");
                    break;
                }
            }
            Err(e) => log::warn!("{}", e),
        }
    }

    session.close().await;
    Ok(())
}
