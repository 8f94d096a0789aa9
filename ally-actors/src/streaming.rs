//! Periodic screenshot broadcast for remote viewers.
use crate::events::{publish, SessionEvent};
use crate::page::PageHandle;
use ally_drivers::BrowserDriver;
use anyhow::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct StreamHandle {
    fps: u32,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl StreamHandle {
    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// False once the loop has ended on its own after a capture failure.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the loop and wait for it to exit.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(target: "session.stream", error = %e, "stream task panicked");
        }
    }
}

fn frame_interval(fps: u32) -> Duration {
    Duration::from_secs_f64(1.0 / f64::from(fps.max(1)))
}

async fn capture(page: &PageHandle) -> Result<SessionEvent> {
    let png = page.screenshot().await?;
    let url = page.current_url().await?;
    Ok(SessionEvent::Screenshot {
        image: STANDARD.encode(png),
        url,
    })
}

/// Start broadcasting a frame every `1/fps` seconds until stopped.
///
/// A failed capture ends the stream.
pub fn spawn_stream(
    page: PageHandle,
    fps: u32,
    events: broadcast::Sender<SessionEvent>,
) -> StreamHandle {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let task = tokio::spawn(async move {
        let mut ticker = interval(frame_interval(fps));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(target: "session.stream", fps, "stream started");
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match capture(&page).await {
                Ok(frame) => publish(&events, frame),
                Err(e) => {
                    warn!(target: "session.stream", error = %e, "capture failed; stopping stream");
                    break;
                }
            }
        }
        debug!(target: "session.stream", "stream stopped");
    });
    StreamHandle { fps, cancel, task }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_follows_frame_rate() {
        assert_eq!(frame_interval(5), Duration::from_millis(200));
        assert_eq!(frame_interval(1), Duration::from_secs(1));
        assert_eq!(frame_interval(0), Duration::from_secs(1));
    }
}
