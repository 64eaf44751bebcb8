//! Periodic pointer sampling.
//!
//! OS hooks only report motion, so a cursor resting on an edge produces no
//! events.  The sampler polls [`CursorController::cursor_position`] on a fixed
//! interval and feeds each reading to the router, which is what lets the
//! edge dwell elapse while the mouse is still.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::route_input::{CursorController, EventRouter};

/// Samples the cursor every `interval` until `cancel` fires.
pub async fn run_pointer_sampler(
    router: Arc<EventRouter>,
    cursor: Arc<dyn CursorController>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    debug!(?interval, "pointer sampler started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            tick = ticker.tick() => {
                let (x, y) = cursor.cursor_position();
                if let Err(e) = router.handle_pointer_sample(x, y, tick.into_std()).await {
                    warn!(error = %e, "pointer sample could not be applied");
                }
            }
        }
    }
    debug!("pointer sampler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::route_input::MessageSink;
    use crate::infrastructure::cursor::RecordingCursor;
    use crate::infrastructure::input_capture::mock::MockInputSource;
    use mkshare_core::protocol::{ControlTransferMessage, KeyCode, Message};
    use mkshare_core::{Edge, Owner, OwnershipConfig, ScreenGeometry, SessionError};
    use std::sync::Mutex;

    #[derive(Default)]
    struct CollectingSink(Mutex<Vec<Message>>);

    impl MessageSink for CollectingSink {
        fn is_active(&self) -> bool {
            true
        }

        fn send(&self, message: Message) -> Result<(), SessionError> {
            self.0.lock().unwrap().push(message);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_resting_cursor_on_edge_transfers_once() {
        // Arrange – cursor parked 3 px from the right edge, sampled at 20 Hz
        let sink = Arc::new(CollectingSink::default());
        let cursor = Arc::new(RecordingCursor::at(1917, 540));
        let router = Arc::new(EventRouter::new(
            OwnershipConfig {
                edges: vec![Edge::Right],
                edge_threshold_px: 5,
                edge_dwell: Duration::from_millis(300),
            },
            ScreenGeometry::single(1920, 1080),
            KeyCode::ESCAPE,
            sink.clone(),
            cursor.clone(),
            Arc::new(MockInputSource::new()),
        ));
        // The transfer warps the cursor to the centre; pin it back to the edge
        // so later samples keep landing in the band.
        cursor.pin(true);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_pointer_sampler(
            Arc::clone(&router),
            cursor.clone(),
            Duration::from_millis(50),
            cancel.clone(),
        ));

        // Act
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        task.await.unwrap();

        // Assert
        assert_eq!(router.owner().await, Owner::Remote);
        assert_eq!(
            *sink.0.lock().unwrap(),
            vec![Message::ControlTransfer(ControlTransferMessage::to_remote(
                Edge::Right
            ))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cursor_away_from_edges_never_transfers() {
        let sink = Arc::new(CollectingSink::default());
        let cursor = Arc::new(RecordingCursor::at(900, 500));
        let router = Arc::new(EventRouter::new(
            OwnershipConfig::default(),
            ScreenGeometry::single(1920, 1080),
            KeyCode::ESCAPE,
            sink.clone(),
            cursor.clone(),
            Arc::new(MockInputSource::new()),
        ));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_pointer_sampler(
            Arc::clone(&router),
            cursor,
            Duration::from_millis(50),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(2)).await;
        cancel.cancel();
        task.await.unwrap();

        assert_eq!(router.owner().await, Owner::Local);
        assert!(sink.0.lock().unwrap().is_empty());
    }
}
