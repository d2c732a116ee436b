//! Async test helpers
//!
//! Timeouts around channel receives and session events, so a missing event
//! fails the test instead of hanging it.

use crate::core_session::handle::{ScreenView, SessionEvent, SessionHandle};
use std::future::Future;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration, Instant};

/// Default wait used by session tests
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecvTimeoutError {
    #[error("receive operation timed out")]
    Timeout,
    #[error("channel closed")]
    Closed,
}

/// Receive from a channel with a timeout
pub async fn recv_timeout<T>(
    rx: &mut mpsc::Receiver<T>,
    duration: Duration,
) -> Result<T, RecvTimeoutError> {
    timeout(duration, rx.recv())
        .await
        .map_err(|_| RecvTimeoutError::Timeout)?
        .ok_or(RecvTimeoutError::Closed)
}

/// Run a future with a timeout
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> Result<T, RecvTimeoutError>
where
    F: Future<Output = T>,
{
    timeout(duration, future)
        .await
        .map_err(|_| RecvTimeoutError::Timeout)
}

/// Wait for the first session event matching `predicate`, skipping others
pub async fn next_matching<P>(
    handle: &SessionHandle,
    duration: Duration,
    mut predicate: P,
) -> Result<SessionEvent, RecvTimeoutError>
where
    P: FnMut(&SessionEvent) -> bool,
{
    let deadline = Instant::now() + duration;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let event = timeout(remaining, handle.next_event())
            .await
            .map_err(|_| RecvTimeoutError::Timeout)?
            .ok_or(RecvTimeoutError::Closed)?;
        if predicate(&event) {
            return Ok(event);
        }
    }
}

/// Wait for the next chat message sent to the player
pub async fn next_message(handle: &SessionHandle) -> Result<String, RecvTimeoutError> {
    match next_matching(handle, EVENT_TIMEOUT, |e| matches!(e, SessionEvent::Message { .. })).await? {
        SessionEvent::Message { text, .. } => Ok(text),
        _ => Err(RecvTimeoutError::Closed),
    }
}

/// Wait for a rendered screen showing a cell labelled `label`
pub async fn next_screen_with(
    handle: &SessionHandle,
    label: &str,
) -> Result<ScreenView, RecvTimeoutError> {
    let shown = next_matching(handle, EVENT_TIMEOUT, |e| match e {
        SessionEvent::ScreenShown { view, .. } => view.grid.occupied().any(|(_, c)| c.label == label),
        _ => false,
    })
    .await?;
    match shown {
        SessionEvent::ScreenShown { view, .. } => Ok(view),
        _ => Err(RecvTimeoutError::Closed),
    }
}

/// Slot of the first cell labelled `label`
pub fn slot_of(view: &ScreenView, label: &str) -> Option<usize> {
    view.grid
        .occupied()
        .find(|(_, c)| c.label == label)
        .map(|(slot, _)| slot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recv_timeout() {
        let (tx, mut rx) = mpsc::channel::<u32>(1);
        assert_eq!(
            recv_timeout(&mut rx, Duration::from_millis(10)).await,
            Err(RecvTimeoutError::Timeout)
        );
        tx.send(3).await.unwrap();
        assert_eq!(recv_timeout(&mut rx, Duration::from_millis(10)).await, Ok(3));
        drop(tx);
        assert_eq!(
            recv_timeout(&mut rx, Duration::from_millis(10)).await,
            Err(RecvTimeoutError::Closed)
        );
    }
}
