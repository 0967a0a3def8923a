//! Stream utilities for feed plumbing.

use std::pin::Pin;

use futures::Stream;
use tokio::sync::broadcast;

/// Convert a broadcast receiver into an async stream.
///
/// `Lagged` is tolerated by continuing with subsequent items (older ones
/// are lost); consumers reconcile via a full reload, never by assuming
/// feed continuity.
pub fn broadcast_to_stream<T: Clone + Send + 'static>(
    mut rx: broadcast::Receiver<T>,
) -> Pin<Box<dyn Stream<Item = T> + Send>> {
    Box::pin(async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(item) => yield item,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
