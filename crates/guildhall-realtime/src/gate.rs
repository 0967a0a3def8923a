//! Network readiness gating.
//!
//! Constrained mobile transports drop requests issued while the host is
//! still settling its network stack, which shows up as first-request
//! hangs. Downstream components await this gate before their first call:
//! it opens once the host signals load-complete and the transport's
//! stabilization delay has elapsed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

/// Transport environment the gate is running on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransportProfile {
    /// Desktop-class transport; opens as soon as the host has loaded.
    #[default]
    Stable,
    /// Constrained or mobile transport; waits out radio/webview settling
    /// after the load signal.
    Constrained,
}

impl TransportProfile {
    /// Stabilization delay applied after the host load signal.
    pub fn stabilization_delay(&self) -> Duration {
        match self {
            TransportProfile::Stable => Duration::ZERO,
            TransportProfile::Constrained => Duration::from_millis(1500),
        }
    }
}

/// One-time asynchronous barrier for the first network call.
///
/// The ready signal exists from construction, so [`wait_ready`] can be
/// called before any setup effect has run and will neither hang forever
/// nor resolve early. Resolution is monotonic: once open, every later
/// call returns immediately.
///
/// [`wait_ready`]: ReadinessGate::wait_ready
#[derive(Debug)]
pub struct ReadinessGate {
    profile: TransportProfile,
    ready_tx: watch::Sender<bool>,
    loaded: AtomicBool,
}

impl ReadinessGate {
    pub fn new(profile: TransportProfile) -> Self {
        let (ready_tx, _) = watch::channel(false);
        Self {
            profile,
            ready_tx,
            loaded: AtomicBool::new(false),
        }
    }

    /// Host signal that initial load has finished.
    ///
    /// Idempotent; the first call starts the stabilization countdown.
    pub fn notify_loaded(&self) {
        if self.loaded.swap(true, Ordering::SeqCst) {
            return;
        }
        let delay = self.profile.stabilization_delay();
        let tx = self.ready_tx.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            debug!("readiness gate open");
            // send_replace stores the value even while nobody is waiting
            // yet; a plain send would be lost without receivers.
            tx.send_replace(true);
        });
    }

    /// Wait until the gate is open. Returns immediately once open.
    pub async fn wait_ready(&self) {
        let mut rx = self.ready_tx.subscribe();
        // wait_for covers the already-open case without racing the send.
        let _ = rx.wait_for(|ready| *ready).await;
    }

    pub fn is_ready(&self) -> bool {
        *self.ready_tx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_wait_before_setup_stays_pending_until_delay() {
        let gate = ReadinessGate::new(TransportProfile::Constrained);

        // Awaitable from the very first synchronous moment, before any
        // load signal exists.
        let mut waiting = tokio_test::task::spawn(gate.wait_ready());
        assert!(waiting.poll().is_pending());

        gate.notify_loaded();
        tokio::task::yield_now().await;
        assert!(waiting.poll().is_pending(), "load signal alone must not open the gate");

        // Part of the stabilization window: still closed.
        tokio::time::advance(Duration::from_millis(700)).await;
        tokio::task::yield_now().await;
        assert!(waiting.poll().is_pending());

        // Past the window: open.
        tokio::time::advance(Duration::from_millis(900)).await;
        tokio::task::yield_now().await;
        assert!(waiting.poll().is_ready());
        assert!(gate.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_is_monotonic() {
        let gate = ReadinessGate::new(TransportProfile::Stable);
        gate.notify_loaded();
        gate.wait_ready().await;

        // Second signal is a no-op; later waits return immediately.
        gate.notify_loaded();
        gate.wait_ready().await;
        assert!(gate.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stable_profile_opens_on_load() {
        let gate = ReadinessGate::new(TransportProfile::Stable);
        assert!(!gate.is_ready());
        gate.notify_loaded();
        gate.wait_ready().await;
        assert!(gate.is_ready());
    }
}
