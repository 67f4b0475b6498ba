//! Liveness watchdog for the tick loop.
//!
//! Single-writer discipline both ways: the control loop is the only
//! writer of the heartbeat stamp, the watchdog task is the only writer
//! of the stalled flag. The watchdog never touches the fault latch,
//! actuator commands, or the curve store; a stall is reported, not acted
//! on, so a wedged loop cannot be "rescued" into commanding hardware.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Sender, bounded};

pub struct Watchdog {
    heartbeat_ms: Arc<AtomicU64>,
    stalled: Arc<AtomicBool>,
    epoch: Instant,
    shutdown: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Watchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watchdog")
            .field("stalled", &self.is_stalled())
            .finish_non_exhaustive()
    }
}

impl Watchdog {
    /// Start the monitor task. `period` is how often it samples the
    /// heartbeat; `stall_after` is the silence that counts as a stall.
    pub fn spawn(period: Duration, stall_after: Duration) -> Self {
        let heartbeat_ms = Arc::new(AtomicU64::new(0));
        let stalled = Arc::new(AtomicBool::new(false));
        let epoch = Instant::now();
        let (shutdown, shutdown_rx) = bounded::<()>(1);

        let hb = Arc::clone(&heartbeat_ms);
        let st = Arc::clone(&stalled);
        let stall_ms = stall_after.as_millis() as u64;
        let handle = std::thread::spawn(move || {
            loop {
                match shutdown_rx.recv_timeout(period) {
                    Ok(()) | Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                        let now_ms = epoch.elapsed().as_millis() as u64;
                        let last = hb.load(Ordering::Relaxed);
                        let quiet = now_ms.saturating_sub(last);
                        let is_stalled = quiet > stall_ms;
                        if is_stalled && !st.load(Ordering::Relaxed) {
                            tracing::warn!(quiet_ms = quiet, "control loop heartbeat stalled");
                        }
                        st.store(is_stalled, Ordering::Relaxed);
                    }
                }
            }
        });

        Self {
            heartbeat_ms,
            stalled,
            epoch,
            shutdown,
            handle: Some(handle),
        }
    }

    /// Stamp the heartbeat. Called once per tick by the control loop.
    pub fn beat(&self) {
        let now_ms = self.epoch.elapsed().as_millis() as u64;
        self.heartbeat_ms.store(now_ms, Ordering::Relaxed);
    }

    /// Non-blocking poll of the monitor's verdict.
    pub fn is_stalled(&self) -> bool {
        self.stalled.load(Ordering::Relaxed)
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_heartbeats_keep_it_quiet() {
        let wd = Watchdog::spawn(Duration::from_millis(5), Duration::from_millis(50));
        for _ in 0..10 {
            wd.beat();
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(!wd.is_stalled());
    }

    #[test]
    fn silence_trips_the_flag() {
        let wd = Watchdog::spawn(Duration::from_millis(5), Duration::from_millis(20));
        wd.beat();
        std::thread::sleep(Duration::from_millis(60));
        assert!(wd.is_stalled());
        // Recovery on the next beat.
        wd.beat();
        std::thread::sleep(Duration::from_millis(15));
        assert!(!wd.is_stalled());
    }

    #[test]
    fn drop_joins_the_task() {
        let wd = Watchdog::spawn(Duration::from_millis(5), Duration::from_millis(20));
        wd.beat();
        drop(wd);
    }
}
