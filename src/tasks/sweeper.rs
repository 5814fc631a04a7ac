//! Expiry Sweep Task
//!
//! Background task that periodically removes expired cache entries.

use std::sync::Weak;
use std::thread;
use std::time::Duration;

use tokio::runtime::Builder;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::Result;

/// Something the sweeper can purge of expired entries.
pub trait ExpirySweep: Send + Sync + 'static {
    /// Removes every expired entry and returns how many were dropped.
    fn remove_expired(&self) -> usize;
}

// == Sweeper Handle ==
/// Owning handle to a running sweep task.
///
/// Stopping is idempotent. Dropping the handle stops the task too.
#[derive(Debug)]
pub struct Sweeper {
    token: CancellationToken,
    interval: Duration,
}

impl Sweeper {
    /// Signals the task to stop. Calling this more than once is a no-op.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Spawns a task that calls [`ExpirySweep::remove_expired`] every `interval`.
///
/// The task only holds a weak reference to `target` and exits once the target
/// is dropped or the returned [`Sweeper`] is stopped. The task always runs on
/// its own thread driving a current-thread runtime, so it is independent of
/// any runtime the caller happens to be inside.
///
/// # Arguments
/// * `target` - Weak reference to the structure to sweep
/// * `interval` - Time between sweep passes, must be non-zero
///
/// # Example
/// ```ignore
/// let sweeper = spawn_sweeper(Arc::downgrade(&shared), Duration::from_secs(1))?;
/// // Later:
/// sweeper.stop();
/// ```
pub fn spawn_sweeper<T: ExpirySweep>(target: Weak<T>, interval: Duration) -> Result<Sweeper> {
    let token = CancellationToken::new();
    let task = run_sweeper(target, interval, token.clone());
    let failed = token.clone();

    thread::Builder::new()
        .name("incache-sweeper".to_string())
        .spawn(move || match Builder::new_current_thread().enable_time().build() {
            Ok(runtime) => runtime.block_on(task),
            Err(err) => {
                error!("Failed to build sweeper runtime: {}", err);
                failed.cancel();
            }
        })?;

    Ok(Sweeper { token, interval })
}

async fn run_sweeper<T: ExpirySweep>(
    target: Weak<T>,
    interval: Duration,
    token: CancellationToken,
) {
    // Whatever ends the loop, the handle must report the sweeper as stopped
    let _stopped = token.clone().drop_guard();
    info!("Starting expiry sweeper with interval of {:?}", interval);

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;

            _ = token.cancelled() => {
                debug!("Expiry sweeper stopped");
                break;
            }

            _ = ticker.tick() => {
                let Some(cache) = target.upgrade() else {
                    debug!("Expiry sweeper exiting: cache dropped");
                    break;
                };

                let removed = cache.remove_expired();
                if removed > 0 {
                    info!("Expiry sweep: removed {} expired entries", removed);
                } else {
                    debug!("Expiry sweep: no expired entries found");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct PassCounter {
        passes: AtomicUsize,
    }

    impl ExpirySweep for PassCounter {
        fn remove_expired(&self) -> usize {
            self.passes.fetch_add(1, Ordering::SeqCst);
            0
        }
    }

    #[tokio::test]
    async fn test_sweeper_runs_periodically() {
        let target = Arc::new(PassCounter::default());
        let sweeper = spawn_sweeper(Arc::downgrade(&target), Duration::from_millis(20)).unwrap();

        tokio::time::sleep(Duration::from_millis(110)).await;

        assert!(target.passes.load(Ordering::SeqCst) >= 2);
        sweeper.stop();
    }

    #[tokio::test]
    async fn test_sweeper_stop_is_idempotent() {
        let target = Arc::new(PassCounter::default());
        let sweeper = spawn_sweeper(Arc::downgrade(&target), Duration::from_millis(20)).unwrap();

        sweeper.stop();
        sweeper.stop();
        assert!(sweeper.is_stopped());

        tokio::time::sleep(Duration::from_millis(30)).await;
        let after_stop = target.passes.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(target.passes.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_sweeper_without_runtime_uses_thread() {
        let target = Arc::new(PassCounter::default());
        let sweeper = spawn_sweeper(Arc::downgrade(&target), Duration::from_millis(20)).unwrap();

        thread::sleep(Duration::from_millis(150));

        assert!(target.passes.load(Ordering::SeqCst) >= 2);
        assert_eq!(sweeper.interval(), Duration::from_millis(20));
        drop(sweeper);
    }

    #[test]
    fn test_sweeper_reports_stopped_when_target_dropped() {
        let target = Arc::new(PassCounter::default());
        let sweeper = spawn_sweeper(Arc::downgrade(&target), Duration::from_millis(10)).unwrap();
        assert!(!sweeper.is_stopped());

        drop(target);
        thread::sleep(Duration::from_millis(80));

        assert!(sweeper.is_stopped());
    }

    #[test]
    fn test_sweeper_outlives_spawning_runtime() {
        let target = Arc::new(PassCounter::default());
        let runtime = Builder::new_current_thread().enable_all().build().unwrap();
        let sweeper = runtime
            .block_on(async { spawn_sweeper(Arc::downgrade(&target), Duration::from_millis(20)) })
            .unwrap();
        drop(runtime);

        let before = target.passes.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(150));

        assert!(target.passes.load(Ordering::SeqCst) >= before + 2);
        assert!(!sweeper.is_stopped());
    }
}
