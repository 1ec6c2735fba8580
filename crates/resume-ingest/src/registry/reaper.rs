//! Periodic removal of expired terminal tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::TaskRegistry;

pub struct TaskReaper {
    registry: Arc<TaskRegistry>,
    interval: Duration,
    retention: Duration,
    shutdown: Arc<AtomicBool>,
}

impl TaskReaper {
    pub fn new(registry: Arc<TaskRegistry>, interval: Duration, retention: Duration) -> Self {
        Self {
            registry,
            interval,
            retention,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Starts the reaping loop on a background thread.
    pub fn start(&self) -> JoinHandle<()> {
        let registry = Arc::clone(&self.registry);
        let shutdown = Arc::clone(&self.shutdown);
        let interval = self.interval;
        let retention = self.retention;

        std::thread::spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    log::error!("Failed to start task reaper runtime: {}", e);
                    return;
                }
            };

            rt.block_on(async {
                let mut timer = tokio::time::interval(interval);
                timer.tick().await; // skip immediate first tick

                loop {
                    timer.tick().await;
                    if shutdown.load(Ordering::Acquire) {
                        break;
                    }

                    let reaped = registry.reap_finished(retention);
                    if reaped > 0 {
                        log::info!("Reaped {} expired tasks", reaped);
                    }
                }
            });
        })
    }

    /// Signals the loop to exit at its next tick.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
    }
}
