use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::utils::clock::Clock;

const TICK: Duration = Duration::from_secs(1);

/// Background 1 Hz counter for the running timer. Dropping the ticker stops it, no increment
/// happens after the drop returns control to the runtime.
pub struct Ticker {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl Ticker {
    /// Must be called from within a tokio runtime.
    pub fn spawn(counter: Arc<AtomicU64>, clock: Arc<dyn Clock>) -> Self {
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run(counter, clock, shutdown.clone()));
        Self { shutdown, handle }
    }
}

async fn run(counter: Arc<AtomicU64>, clock: Arc<dyn Clock>, shutdown: CancellationToken) {
    debug!("Ticker started");
    let mut tick_point = clock.instant();
    loop {
        tick_point += TICK;
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!("Ticker stopped");
                return;
            }
            _ = clock.sleep_until(tick_point) => {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.handle.abort();
    }
}
