use core::time::Duration;
use std::sync::Arc;

use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{slot::allocator::Lease, store::SlotStore};

/// Handle to the background renewal task of one allocation.
///
/// The task is owned, never detached: it is stopped through [`Heartbeat::stop`]
/// before the lease is released, so a renewal can never race the delete.
/// Dropping the handle, including a `stop` future dropped part way, aborts
/// the task.
pub(crate) struct Heartbeat {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Heartbeat {
    /// Starts renewing `lease` every `heartbeat_interval`, first tick one
    /// interval from now.
    pub(crate) fn spawn<S: SlotStore>(lease: Arc<Lease<S>>) -> Self {
        let token = CancellationToken::new();
        let handle = tokio::spawn(run(lease, token.clone()));
        Self { token, handle }
    }

    /// Cancels the task and waits for an in-flight renewal to finish.
    ///
    /// After `grace` the task is aborted. Either way the task has ended when
    /// this returns.
    pub(crate) async fn stop(mut self, grace: Duration) {
        self.token.cancel();
        let handle = &mut self.handle;
        match tokio::time::timeout(grace, &mut *handle).await {
            Ok(Ok(())) => {}
            Ok(Err(_err)) => {
                #[cfg(feature = "tracing")]
                tracing::error!(error = %_err, "Heartbeat task failed");
            }
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(?grace, "Heartbeat did not stop in time, aborting");
                handle.abort();
                let _ = handle.await;
            }
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.token.cancel();
        self.handle.abort();
    }
}

async fn run<S: SlotStore>(lease: Arc<Lease<S>>, token: CancellationToken) {
    let period = lease.config.heartbeat_interval;
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        // Cancellation is only observed between ticks.
        lease.tick().await;
    }

    #[cfg(feature = "tracing")]
    tracing::debug!("Heartbeat stopped");
}
