//! Async driver that pumps one context's foreground queue on tokio.

use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use super::{ContextId, ForegroundQueues};

/// Pump `context` until `shutdown` resolves. Returns the number of tasks run.
///
/// Between rounds the driver sleeps until new work is accepted for the
/// context or the earliest delayed task comes due. Tasks run inline on the
/// driving task, which plays the role of the context's owning thread.
pub async fn drive<F>(queues: Arc<ForegroundQueues>, context: ContextId, shutdown: F) -> usize
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut ran = 0;

    loop {
        ran += queues.run_pending(context);

        // Fetched every round: disposing a context replaces its notifier.
        let notify = queues.notifier(context);
        let wait = queues.next_due_in(context);
        let sleep = async move {
            match wait {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = notify.notified() => {}
            _ = sleep => {}
        }
    }

    debug!(context = %context, ran, "Foreground driver stopped");
    ran
}
