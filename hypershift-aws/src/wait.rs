use crate::error::{self, Result};
use log::trace;
use snafu::ResultExt;
use std::future::Future;
use std::time::Duration;

/// Poll `check` every `interval` until it yields a value or `timeout` elapses.
///
/// The first check happens immediately. An `Err` from `check` ends the wait right away; use
/// `Ok(None)` for conditions that are not satisfied yet.
pub async fn wait_for<T, F, Fut>(
    interval: Duration,
    timeout: Duration,
    what: &str,
    mut check: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    tokio::time::timeout(timeout, async {
        loop {
            if let Some(value) = check().await? {
                return Result::<T>::Ok(value);
            }
            trace!("Still waiting for {}, sleeping {:?}", what, interval);
            tokio::time::sleep(interval).await;
        }
    })
    .await
    .context(error::TimeoutSnafu {
        what,
        duration: timeout,
    })?
}

/// [`wait_for`] for conditions that produce no value.
pub async fn wait_until<F, Fut>(
    interval: Duration,
    timeout: Duration,
    what: &str,
    mut predicate: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    wait_for(interval, timeout, what, || {
        let condition = predicate();
        async move { Result::<Option<()>>::Ok(condition.await?.then(|| ())) }
    })
    .await
}
