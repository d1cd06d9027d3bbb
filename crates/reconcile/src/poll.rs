//! Bounded polling shared by the update and delete waits.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};

#[derive(Debug)]
pub enum PollError<E> {
    /// The condition never held within the timeout.
    TimedOut(Duration),
    /// The condition itself failed; polling stopped.
    Condition(E),
}

/// Evaluate `condition` now and then every `interval` until it yields
/// `Ok(true)`, fails, or `timeout` elapses.
pub async fn poll_until<F, Fut, E>(interval: Duration, timeout: Duration, mut condition: F) -> Result<(), PollError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        match condition().await {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e) => return Err(PollError::Condition(e)),
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(PollError::TimedOut(timeout));
        }
        sleep(interval.min(deadline - now)).await;
    }
}
