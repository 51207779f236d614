use pictor_common::{Error, Result};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Outcome of a bounded wait. Failure is the `Err` arm of the surrounding
/// `Result`; a timeout is an ordinary outcome so the caller decides whether
/// the remote resource is kept or torn down. Nothing here ever touches the
/// resource being waited on.
#[derive(Debug)]
pub enum WaitOutcome<T> {
    Ready(T),
    TimedOut { waited: Duration },
}

impl<T> WaitOutcome<T> {
    /// Collapse a timeout into the error taxonomy when the caller has no
    /// partial-progress story of its own.
    pub fn into_result(self, waiting_for: &str) -> Result<T> {
        match self {
            WaitOutcome::Ready(value) => Ok(value),
            WaitOutcome::TimedOut { waited } => Err(Error::Timeout {
                waited_secs: waited.as_secs(),
                waiting_for: waiting_for.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WaitPlan {
    pub interval: Duration,
    pub deadline: Duration,
}

impl WaitPlan {
    pub fn new(interval: Duration, deadline: Duration) -> Self {
        Self { interval, deadline }
    }
}

/// Drive `probe` until it yields a value or the deadline elapses.
///
/// The probe answers Ok(None) for "still in flight, ask again". The first
/// probe runs immediately; later probes are spaced by `plan.interval`. A
/// probe error aborts the wait at once.
pub async fn wait_until<T, F, Fut>(plan: WaitPlan, mut probe: F) -> Result<WaitOutcome<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let started = Instant::now();
    loop {
        if let Some(value) = probe().await? {
            return Ok(WaitOutcome::Ready(value));
        }
        if started.elapsed() + plan.interval > plan.deadline {
            return Ok(WaitOutcome::TimedOut {
                waited: started.elapsed(),
            });
        }
        sleep(plan.interval).await;
    }
}
