use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure taxonomy shared by the control-plane clients and the
/// orchestration flows.
///
/// "Task not ready" is deliberately absent: a pending task is a normal poll
/// outcome (`TaskPoll::NotReady`), not an error.
#[derive(Debug, Error)]
pub enum Error {
    /// Network-level failure (connect, read, timeout). Read calls may retry
    /// these transparently; everything else propagates them as-is.
    #[error("transport failure: {0}")]
    Transport(String),

    /// 401/403 from a control plane. Never retried.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// 404 for a specific target. Benign only for idempotent deletes, and
    /// only the deleting caller gets to decide that.
    #[error("not found: {0}")]
    NotFound(String),

    /// The capacity query produced no allow-listed offer with free units.
    #[error("no GPU capacity matches the allow-list")]
    NoCapacity,

    /// The control plane answered with a payload we cannot interpret, or
    /// with an explicit non-zero result code.
    #[error("provider protocol error: {0}")]
    Protocol(String),

    /// A bounded wait elapsed before the remote side settled. The remote
    /// resource is left untouched so it can be inspected or reused.
    #[error("timed out after {waited_secs}s waiting for {waiting_for}")]
    Timeout {
        waited_secs: u64,
        waiting_for: String,
    },

    /// Names the orchestration stage that failed, keeping the cause attached.
    #[error("{stage} failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn stage(stage: &'static str, source: Error) -> Self {
        Error::Stage {
            stage,
            source: Box::new(source),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
