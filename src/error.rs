use thiserror::Error;

/// Failures the reactive core reports to its caller.
///
/// Errors raised by user code inside *user* watchers never show up here: they are sent to
/// [crate::Config::error_handler] instead, so one failing computation can't abort the others.
#[derive(Debug, Error)]
pub enum Error {
    /// A non-user watcher's getter failed.
    #[error("evaluating watcher \"{expression}\" failed")]
    Evaluation {
        expression: String,
        #[source]
        source: anyhow::Error,
    },
    /// A non-user watcher's callback failed.
    #[error("callback for watcher \"{expression}\" failed")]
    Callback {
        expression: String,
        #[source]
        source: anyhow::Error,
    },
    /// A watcher kept re-scheduling itself during one flush.
    ///
    /// This is fatal: the flush is abandoned and the queue is cleared.
    #[error("you may have an infinite update loop in watcher with expression \"{expression}\" (re-scheduled more than {limit} times in one flush)")]
    InfiniteUpdateLoop { expression: String, limit: usize },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
