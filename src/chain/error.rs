use thiserror::Error;
use uuid::Uuid;

use crate::conneg::MediaWriter;

/// Failure raised by an action handler.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Failed(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ActionError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Failure while running a finalized chain.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("authentication required")]
    Unauthorized,
    #[error("no acceptable representation")]
    NotAcceptable,
    #[error("no handler registered for `{0}`")]
    MissingHandler(String),
    #[error("action `{handler}` failed: {source}")]
    Action {
        handler: String,
        #[source]
        source: ActionError,
    },
    #[error("chain produced no result to write")]
    NothingToWrite,
    #[error("{writer} writer cannot write a {result} result")]
    Unwritable {
        writer: MediaWriter,
        result: &'static str,
    },
    #[error("failed to serialize output: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl ChainError {
    /// HTTP status reported for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::NotAcceptable => 406,
            Self::Action {
                source: ActionError::NotFound(_),
                ..
            } => 404,
            _ => 500,
        }
    }
}

/// Failure while validating or finalizing the behavior graph.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("chain {chain} has no route")]
    MissingRoute { chain: Uuid },
    #[error("chain for `{route}` must hold exactly one action and one output node")]
    Malformed { route: String },
    #[error("route `{0}` is registered twice")]
    DuplicateRoute(String),
    #[error("invalid route `{route}`: {reason}")]
    InvalidRoute { route: String, reason: String },
}
