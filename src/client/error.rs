use std::io;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Connecting, reading or writing failed, or the daemon closed the connection. The connection
    ///  should be discarded, but a new one may succeed.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// Client and daemon disagree on the state of the conversation. This is not recoverable, the
    ///  connection's receive path refuses further messages.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The caller invoked an operation that is not valid in the current state or with the given
    ///  arguments. Nothing was sent, and connection and member state are unchanged.
    #[error("precondition violated: {0}")]
    Precondition(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// An upcall handler returned an error
    #[error("upcall handler failed: {0}")]
    Handler(#[source] anyhow::Error),
}

pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ClientError::Protocol(_))
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }
}
