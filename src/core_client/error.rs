// Error types for the FTP client engine.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FtpError {
    #[error("Host not found: {0}")]
    HostNotFound(String),

    #[error("Name resolution failed for {host}: {source}")]
    Resolver {
        host: String,
        source: std::io::Error,
    },

    #[error("Could not reach host: {0}")]
    HostFail(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed on the control channel")]
    RecvFailed,

    #[error("Timed out waiting for the server")]
    Timeout,

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Unexpected reply {code}: {message}")]
    UnexpectedReply { code: u16, message: String },

    #[error("Authentication rejected by the server")]
    AuthFailed,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Write rejected by the server: {0}")]
    WriteFailed(String),

    #[error("Bad format: {0}")]
    BadFormat(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FtpError {
    /// Transport-class failures are the only ones worth a reconnect;
    /// protocol and authentication failures are not retried.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            FtpError::SendFailed(_) | FtpError::RecvFailed | FtpError::Timeout
        )
    }
}

pub type Result<T> = std::result::Result<T, FtpError>;
