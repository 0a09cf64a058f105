use std::fmt;
use std::io;

/// Everything that can abort a run. Transport and protocol failures
/// are unrecoverable for the whole benchmark: continuing would report
/// skewed numbers, so callers print the error and exit non-zero.
#[derive(Debug)]
pub enum ClientError {
    Io(io::Error),
    /// Malformed wire data, or the peer vanished mid-reply.
    Protocol(String),
    /// The server answered with an error reply.
    Server(String),
    /// Integrity check failed: the value read back does not match the
    /// regenerated expected content.
    Corrupt {
        key: u64,
        expected_len: usize,
        actual_len: usize,
    },
    /// Integrity check got a nil reply for a key expected to exist.
    Missing { key: u64 },
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Io(e) => write!(f, "I/O error: {}", e),
            ClientError::Protocol(msg) => write!(f, "protocol error: {}", msg),
            ClientError::Server(msg) => write!(f, "server error: {}", msg),
            ClientError::Corrupt { key, expected_len, actual_len } => write!(
                f,
                "data mismatch for key string:{}: expected {} bytes, got {}",
                key, expected_len, actual_len
            ),
            ClientError::Missing { key } => write!(
                f,
                "missing value for key string:{} expected to exist",
                key
            ),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<io::Error> for ClientError {
    fn from(e: io::Error) -> Self {
        ClientError::Io(e)
    }
}

impl ClientError {
    /// True when the failure is the kind a draining run tolerates: the
    /// peer closed the connection while we were shutting down anyway.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ClientError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::UnexpectedEof
            ),
            ClientError::Protocol(msg) => msg.contains("closed"),
            _ => false,
        }
    }
}
