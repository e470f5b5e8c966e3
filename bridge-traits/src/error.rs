use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    /// Transport failure talking to a remote origin.
    #[error("Network error: {message}")]
    Network { message: String, transient: bool },

    /// The remote answered, but not in a form the engine can accept.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// A network failure worth retrying (timeouts, resets, unreachable host).
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            transient: true,
        }
    }

    /// A network failure that will not go away on retry.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            transient: false,
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { transient, .. } => *transient,
            Self::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io(err) if err.kind() == std::io::ErrorKind::NotFound)
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(BridgeError::transient("reset").is_transient());
        assert!(!BridgeError::permanent("bad host").is_transient());
        assert!(!BridgeError::Protocol("garbage".into()).is_transient());
        assert!(!BridgeError::Cancelled.is_transient());

        let timed_out = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        assert!(BridgeError::from(timed_out).is_transient());
    }

    #[test]
    fn not_found_detection() {
        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(BridgeError::from(missing).is_not_found());
        assert!(!BridgeError::OperationFailed("x".into()).is_not_found());
    }
}
