use crate::broker::BrokerError;

pub type BridgeResult<T> = Result<T, BridgeError>;

#[derive(Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// Missing or malformed input. Raised before any broker interaction.
    Validation(String),
    /// A cluster round-trip failed; `op` names the step, as in
    /// "Failed to read partitions: ...".
    Connect {
        op: &'static str,
        cause: BrokerError,
    },
    /// Topic or partition resolved to nothing.
    NotFound(String),
    /// The broker was reached but refused or failed the operation.
    Broker(BrokerError),
}

impl BridgeError {
    pub fn validation(msg: impl Into<String>) -> Self {
        BridgeError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        BridgeError::NotFound(msg.into())
    }

    pub fn connect(op: &'static str, cause: BrokerError) -> Self {
        BridgeError::Connect { op, cause }
    }
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeError::Validation(msg) => write!(f, "{}", msg),
            BridgeError::Connect { op, cause } => write!(f, "Failed to {}: {}", op, cause),
            BridgeError::NotFound(msg) => write!(f, "{}", msg),
            BridgeError::Broker(cause) => write!(f, "{}", cause),
        }
    }
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BridgeError::Connect { cause, .. } | BridgeError::Broker(cause) => Some(cause),
            _ => None,
        }
    }
}

impl From<BrokerError> for BridgeError {
    fn from(error: BrokerError) -> Self {
        BridgeError::Broker(error)
    }
}
