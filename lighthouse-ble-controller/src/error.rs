use lighthouse_proto::AddressError;

/// Failure of a single base station command
///
/// Every variant is classified as transient (worth retrying) or fatal by
/// [`ControlError::is_transient`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum ControlError {
    /// Malformed address, a caller error
    #[error(transparent)]
    InvalidAddress(#[from] AddressError),

    /// No usable adapter, or the radio is switched off
    #[error("bluetooth radio unavailable: {0}")]
    RadioUnavailable(String),

    /// The device could not be found or connected to
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Service discovery, read or write did not report success
    #[error("communication failed: {0}")]
    CommunicationFailed(String),

    /// The connection changed state under us, e.g. dropped mid-call
    #[error("operation invalid in current state: {0}")]
    InvalidState(String),

    /// A shutdown was requested before the command completed
    #[error("cancelled")]
    Cancelled,
}

impl ControlError {
    pub fn is_transient(&self) -> bool {
        match self {
            ControlError::RadioUnavailable(_)
            | ControlError::ConnectionFailed(_)
            | ControlError::CommunicationFailed(_)
            | ControlError::InvalidState(_) => true,
            ControlError::InvalidAddress(_) | ControlError::Cancelled => false,
        }
    }
}
