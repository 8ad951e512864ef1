use thiserror::Error;

/// Runtime errors of the public Get/Set/Subscribe/Unsubscribe contract,
/// mirroring the hardware bus status codes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// Unknown propId/areaId, subscription on a static property, malformed
    /// subscribe options, or an out-of-range set payload.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The requested direction (read/write) is not permitted by the
    /// resolved access mode.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// No value is currently stored for a valid (propId, areaId), or a
    /// dependency gate is off.
    #[error("not available: {0}")]
    NotAvailable(String),
}

/// Failure reported by a [`DeclarationSource`](crate::config::DeclarationSource)
/// when its declarations cannot be produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeclarationError {
    #[error("failed to read declarations: {0}")]
    Io(String),
    #[error("malformed declarations: {0}")]
    Parse(String),
}

/// Fatal construction failure. Only the mandatory baseline declaration set
/// can fail construction; broken overlays are skipped with a warning.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("baseline declarations failed to load: {0}")]
    Baseline(#[from] DeclarationError),
}
