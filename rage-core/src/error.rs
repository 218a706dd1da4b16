use rage_channels::PlatformError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notify channel {0} does not exist")]
    TargetChannelNotFound(String),

    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Why an evaluation was abandoned.
///
/// `Platform` covers history and user lookups: transient, logged, retried
/// implicitly by the next message in the channel. `Notify` means a burst was
/// detected but the notification could not be delivered.
#[derive(Debug, Error)]
pub enum RageError {
    #[error("platform lookup failed: {0}")]
    Platform(#[from] PlatformError),

    #[error("notification failed: {0}")]
    Notify(#[from] NotifyError),
}
