use thiserror::Error;

/// Error taxonomy shared by the geometry core and the imagery collectors.
///
/// Glue code wraps these in `anyhow::Error`; callers that need to apply the
/// abort-or-skip policy recover them with `downcast_ref::<DatasetError>()`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DatasetError {
    #[error("Invalid geometry: {reason}")]
    InvalidGeometry { reason: String },

    #[error("Missing API key: {hint}")]
    MissingCredential { hint: String },

    #[error("Upstream service failed (status={status}): {message}")]
    UpstreamFailure { status: u16, message: String },

    #[error("No imagery available: {reason}")]
    NotAvailable { reason: String },
}

impl DatasetError {
    pub fn invalid_geometry(reason: impl Into<String>) -> Self {
        DatasetError::InvalidGeometry {
            reason: reason.into(),
        }
    }

    pub fn not_available(reason: impl Into<String>) -> Self {
        DatasetError::NotAvailable {
            reason: reason.into(),
        }
    }

    /// Errors after which the run cannot usefully continue.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DatasetError::MissingCredential { .. })
    }
}

/// Walk an `anyhow` chain looking for a taxonomy error.
pub fn dataset_error(err: &anyhow::Error) -> Option<&DatasetError> {
    err.chain().find_map(|cause| cause.downcast_ref::<DatasetError>())
}
