//! Conversion errors

/// Failure raised by a [`Converter`](crate::Converter) or by the
/// [`convert`](crate::convert) / [`to_storable`](crate::to_storable) helpers.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    /// No candidate value decoded as the requested type
    #[error("cannot convert {value} into {target}: {reason}")]
    Unconvertible {
        /// Requested type name
        target: &'static str,
        /// Rendered source value
        value: String,
        /// Decoder message from the direct attempt
        reason: String,
    },

    /// The strategy refused to store the value
    #[error("value cannot be stored: {0}")]
    Unstorable(String),

    /// The value could not be serialized into plain data
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ConversionError {
    /// Build an [`ConversionError::Unconvertible`] for target type `T`
    #[must_use]
    pub fn unconvertible<T: ?Sized>(value: &serde_json::Value, reason: impl Into<String>) -> Self {
        Self::Unconvertible {
            target: std::any::type_name::<T>(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}
