use garde::Validate;

use crate::error::{AppError, Result};

/// Runs a payload's `garde` rules.
///
/// # Arguments
///
/// * `payload` - The deserialized request body.
///
/// # Returns
///
/// A `Result<()>`, with every failed rule listed in the validation message.
pub fn validate<T>(payload: &T) -> Result<()>
where
    T: Validate,
    T::Context: Default,
{
    payload
        .validate()
        .map_err(|report| AppError::Validation(report.to_string()))
}

/// Normalizes an email for lookup and throttling keys.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
