use crate::error::CoreError;
use url::Url;

/// Validates that the URL is absolute, with both a scheme and a host.
pub fn validate_url(input: &str) -> Result<(), CoreError> {
    if input.is_empty() {
        return Err(CoreError::InvalidUrl("URL cannot be empty".to_string()));
    }

    let parsed = Url::parse(input)
        .map_err(|e| CoreError::InvalidUrl(format!("{input}: {e}")))?;

    match parsed.host_str() {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(CoreError::InvalidUrl(format!(
            "URL must have a valid scheme and host: {input}"
        ))),
    }
}
