use crate::error::AppError;
use tracing::{debug, error};

/// Parses repeated `-H key=value` arguments into header pairs.
///
/// Each entry is split at the first `=`; surrounding whitespace is trimmed
/// from both halves. An entry without `=` or with an empty name is rejected.
///
/// # Examples
///
/// ```
/// use m3u8_mirror::utils::parse_headers;
///
/// let headers = vec![
///     "Referer=https://example.com/".to_string(),
///     "Cookie = a=1; b=2".to_string(),
/// ];
/// let result = parse_headers(&headers).unwrap();
/// assert_eq!(result, vec![
///     ("Referer".to_string(), "https://example.com/".to_string()),
///     ("Cookie".to_string(), "a=1; b=2".to_string()),
/// ]);
/// ```
pub fn parse_headers(params: &[String]) -> Result<Vec<(String, String)>, AppError> {
    debug!("Parsing {} header arguments", params.len());

    params
        .iter()
        .map(|param| {
            let (name, value) = param.split_once('=').ok_or_else(|| {
                error!("Invalid header format: {param}");
                AppError::InvalidInput(format!("Invalid header format, expected key=value: {param}"))
            })?;

            let name = name.trim();
            if name.is_empty() {
                return Err(AppError::InvalidInput(format!(
                    "Header name must not be empty: {param}"
                )));
            }

            debug!(header = name, "Added request header");
            Ok((name.to_string(), value.trim().to_string()))
        })
        .collect()
}
