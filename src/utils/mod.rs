/// Utility functions and helpers
pub mod string_utils;

pub use string_utils::StringUtils;

use crate::error::{ForgeError, ForgeResult};

/// Normalize user input into a `host[:port]` domain key.
///
/// Accepts bare domains or URLs; scheme, path, query and fragment are dropped,
/// `www.` and explicit ports are kept so distinct sites stay distinct.
pub fn normalize_domain(input: &str) -> ForgeResult<String> {
    let trimmed = input.trim().trim_end_matches('/');
    let invalid = || ForgeError::InvalidDomain {
        domain: input.to_string(),
    };

    if trimmed.is_empty() {
        return Err(invalid());
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let url = url::Url::parse(&candidate).map_err(|_| invalid())?;
    if !matches!(url.scheme(), "http" | "https") || !url.username().is_empty() || url.password().is_some() {
        return Err(invalid());
    }

    let host = url.host_str().filter(|h| !h.is_empty()).ok_or_else(invalid)?;
    let looks_like_host = host.contains('.') || host == "localhost" || host.starts_with('[');
    if !looks_like_host {
        return Err(invalid());
    }

    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}
