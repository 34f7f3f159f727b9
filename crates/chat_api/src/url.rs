use reqwest::Url;

use crate::error::ChatApiError;

/// Default backend origin used when no base URL is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// Normalize a configured base URL to a backend origin.
///
/// Normalization rules:
/// 1) blank input falls back to [`DEFAULT_BASE_URL`]
/// 2) trailing slashes are removed
/// 3) a trailing `/api` segment is removed, since endpoints add it back
pub fn normalize_base_url(input: &str) -> String {
    let base = if input.trim().is_empty() {
        DEFAULT_BASE_URL
    } else {
        input.trim()
    };

    let trimmed = base.trim_end_matches('/');
    trimmed
        .strip_suffix("/api")
        .unwrap_or(trimmed)
        .trim_end_matches('/')
        .to_string()
}

/// Build `{base}/api/{segments...}?{query}` with every segment and query value
/// percent-encoded.
pub fn endpoint_url(
    base_url: &str,
    segments: &[&str],
    query: &[(&str, &str)],
) -> Result<Url, ChatApiError> {
    let base = normalize_base_url(base_url);
    let mut url =
        Url::parse(&base).map_err(|error| ChatApiError::InvalidBaseUrl(format!("{base}: {error}")))?;

    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| ChatApiError::InvalidBaseUrl(format!("{base}: cannot be a base")))?;
        path.pop_if_empty().push("api").extend(segments);
    }

    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }

    Ok(url)
}
