//! URL canonicalization for consistent request identity.
//!
//! Install-time precaching and gateway-delivered fetch events must agree on
//! the canonical form of a URL, otherwise a precached asset would never hit.

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("asset path is not root-relative: {0}")]
    NotRootRelative(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Canonicalize a URL string for consistent request identity.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Default scheme to https:// if missing
/// 3. Lowercase the host
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (do not reorder)
pub fn canonicalize(input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let url_str = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };

    let mut parsed = url::Url::parse(&url_str).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if let Some(mut host) = parsed.host_str() {
        let h = host.to_lowercase();
        host = h.as_str();
        parsed
            .set_host(Some(host))
            .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

/// Resolve a root-relative asset path against the application origin.
///
/// The result is already canonical: the origin goes through
/// [`canonicalize`] and the joined URL inherits its normalized host and
/// scheme, so install and fetch lookups produce identical identities.
pub fn resolve_asset(origin: &str, path: &str) -> Result<url::Url, UrlError> {
    if !path.starts_with('/') {
        return Err(UrlError::NotRootRelative(path.to_string()));
    }

    let base = canonicalize(origin)?;
    let mut resolved = base.join(path).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    resolved.set_fragment(None);

    Ok(resolved)
}
