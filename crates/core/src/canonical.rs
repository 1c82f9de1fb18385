//! URL canonicalization for cache keys and navigation.
//!
//! Normalization steps:
//! 1. Trim leading/trailing whitespace
//! 2. Default scheme to https:// if missing
//! 3. Lowercase the host
//! 4. Remove fragment (#...)
//! 5. Reject non-root paths ending in `/` with a redirect to the stripped form
//!
//! The canonical key is `host[:port] + path`, followed by `?query` when the
//! request carries a non-empty query string. The scheme never takes part.

use url::Url;

use crate::Error;

/// Canonical form of a render request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canonical {
    /// Host and path string used to derive the cache key.
    pub key: String,
    /// Absolute URL handed to the browser, scheme included.
    pub navigable: Url,
}

/// Canonicalize a raw request URL.
///
/// # Errors
///
/// - `Error::InvalidUrl` for empty input, unparsable URLs, unsupported schemes
///   or a missing host.
/// - `Error::RedirectRequired` when a non-root path ends with a slash. The
///   location is the absolute URL with the trailing slashes stripped.
pub fn canonicalize(input: &str) -> Result<Canonical, Error> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(Error::InvalidUrl("empty URL".into()));
    }

    let url_str = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };

    let mut parsed = Url::parse(&url_str).map_err(|e| Error::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(Error::InvalidUrl(format!("unsupported scheme: {scheme}"))),
    }

    let host = parsed
        .host_str()
        .map(str::to_lowercase)
        .ok_or_else(|| Error::InvalidUrl(format!("missing host: {trimmed}")))?;
    parsed
        .set_host(Some(&host))
        .map_err(|e| Error::InvalidUrl(e.to_string()))?;

    parsed.set_fragment(None);

    let path = parsed.path().to_string();
    if path != "/" && path.ends_with('/') {
        let mut location = parsed.clone();
        location.set_path(path.trim_end_matches('/'));
        return Err(Error::RedirectRequired { location: location.to_string() });
    }

    let mut key = host;
    if let Some(port) = parsed.port() {
        key.push_str(&format!(":{port}"));
    }
    key.push_str(&path);
    if let Some(query) = parsed.query()
        && !query.is_empty()
    {
        key.push('?');
        key.push_str(query);
    }

    Ok(Canonical { key, navigable: parsed })
}
