use thiserror::Error;
use url::Url;

/// Errors that can occur during URL validation.
#[derive(Debug, Error)]
pub enum UrlError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    Invalid(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
}

/// Validates a URL string before it is handed to the remote service.
///
/// Accepts only absolute http/https URLs with a host. Self-hosted servers
/// commonly live on LAN addresses, so private IPs and localhost are allowed
/// here — the URL only ever reaches the configured server, never an
/// arbitrary fetch path.
pub fn validate_url(url_str: &str) -> Result<Url, UrlError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_owned())),
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingHost);
    }

    Ok(url)
}

/// Canonical form of a feed URL for duplicate detection.
///
/// Lowercases scheme and host, drops default ports and fragments, and strips
/// a trailing slash so that `https://Example.com/feed/` and
/// `https://example.com/feed` compare equal. Unparseable input falls back to
/// a trimmed, lowercased copy so comparison stays total.
pub fn canonical_url(url_str: &str) -> String {
    match Url::parse(url_str.trim()) {
        Ok(mut url) => {
            url.set_fragment(None);
            let mut s = url.to_string();
            while s.ends_with('/') {
                s.pop();
            }
            s
        }
        Err(_) => url_str.trim().trim_end_matches('/').to_lowercase(),
    }
}
