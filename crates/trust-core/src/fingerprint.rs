//! URL canonicalisation, fingerprinting, and domain extraction
//!
//! The canonical form of a URL is the primary identity everywhere else in the
//! system: lowercased scheme and host, leading `www.` stripped, fragment
//! removed, query preserved. The fingerprint is the SHA-256 of that canonical
//! string, hex encoded.

use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UrlError {
    #[error("invalid URL `{0}`: expected an absolute http or https URL")]
    InvalidUrl(String),
}

/// Canonical identity of a URL: the normalised string, its fingerprint,
/// and the domain it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlIdentity {
    pub canonical: String,
    pub fingerprint: String,
    pub domain: String,
}

impl UrlIdentity {
    pub fn from_raw(raw: &str) -> Result<Self, UrlError> {
        let canonical = canonicalize_url(raw)?;
        let fingerprint = fingerprint_canonical(&canonical);
        let domain = extract_domain(&canonical)?;
        Ok(Self {
            canonical,
            fingerprint,
            domain,
        })
    }
}

/// Normalise a URL into its canonical form.
///
/// Idempotent: canonicalising a canonical URL returns it unchanged.
pub fn canonicalize_url(raw: &str) -> Result<String, UrlError> {
    let mut parsed =
        Url::parse(raw.trim()).map_err(|_| UrlError::InvalidUrl(raw.to_string()))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(UrlError::InvalidUrl(raw.to_string()));
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| UrlError::InvalidUrl(raw.to_string()))?
        .to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();

    parsed
        .set_host(Some(&host))
        .map_err(|_| UrlError::InvalidUrl(raw.to_string()))?;
    parsed.set_fragment(None);

    Ok(parsed.to_string())
}

/// SHA-256 fingerprint of an arbitrary URL (canonicalised first).
pub fn fingerprint_url(raw: &str) -> Result<String, UrlError> {
    Ok(fingerprint_canonical(&canonicalize_url(raw)?))
}

/// SHA-256 fingerprint of an already canonical URL string.
pub fn fingerprint_canonical(canonical: &str) -> String {
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

/// Lowercased host with any leading `www.` stripped.
pub fn extract_domain(raw: &str) -> Result<String, UrlError> {
    let parsed = Url::parse(raw.trim()).map_err(|_| UrlError::InvalidUrl(raw.to_string()))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(UrlError::InvalidUrl(raw.to_string()));
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| UrlError::InvalidUrl(raw.to_string()))?
        .to_ascii_lowercase();

    Ok(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_lowercases_and_strips() {
        let canonical = canonicalize_url("HTTPS://WWW.Example.COM/Path?q=1#frag").unwrap();
        assert_eq!(canonical, "https://example.com/Path?q=1");
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let once = canonicalize_url("https://www.example.com/a/b?x=2#top").unwrap();
        let twice = canonicalize_url(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn fingerprint_stable_across_canonicalisations() {
        let direct = fingerprint_url("https://WWW.example.com/page#section").unwrap();
        let canonical = canonicalize_url("https://www.example.com/page").unwrap();
        assert_eq!(direct, fingerprint_canonical(&canonical));
    }

    #[test]
    fn query_is_preserved() {
        let a = fingerprint_url("https://example.com/search?q=rust").unwrap();
        let b = fingerprint_url("https://example.com/search?q=other").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_non_http_schemes() {
        assert!(matches!(
            canonicalize_url("ftp://example.com/file"),
            Err(UrlError::InvalidUrl(_))
        ));
        assert!(matches!(
            canonicalize_url("javascript:alert(1)"),
            Err(UrlError::InvalidUrl(_))
        ));
    }

    #[test]
    fn rejects_relative_urls() {
        assert!(canonicalize_url("/just/a/path").is_err());
        assert!(canonicalize_url("example.com/no-scheme").is_err());
        assert!(canonicalize_url("").is_err());
    }

    #[test]
    fn extracts_domain_without_www() {
        assert_eq!(
            extract_domain("https://www.Example.com/page").unwrap(),
            "example.com"
        );
        assert_eq!(
            extract_domain("http://sub.example.co.uk/x").unwrap(),
            "sub.example.co.uk"
        );
    }

    #[test]
    fn identity_bundles_all_parts() {
        let id = UrlIdentity::from_raw("https://www.example.com/a#b").unwrap();
        assert_eq!(id.canonical, "https://example.com/a");
        assert_eq!(id.domain, "example.com");
        assert_eq!(id.fingerprint, fingerprint_canonical("https://example.com/a"));
        assert_eq!(id.fingerprint.len(), 64);
    }
}
