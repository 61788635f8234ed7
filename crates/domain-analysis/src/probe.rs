//! HTTPS reachability probe
//!
//! One GET against the domain root. A completed TLS handshake means the
//! certificate chain validated (reqwest/rustls refuse anything else), so a
//! successful response yields `ssl_valid = true` plus the status code. A
//! certificate failure is itself a signal, not a probe outage.

use crate::SourceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    pub ssl_valid: bool,
    pub http_status: Option<u16>,
}

pub async fn probe_https(
    client: &reqwest::Client,
    domain: &str,
) -> Result<ProbeResult, SourceError> {
    let url = format!("https://{domain}/");
    match client.get(&url).send().await {
        Ok(response) => Ok(ProbeResult {
            ssl_valid: true,
            http_status: Some(response.status().as_u16()),
        }),
        Err(e) if is_certificate_error(&e) => Ok(ProbeResult {
            ssl_valid: false,
            http_status: None,
        }),
        Err(e) => Err(SourceError::Http(e)),
    }
}

fn is_certificate_error(error: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(e) = source {
        let text = e.to_string().to_ascii_lowercase();
        if text.contains("certificate") || text.contains("tls") || text.contains("ssl") {
            return true;
        }
        source = e.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_result_distinguishes_states() {
        let reachable = ProbeResult {
            ssl_valid: true,
            http_status: Some(200),
        };
        let broken_cert = ProbeResult {
            ssl_valid: false,
            http_status: None,
        };
        assert_ne!(reachable, broken_cert);
        assert_eq!(reachable.http_status, Some(200));
        assert_eq!(broken_cert.http_status, None);
    }
}
