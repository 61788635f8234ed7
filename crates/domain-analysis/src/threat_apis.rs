//! External threat verdict clients
//!
//! Google Safe Browsing v4 and Hybrid Analysis. Both are optional: without an
//! API key the source reports [`SourceError::MissingKey`] and the analyser
//! records a null signal.

use serde_json::{json, Value};
use trustline_core::{HybridAnalysisStatus, SafeBrowsingStatus};

use crate::SourceError;

pub async fn safe_browsing_status(
    client: &reqwest::Client,
    base_url: &str,
    api_key: Option<&str>,
    domain: &str,
) -> Result<SafeBrowsingStatus, SourceError> {
    let api_key = api_key.ok_or(SourceError::MissingKey)?;
    let url = format!(
        "{}/v4/threatMatches:find?key={}",
        base_url.trim_end_matches('/'),
        api_key
    );

    let body = json!({
        "client": {"clientId": "trustline", "clientVersion": env!("CARGO_PKG_VERSION")},
        "threatInfo": {
            "threatTypes": ["MALWARE", "SOCIAL_ENGINEERING", "UNWANTED_SOFTWARE", "POTENTIALLY_HARMFUL_APPLICATION"],
            "platformTypes": ["ANY_PLATFORM"],
            "threatEntryTypes": ["URL"],
            "threatEntries": [
                {"url": format!("http://{domain}/")},
                {"url": format!("https://{domain}/")}
            ]
        }
    });

    let response = client.post(&url).json(&body).send().await?;
    if !response.status().is_success() {
        return Err(SourceError::Payload(format!(
            "Safe Browsing returned {}",
            response.status()
        )));
    }

    let payload: Value = response.json().await?;
    Ok(parse_safe_browsing(&payload))
}

/// Worst threat type across all matches; no matches means clean.
pub fn parse_safe_browsing(payload: &Value) -> SafeBrowsingStatus {
    let matches = match payload.get("matches").and_then(|m| m.as_array()) {
        Some(matches) if !matches.is_empty() => matches,
        _ => return SafeBrowsingStatus::Clean,
    };

    let mut worst = SafeBrowsingStatus::Clean;
    for entry in matches {
        let status = match entry.get("threatType").and_then(|t| t.as_str()) {
            Some("MALWARE") => SafeBrowsingStatus::Malware,
            Some("SOCIAL_ENGINEERING") => SafeBrowsingStatus::Phishing,
            Some("UNWANTED_SOFTWARE") | Some("POTENTIALLY_HARMFUL_APPLICATION") => {
                SafeBrowsingStatus::Unwanted
            }
            _ => continue,
        };
        worst = worst_of(worst, status);
    }
    worst
}

fn worst_of(a: SafeBrowsingStatus, b: SafeBrowsingStatus) -> SafeBrowsingStatus {
    fn rank(s: SafeBrowsingStatus) -> u8 {
        match s {
            SafeBrowsingStatus::Clean => 0,
            SafeBrowsingStatus::Unwanted => 1,
            SafeBrowsingStatus::Phishing => 2,
            SafeBrowsingStatus::Malware => 3,
        }
    }
    if rank(b) > rank(a) {
        b
    } else {
        a
    }
}

pub async fn hybrid_analysis_status(
    client: &reqwest::Client,
    base_url: &str,
    api_key: Option<&str>,
    domain: &str,
) -> Result<HybridAnalysisStatus, SourceError> {
    let api_key = api_key.ok_or(SourceError::MissingKey)?;
    let url = format!("{}/api/v2/search/terms", base_url.trim_end_matches('/'));

    let response = client
        .post(&url)
        .header("api-key", api_key)
        .header("User-Agent", "Falcon Sandbox")
        .form(&[("domain", domain)])
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(SourceError::Payload(format!(
            "Hybrid Analysis returned {}",
            response.status()
        )));
    }

    let payload: Value = response.json().await?;
    Ok(parse_hybrid_analysis(&payload))
}

/// Worst verdict across all sandbox reports; no reports means clean.
pub fn parse_hybrid_analysis(payload: &Value) -> HybridAnalysisStatus {
    let results = match payload.get("result").and_then(|r| r.as_array()) {
        Some(results) if !results.is_empty() => results,
        _ => return HybridAnalysisStatus::Clean,
    };

    let mut worst = HybridAnalysisStatus::Clean;
    for entry in results {
        let verdict = entry
            .get("verdict")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let status = match verdict {
            "malicious" => HybridAnalysisStatus::Malicious,
            "suspicious" => HybridAnalysisStatus::Suspicious,
            _ => continue,
        };
        if status == HybridAnalysisStatus::Malicious {
            return HybridAnalysisStatus::Malicious;
        }
        worst = status;
    }
    worst
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn safe_browsing_empty_is_clean() {
        assert_eq!(parse_safe_browsing(&json!({})), SafeBrowsingStatus::Clean);
        assert_eq!(
            parse_safe_browsing(&json!({"matches": []})),
            SafeBrowsingStatus::Clean
        );
    }

    #[test]
    fn safe_browsing_picks_worst_match() {
        let payload = json!({"matches": [
            {"threatType": "UNWANTED_SOFTWARE"},
            {"threatType": "MALWARE"},
            {"threatType": "SOCIAL_ENGINEERING"}
        ]});
        assert_eq!(parse_safe_browsing(&payload), SafeBrowsingStatus::Malware);

        let phishing = json!({"matches": [{"threatType": "SOCIAL_ENGINEERING"}]});
        assert_eq!(parse_safe_browsing(&phishing), SafeBrowsingStatus::Phishing);
    }

    #[test]
    fn hybrid_analysis_empty_is_clean() {
        assert_eq!(
            parse_hybrid_analysis(&json!({"result": []})),
            HybridAnalysisStatus::Clean
        );
    }

    #[test]
    fn hybrid_analysis_escalates_verdicts() {
        let suspicious = json!({"result": [
            {"verdict": "no specific threat"},
            {"verdict": "suspicious"}
        ]});
        assert_eq!(
            parse_hybrid_analysis(&suspicious),
            HybridAnalysisStatus::Suspicious
        );

        let malicious = json!({"result": [
            {"verdict": "suspicious"},
            {"verdict": "malicious"}
        ]});
        assert_eq!(
            parse_hybrid_analysis(&malicious),
            HybridAnalysisStatus::Malicious
        );
    }
}
