//! Domain age via RDAP
//!
//! RDAP is the structured successor to WHOIS; rdap.org proxies to the
//! registry responsible for each TLD. The raw response is kept alongside the
//! derived age so operators can inspect what the registry actually said.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::SourceError;

pub struct WhoisResult {
    pub age_days: Option<i64>,
    pub raw: Value,
}

pub async fn lookup(
    client: &reqwest::Client,
    base_url: &str,
    domain: &str,
) -> Result<WhoisResult, SourceError> {
    let url = format!("{}/domain/{}", base_url.trim_end_matches('/'), domain);
    let response = client.get(&url).send().await?;

    if !response.status().is_success() {
        return Err(SourceError::Payload(format!(
            "RDAP returned {}",
            response.status()
        )));
    }

    let raw: Value = response.json().await?;
    let age_days = registration_age_days(&raw, Utc::now());
    Ok(WhoisResult { age_days, raw })
}

/// Age in days from the `registration` event of an RDAP response.
pub fn registration_age_days(raw: &Value, now: DateTime<Utc>) -> Option<i64> {
    let events = raw.get("events")?.as_array()?;
    let registered = events.iter().find_map(|event| {
        let action = event.get("eventAction")?.as_str()?;
        if action != "registration" {
            return None;
        }
        let date = event.get("eventDate")?.as_str()?;
        DateTime::parse_from_rfc3339(date).ok()
    })?;
    let age = (now - registered.with_timezone(&Utc)).num_days();
    (age >= 0).then_some(age)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_registration_age() {
        let raw = json!({
            "ldhName": "example.com",
            "events": [
                {"eventAction": "registration", "eventDate": "2020-01-01T00:00:00Z"},
                {"eventAction": "expiration", "eventDate": "2030-01-01T00:00:00Z"}
            ]
        });
        let now = DateTime::parse_from_rfc3339("2021-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(registration_age_days(&raw, now), Some(366));
    }

    #[test]
    fn missing_or_future_registration_yields_none() {
        let now = Utc::now();
        assert_eq!(registration_age_days(&json!({}), now), None);
        assert_eq!(
            registration_age_days(&json!({"events": []}), now),
            None
        );

        let future = json!({
            "events": [{"eventAction": "registration", "eventDate": "2999-01-01T00:00:00Z"}]
        });
        assert_eq!(registration_age_days(&future, now), None);
    }

    #[test]
    fn malformed_dates_yield_none() {
        let raw = json!({
            "events": [{"eventAction": "registration", "eventDate": "yesterday"}]
        });
        assert_eq!(registration_age_days(&raw, Utc::now()), None);
    }
}
