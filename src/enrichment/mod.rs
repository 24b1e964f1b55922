// External IP enrichment: tiered reputation and flat geolocation lookups

use crate::config::TelexConfig;
use crate::store::AttributionRecordStore;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

/// Failure of an outbound enrichment call. Never fatal to the pipeline:
/// callers substitute an inline error payload and continue.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream returned status {0}")]
    Status(u16),

    #[error("malformed upstream body: {0}")]
    Decode(String),

    #[error("no credential configured for {0}")]
    MissingCredential(String),
}

/// Which tier a community-tier result escalates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Community,
    Context,
    Riot,
}

/// Escalation decision from a community-tier response.
///
/// `riot` (known benign infrastructure) wins over `noise` when both flags
/// are set; with neither set the community result stands as-is.
pub fn escalation(community: &Value) -> Tier {
    if community.get("riot").and_then(Value::as_bool) == Some(true) {
        Tier::Riot
    } else if community.get("noise").and_then(Value::as_bool) == Some(true) {
        Tier::Context
    } else {
        Tier::Community
    }
}

/// Normalize an enrichment failure into the inline payload stored on the
/// event, in place of real provider data.
pub fn error_payload(err: &EnrichmentError) -> Value {
    json!({ "msg": err.to_string() })
}

/// Queries the two external reputation services.
#[async_trait]
pub trait EnrichmentClient: Send + Sync {
    /// Tiered network-reputation lookup (community, escalating to context
    /// or riot as flagged).
    async fn reputation(&self, ip: &str) -> Result<Value, EnrichmentError>;

    /// Flat geolocation lookup.
    async fn geolocation(&self, ip: &str) -> Result<Value, EnrichmentError>;
}

/// HTTP-backed enrichment client.
///
/// Provider credentials are read from the auth-tokens partition on every
/// call so operators can rotate them without a restart.
pub struct HttpEnrichmentClient {
    http: reqwest::Client,
    records: AttributionRecordStore,
    community_url: String,
    context_url: String,
    riot_url: String,
    geolocation_url: String,
}

impl HttpEnrichmentClient {
    pub fn new(config: &TelexConfig, records: AttributionRecordStore) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.outbound_timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            http,
            records,
            community_url: config.reputation_community_url.clone(),
            context_url: config.reputation_context_url.clone(),
            riot_url: config.reputation_riot_url.clone(),
            geolocation_url: config.geolocation_url.clone(),
        }
    }

    async fn credential(&self, provider: &str) -> Result<String, EnrichmentError> {
        self.records
            .provider_token(provider)
            .await
            .ok()
            .flatten()
            .ok_or_else(|| EnrichmentError::MissingCredential(provider.to_string()))
    }

    async fn fetch_tier(&self, base: &str, ip: &str, key: &str) -> Result<Value, EnrichmentError> {
        let response = self
            .http
            .get(format!("{}{}", base, ip))
            .header("Accept", "application/json")
            .header("key", key)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(EnrichmentError::Status(response.status().as_u16()));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| EnrichmentError::Decode(e.to_string()))
    }
}

#[async_trait]
impl EnrichmentClient for HttpEnrichmentClient {
    async fn reputation(&self, ip: &str) -> Result<Value, EnrichmentError> {
        let key = self.credential("greynoise").await?;
        let community = self.fetch_tier(&self.community_url, ip, &key).await?;

        let result = match escalation(&community) {
            Tier::Community => community,
            Tier::Context => {
                tracing::debug!(ip, "reputation escalating to context tier");
                self.fetch_tier(&self.context_url, ip, &key).await?
            }
            Tier::Riot => {
                tracing::debug!(ip, "reputation escalating to riot tier");
                self.fetch_tier(&self.riot_url, ip, &key).await?
            }
        };
        Ok(result)
    }

    async fn geolocation(&self, ip: &str) -> Result<Value, EnrichmentError> {
        let token = self.credential("ipinfo").await?;
        let response = self
            .http
            .get(format!("{}{}?token={}", self.geolocation_url, ip, token))
            .header("Accept", "application/json")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(EnrichmentError::Status(response.status().as_u16()));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| EnrichmentError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escalation_quiet_ip_stays_community() {
        let community = json!({"noise": false, "riot": false, "classification": "unknown"});
        assert_eq!(escalation(&community), Tier::Community);
    }

    #[test]
    fn test_escalation_noise_goes_to_context() {
        let community = json!({"noise": true, "riot": false});
        assert_eq!(escalation(&community), Tier::Context);
    }

    #[test]
    fn test_escalation_riot_beats_context() {
        let community = json!({"noise": true, "riot": true});
        assert_eq!(escalation(&community), Tier::Riot);
    }

    #[test]
    fn test_escalation_missing_flags() {
        // Upstreams that omit the flags entirely must not escalate.
        let community = json!({"classification": "benign"});
        assert_eq!(escalation(&community), Tier::Community);

        // Non-boolean flag values are treated as unset.
        let odd = json!({"noise": "yes"});
        assert_eq!(escalation(&odd), Tier::Community);
    }

    #[test]
    fn test_error_payload_shape() {
        let err = EnrichmentError::Status(503);
        let payload = error_payload(&err);
        assert_eq!(payload["msg"], "upstream returned status 503");
    }
}
