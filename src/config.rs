// Runtime configuration for the attribution pipeline

use serde::{Deserialize, Serialize};

/// Telex configuration.
///
/// Deserializable so deployments can load it from JSON; `Default` gives the
/// values the hosted worker ran with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelexConfig {
    /// Address the HTTP server binds to.
    pub bind_addr: String,

    /// Public origin (scheme + host) used when minting links. When unset
    /// the origin is derived from the inbound request's Host header.
    pub public_origin: Option<String>,

    /// Length of generated `did`/`edid` discriminators.
    pub did_length: usize,

    /// Timeout for outbound enrichment and metadata fetches, in seconds.
    pub outbound_timeout_secs: u64,

    /// Base URL for the community-tier reputation lookup.
    pub reputation_community_url: String,

    /// Base URL for the context-tier reputation lookup.
    pub reputation_context_url: String,

    /// Base URL for the riot-tier (known benign infrastructure) lookup.
    pub reputation_riot_url: String,

    /// Base URL for the flat geolocation lookup.
    pub geolocation_url: String,

    /// Template id for the client script bootstrap header.
    pub script_header_template: String,

    /// Default template id for the fingerprinting script body (payload_1).
    pub default_script_payload: String,

    /// Default template id for the final response body (payload_2).
    pub default_response_payload: String,

    /// Trailing filename segment appended to hop 2/3 URLs. Ignored for
    /// routing; it only makes the URL look like a static asset.
    pub payload_name: String,
}

impl Default for TelexConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            public_origin: None,
            did_length: 7,
            outbound_timeout_secs: 5,
            reputation_community_url: "https://api.greynoise.io/v3/community/".to_string(),
            reputation_context_url: "https://api.greynoise.io/v2/noise/context/".to_string(),
            reputation_riot_url: "https://api.greynoise.io/v2/riot/".to_string(),
            geolocation_url: "https://ipinfo.io/".to_string(),
            script_header_template: "tx_header".to_string(),
            default_script_payload: "fingerprint".to_string(),
            default_response_payload: "redirect".to_string(),
            payload_name: "script.js".to_string(),
        }
    }
}

impl TelexConfig {
    /// Load config overrides from the environment on top of defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(addr) = std::env::var("TELEX_BIND") {
            config.bind_addr = addr;
        }
        if let Ok(origin) = std::env::var("TELEX_PUBLIC_ORIGIN") {
            config.public_origin = Some(origin);
        }
        if let Ok(len) = std::env::var("TELEX_DID_LENGTH") {
            if let Ok(len) = len.parse() {
                config.did_length = len;
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TelexConfig::default();
        assert_eq!(config.did_length, 7);
        assert_eq!(config.payload_name, "script.js");
        assert!(config.public_origin.is_none());
    }

    #[test]
    fn test_config_roundtrip() {
        let config = TelexConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: TelexConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.bind_addr, config.bind_addr);
        assert_eq!(back.outbound_timeout_secs, 5);
    }
}
