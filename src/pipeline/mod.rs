// Hop pipeline: resolver (hop 1), dispatcher (hop 2), collection (hop 3)

mod admin;
mod collection;
mod dispatcher;
mod resolver;

use crate::config::TelexConfig;
use crate::enrichment::EnrichmentClient;
use crate::meta::MetadataFetcher;
use crate::store::{AttributionRecordStore, KeyValueStore};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

/// A finished hop response, transport-neutral so pipeline tests run
/// without binding a listener.
#[derive(Debug, Clone)]
pub struct HopResponse {
    pub status: u16,
    pub content_type: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HopResponse {
    pub fn html(body: String) -> Self {
        Self {
            status: 200,
            content_type: "text/html;charset=UTF-8".to_string(),
            headers: Vec::new(),
            body,
        }
    }

    pub fn javascript(body: String) -> Self {
        Self {
            status: 200,
            content_type: "application/javascript;charset=UTF-8".to_string(),
            headers: Vec::new(),
            body,
        }
    }

    pub fn json(body: String) -> Self {
        Self {
            status: 200,
            content_type: "application/json;charset=UTF-8".to_string(),
            headers: Vec::new(),
            body,
        }
    }

    /// The uniform refusal. Every failure, whatever its cause, collapses
    /// to this same empty 400 so probing traffic learns nothing from the
    /// response shape.
    pub fn drop_response() -> Self {
        Self {
            status: 400,
            content_type: "text/plain;charset=UTF-8".to_string(),
            headers: vec![
                ("cache-control".to_string(), "no-store".to_string()),
                ("content-length".to_string(), "0".to_string()),
            ],
            body: String::new(),
        }
    }

}

impl IntoResponse for HopResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::BAD_REQUEST);
        let mut builder = Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, self.content_type);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
            .body(self.body.into())
            .unwrap_or_else(|_| StatusCode::BAD_REQUEST.into_response())
    }
}

/// Shared pipeline state. One instance serves every hop.
pub struct Pipeline {
    records: AttributionRecordStore,
    enrichment: Arc<dyn EnrichmentClient>,
    metadata: Arc<dyn MetadataFetcher>,
    config: TelexConfig,
}

impl Pipeline {
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        enrichment: Arc<dyn EnrichmentClient>,
        metadata: Arc<dyn MetadataFetcher>,
        config: TelexConfig,
    ) -> Self {
        Self {
            records: AttributionRecordStore::new(kv),
            enrichment,
            metadata,
            config,
        }
    }

    pub fn records(&self) -> &AttributionRecordStore {
        &self.records
    }

    pub fn config(&self) -> &TelexConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_response_shape() {
        let drop = HopResponse::drop_response();
        assert_eq!(drop.status, 400);
        assert_eq!(drop.content_type, "text/plain;charset=UTF-8");
        assert!(drop.body.is_empty());
        assert!(drop
            .headers
            .iter()
            .any(|(k, v)| k == "cache-control" && v == "no-store"));
        assert!(drop
            .headers
            .iter()
            .any(|(k, v)| k == "content-length" && v == "0"));
    }

    #[test]
    fn test_content_types() {
        assert_eq!(
            HopResponse::javascript(String::new()).content_type,
            "application/javascript;charset=UTF-8"
        );
        assert_eq!(
            HopResponse::html(String::new()).content_type,
            "text/html;charset=UTF-8"
        );
    }
}
