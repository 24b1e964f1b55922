// Typed record accessors over the key-value store

use crate::error::{Error, Result};
use crate::store::{KeyValueStore, Partition};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Reference to an event, appended to a collector per distinct visit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRef {
    pub eid: String,
    pub edid: String,
    pub timestamp: i64,
}

/// Reference to a session, appended to an event per hop reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRef {
    pub sid: String,
    pub timestamp: i64,
}

/// Registered destination URL plus the durable link-to-visit mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collector {
    pub cid: String,
    pub did: String,
    pub destination_url: String,
    pub collector_host: String,
    pub telex_link: String,
    pub timestamp: i64,
    #[serde(default)]
    pub events: Vec<EventRef>,
}

/// Terminal behavior for a resolved discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    /// Continue the pipeline: deliver the redirector and script payloads.
    Payload,
    /// Terminate immediately with the uniform drop response.
    Drop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseSpec {
    #[serde(rename = "type")]
    pub kind: ResponseKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_2: Option<String>,
}

/// Resolved behavior for a discriminator ("tnr"). Immutable after creation
/// and read-only to all three hop handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingRecord {
    pub cid: String,
    pub did: String,
    pub response: ResponseSpec,
    pub collector_host: String,
    pub telex_link: String,
    pub timestamp: i64,
}

/// Enrichment results captured once at event creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentSet {
    pub greynoise: Value,
    pub ipinfo: Value,
}

/// One logical visit, spanning up to three hops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub eid: String,
    pub edid: String,
    pub cid: String,
    pub did: String,
    pub timestamp: i64,
    #[serde(default)]
    pub sessions: Vec<SessionRef>,
    pub enrichments: EnrichmentSet,
}

/// Which hop produced a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Edge,
    Script,
    Postdata,
}

/// One HTTP interaction within a visit. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub sid: String,
    pub eid: String,
    pub edid: String,
    pub cid: String,
    pub did: String,
    pub timestamp: i64,
    pub sessiontype: SessionKind,
    pub raw: Value,
}

/// Hop-to-hop binding minted by the link resolver. Lets hops 2 and 3
/// recover permanent context from the opaque `edid` without re-exposing
/// `did`/`cid` in client-visible URLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TempToken {
    pub did: String,
    pub cid: String,
    pub eid: String,
    pub edid: String,
}

/// Typed accessors over the key-value store for the five entity kinds.
///
/// Owns the read-modify-write semantics for the two append operations.
/// Those appends race under concurrency (last write wins) because the
/// backing store offers no compare-and-swap; see the KeyValueStore docs.
#[derive(Clone)]
pub struct AttributionRecordStore {
    kv: Arc<dyn KeyValueStore>,
}

impl AttributionRecordStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        partition: Partition,
        key: &str,
    ) -> Result<Option<T>> {
        match self.kv.get(partition, key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn put_json<T: Serialize>(
        &self,
        partition: Partition,
        key: &str,
        value: &T,
    ) -> Result<()> {
        self.kv
            .put(partition, key, serde_json::to_string(value)?)
            .await
    }

    pub async fn collector(&self, cid: &str) -> Result<Option<Collector>> {
        self.get_json(Partition::Collectors, cid).await
    }

    pub async fn put_collector(&self, collector: &Collector) -> Result<()> {
        self.put_json(Partition::Collectors, &collector.cid, collector)
            .await
    }

    pub async fn tracking_record(&self, did: &str) -> Result<Option<TrackingRecord>> {
        self.get_json(Partition::TrackingRecords, did).await
    }

    pub async fn put_tracking_record(&self, record: &TrackingRecord) -> Result<()> {
        self.put_json(Partition::TrackingRecords, &record.did, record)
            .await
    }

    pub async fn event(&self, eid: &str) -> Result<Option<Event>> {
        self.get_json(Partition::Events, eid).await
    }

    pub async fn put_event(&self, event: &Event) -> Result<()> {
        self.put_json(Partition::Events, &event.eid, event).await
    }

    pub async fn session(&self, sid: &str) -> Result<Option<Session>> {
        self.get_json(Partition::Sessions, sid).await
    }

    pub async fn put_session(&self, session: &Session) -> Result<()> {
        self.put_json(Partition::Sessions, &session.sid, session)
            .await
    }

    pub async fn temp_token(&self, edid: &str) -> Result<Option<TempToken>> {
        self.get_json(Partition::TempTokens, edid).await
    }

    pub async fn put_temp_token(&self, token: &TempToken) -> Result<()> {
        self.put_json(Partition::TempTokens, &token.edid, token)
            .await
    }

    /// Append an event reference to a collector (read-modify-write).
    pub async fn append_event_ref(&self, cid: &str, entry: EventRef) -> Result<()> {
        let mut collector = self
            .collector(cid)
            .await?
            .ok_or_else(|| Error::NotFound(format!("collector {}", cid)))?;
        collector.events.push(entry);
        self.put_collector(&collector).await
    }

    /// Append a session reference to an event (read-modify-write).
    pub async fn append_session_ref(&self, eid: &str, entry: SessionRef) -> Result<()> {
        let mut event = self
            .event(eid)
            .await?
            .ok_or_else(|| Error::NotFound(format!("event {}", eid)))?;
        event.sessions.push(entry);
        self.put_event(&event).await
    }

    /// Persist an event's enrichment pair under its own key for audit
    /// retrieval, separate from the event record.
    pub async fn put_enrichments(&self, eid: &str, enrichments: &EnrichmentSet) -> Result<()> {
        self.put_json(Partition::ReputationCache, eid, enrichments)
            .await
    }

    /// Raw script template body (payload-templates holds text, not JSON).
    pub async fn template(&self, name: &str) -> Result<Option<String>> {
        self.kv.get(Partition::PayloadTemplates, name).await
    }

    pub async fn put_template(&self, name: &str, body: String) -> Result<()> {
        self.kv.put(Partition::PayloadTemplates, name, body).await
    }

    pub async fn cached_metadata(&self, did: &str) -> Result<Option<String>> {
        self.kv.get(Partition::MetadataCache, did).await
    }

    pub async fn put_cached_metadata(&self, did: &str, tags: String) -> Result<()> {
        self.kv.put(Partition::MetadataCache, did, tags).await
    }

    /// Operator API credential map: token -> {"role": ...}.
    pub async fn api_auth(&self) -> Result<Option<Value>> {
        self.get_json(Partition::AuthTokens, "tx-api-auth").await
    }

    /// Credential for an upstream enrichment provider ("greynoise",
    /// "ipinfo"). Stored as raw text.
    pub async fn provider_token(&self, provider: &str) -> Result<Option<String>> {
        self.kv.get(Partition::AuthTokens, provider).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn test_store() -> AttributionRecordStore {
        AttributionRecordStore::new(Arc::new(MemoryStore::new()))
    }

    fn test_collector() -> Collector {
        Collector {
            cid: "c-1".to_string(),
            did: "Ab3xY-_".to_string(),
            destination_url: "https://example.com".to_string(),
            collector_host: "https://telex.test".to_string(),
            telex_link: "https://telex.test/l/Ab3xY-_".to_string(),
            timestamp: 1_700_000_000_000,
            events: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_collector_roundtrip() {
        let store = test_store();
        let collector = test_collector();
        store.put_collector(&collector).await.unwrap();

        let loaded = store.collector("c-1").await.unwrap().unwrap();
        assert_eq!(loaded.did, "Ab3xY-_");
        assert!(loaded.events.is_empty());
    }

    #[tokio::test]
    async fn test_append_event_ref_grows_by_one() {
        let store = test_store();
        store.put_collector(&test_collector()).await.unwrap();

        for n in 1..=3 {
            store
                .append_event_ref(
                    "c-1",
                    EventRef {
                        eid: format!("e-{}", n),
                        edid: format!("ed-{}", n),
                        timestamp: n,
                    },
                )
                .await
                .unwrap();
            let collector = store.collector("c-1").await.unwrap().unwrap();
            assert_eq!(collector.events.len(), n as usize);
        }
    }

    #[tokio::test]
    async fn test_append_event_ref_missing_collector() {
        let store = test_store();
        let err = store
            .append_event_ref(
                "nope",
                EventRef {
                    eid: "e".to_string(),
                    edid: "ed".to_string(),
                    timestamp: 0,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_tracking_record_response_type_serde() {
        let store = test_store();
        let record = TrackingRecord {
            cid: "c-1".to_string(),
            did: "d-1".to_string(),
            response: ResponseSpec {
                kind: ResponseKind::Drop,
                destination_url: None,
                payload_1: None,
                payload_2: None,
            },
            collector_host: "https://telex.test".to_string(),
            telex_link: "https://telex.test/l/d-1".to_string(),
            timestamp: 0,
        };
        store.put_tracking_record(&record).await.unwrap();

        // The wire field is "type" with lowercase values.
        let raw = serde_json::to_value(&record).unwrap();
        assert_eq!(raw["response"]["type"], "drop");

        let loaded = store.tracking_record("d-1").await.unwrap().unwrap();
        assert_eq!(loaded.response.kind, ResponseKind::Drop);
    }

    #[tokio::test]
    async fn test_session_kind_wire_names() {
        let session = Session {
            sid: "s-1".to_string(),
            eid: "e-1".to_string(),
            edid: "ed-1".to_string(),
            cid: "c-1".to_string(),
            did: "d-1".to_string(),
            timestamp: 0,
            sessiontype: SessionKind::Postdata,
            raw: json!({"request": {}}),
        };
        let raw = serde_json::to_value(&session).unwrap();
        assert_eq!(raw["sessiontype"], "postdata");
    }

    #[tokio::test]
    async fn test_append_session_ref() {
        let store = test_store();
        let event = Event {
            eid: "e-1".to_string(),
            edid: "ed-1".to_string(),
            cid: "c-1".to_string(),
            did: "d-1".to_string(),
            timestamp: 0,
            sessions: vec![SessionRef {
                sid: "s-1".to_string(),
                timestamp: 0,
            }],
            enrichments: EnrichmentSet {
                greynoise: json!({}),
                ipinfo: json!({}),
            },
        };
        store.put_event(&event).await.unwrap();

        store
            .append_session_ref(
                "e-1",
                SessionRef {
                    sid: "s-2".to_string(),
                    timestamp: 1,
                },
            )
            .await
            .unwrap();

        let loaded = store.event("e-1").await.unwrap().unwrap();
        assert_eq!(loaded.sessions.len(), 2);
        assert_eq!(loaded.sessions[1].sid, "s-2");
    }

    #[tokio::test]
    async fn test_templates_are_raw_text() {
        let store = test_store();
        store
            .put_template("tx_header", "var p_ = {};".to_string())
            .await
            .unwrap();
        let body = store.template("tx_header").await.unwrap().unwrap();
        assert_eq!(body, "var p_ = {};");
    }
}
