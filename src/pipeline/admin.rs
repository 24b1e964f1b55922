// Operator surface: collector registration and record audit reads

use super::{HopResponse, Pipeline};
use crate::capture::RequestCapture;
use crate::error::{Error, Result};
use crate::ids::{gen_did, gen_uuid, timestamp_ms};
use crate::meta::ensure_scheme;
use crate::store::{Collector, ResponseKind, ResponseSpec, TrackingRecord};
use serde_json::json;

impl Pipeline {
    /// Serve POST /create.
    ///
    /// Registers a destination URL and mints the link that points at it.
    /// Requires a PUBLIC-role credential in the `x-tx-auth` header; any
    /// auth failure is indistinguishable from a bad request.
    pub async fn create_collector(&self, capture: &RequestCapture) -> Result<HopResponse> {
        self.authorize(capture, Some("PUBLIC")).await?;

        let url = capture
            .body
            .as_ref()
            .and_then(|b| b.get("u"))
            .and_then(|u| u.as_str())
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| Error::MalformedRequest("missing \"u\" member".to_string()))?;
        let destination_url = ensure_scheme(url.trim());

        let cid = gen_uuid();
        let did = gen_did(self.config.did_length);
        let now = timestamp_ms();
        let origin = capture.origin.clone();
        let telex_link = format!("{}/l/{}", origin, did);

        self.records
            .put_collector(&Collector {
                cid: cid.clone(),
                did: did.clone(),
                destination_url: destination_url.clone(),
                collector_host: origin.clone(),
                telex_link: telex_link.clone(),
                timestamp: now,
                events: Vec::new(),
            })
            .await?;
        self.records
            .put_tracking_record(&TrackingRecord {
                cid: cid.clone(),
                did: did.clone(),
                response: ResponseSpec {
                    kind: ResponseKind::Payload,
                    destination_url: Some(destination_url),
                    payload_1: Some(self.config.default_script_payload.clone()),
                    payload_2: Some(self.config.default_response_payload.clone()),
                },
                collector_host: origin.clone(),
                telex_link,
                timestamp: now,
            })
            .await?;

        tracing::info!(cid = %cid, did = %did, "collector created");

        Ok(HopResponse::json(
            json!({ "goto": format!("{}/c/{}", origin, cid) }).to_string(),
        ))
    }

    /// Serve GET /events/{eid}. Credentialed audit read of a full event.
    pub async fn audit_event(&self, eid: &str, capture: &RequestCapture) -> Result<HopResponse> {
        self.authorize(capture, None).await?;
        let event = self
            .records
            .event(eid)
            .await?
            .ok_or_else(|| Error::NotFound(format!("event {}", eid)))?;
        Ok(HopResponse::json(serde_json::to_string(&event)?))
    }

    /// Serve GET /sessions/{sid}. Credentialed audit read of one hop.
    pub async fn audit_session(&self, sid: &str, capture: &RequestCapture) -> Result<HopResponse> {
        self.authorize(capture, None).await?;
        let session = self
            .records
            .session(sid)
            .await?
            .ok_or_else(|| Error::NotFound(format!("session {}", sid)))?;
        Ok(HopResponse::json(serde_json::to_string(&session)?))
    }

    /// Check the `x-tx-auth` credential against the stored token map
    /// (token -> {"role": ...}). `required_role` of None accepts any
    /// registered token.
    async fn authorize(&self, capture: &RequestCapture, required_role: Option<&str>) -> Result<()> {
        let presented = capture.header("x-tx-auth").ok_or(Error::Unauthorized)?;
        let map = self.records.api_auth().await?.ok_or(Error::Unauthorized)?;
        let entry = map.get(presented).ok_or(Error::Unauthorized)?;
        if let Some(role) = required_role {
            if entry.get("role").and_then(|r| r.as_str()) != Some(role) {
                return Err(Error::Unauthorized);
            }
        }
        Ok(())
    }
}
