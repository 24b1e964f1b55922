// Hop 1: resolve a tracked link into the interstitial page

use super::{HopResponse, Pipeline};
use crate::capture::RequestCapture;
use crate::enrichment::error_payload;
use crate::error::{Error, Result};
use crate::ids::{gen_did, gen_uuid, timestamp_ms};
use crate::meta::extract_meta_rows;
use crate::store::{
    EnrichmentSet, Event, EventRef, Session, SessionKind, SessionRef, TempToken, TrackingRecord,
};
use serde_json::json;

impl Pipeline {
    /// Serve GET /l/{did}.
    ///
    /// On an unknown discriminator nothing is written; the caller turns the
    /// error into the uniform drop. On a known one the full visit record is
    /// minted (event, edge session, enrichments) before the response kind
    /// is even consulted, so drop-configured links still observe.
    pub async fn resolve_link(
        &self,
        did: &str,
        capture: &RequestCapture,
        socket_addr: Option<&str>,
    ) -> Result<HopResponse> {
        let record = self
            .records
            .tracking_record(did)
            .await?
            .ok_or_else(|| Error::NotFound(format!("tracking record {}", did)))?;

        let eid = gen_uuid();
        let edid = gen_did(self.config.did_length);
        let sid = gen_uuid();
        let now = timestamp_ms();
        let ip = capture.client_ip(socket_addr);

        let enrichments = self.enrich(&ip).await;

        let event = Event {
            eid: eid.clone(),
            edid: edid.clone(),
            cid: record.cid.clone(),
            did: did.to_string(),
            timestamp: now,
            sessions: vec![SessionRef {
                sid: sid.clone(),
                timestamp: now,
            }],
            enrichments: enrichments.clone(),
        };
        self.records.put_event(&event).await?;
        self.records.put_enrichments(&eid, &enrichments).await?;

        let session = Session {
            sid: sid.clone(),
            eid: eid.clone(),
            edid: edid.clone(),
            cid: record.cid.clone(),
            did: did.to_string(),
            timestamp: now,
            sessiontype: SessionKind::Edge,
            raw: json!({
                "url": capture.url,
                "ip": ip,
                "headers": capture.headers_json(),
            }),
        };
        self.records.put_session(&session).await?;

        self.records
            .append_event_ref(
                &record.cid,
                EventRef {
                    eid: eid.clone(),
                    edid: edid.clone(),
                    timestamp: now,
                },
            )
            .await?;

        tracing::info!(did, eid = %eid, edid = %edid, ip = %ip, "link resolved");

        if record.response.kind == crate::store::ResponseKind::Drop {
            return Ok(HopResponse::drop_response());
        }

        let meta = self.meta_rows(did, &record).await?;

        self.records
            .put_temp_token(&TempToken {
                did: did.to_string(),
                cid: record.cid.clone(),
                eid,
                edid: edid.clone(),
            })
            .await?;

        let redirect = record
            .response
            .destination_url
            .as_deref()
            .unwrap_or(&record.telex_link);
        let html = format!(
            "<!DOCTYPE html><html><head>{meta}<style>html {{ opacity:0 }}</style></head>\
             <body><script async src=\"{origin}/s/{edid}/{payload}\"></script>\
             <noscript>Continue to <a href=\"{redirect}\">{redirect}</a></noscript>\
             </body></html>",
            meta = meta,
            origin = capture.origin,
            edid = edid,
            payload = self.config.payload_name,
            redirect = redirect,
        );
        Ok(HopResponse::html(html))
    }

    /// Both lookups, independently degrading to an inline error payload.
    async fn enrich(&self, ip: &str) -> EnrichmentSet {
        let greynoise = match self.enrichment.reputation(ip).await {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(ip, error = %err, "reputation lookup failed");
                error_payload(&err)
            }
        };
        let ipinfo = match self.enrichment.geolocation(ip).await {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(ip, error = %err, "geolocation lookup failed");
                error_payload(&err)
            }
        };
        EnrichmentSet { greynoise, ipinfo }
    }

    /// Destination page tags, cached per discriminator. A failed fetch
    /// falls back to a plain redirect title rather than blocking the hop.
    async fn meta_rows(&self, did: &str, record: &TrackingRecord) -> Result<String> {
        if let Some(cached) = self.records.cached_metadata(did).await? {
            return Ok(cached);
        }
        let rows = match record.response.destination_url.as_deref() {
            Some(url) => match self.metadata.fetch_html(url).await {
                Some(html) => extract_meta_rows(&html),
                None => crate::meta::FALLBACK_META.to_string(),
            },
            None => crate::meta::FALLBACK_META.to_string(),
        };
        self.records.put_cached_metadata(did, rows.clone()).await?;
        Ok(rows)
    }
}
