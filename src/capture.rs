// Transport-neutral snapshot of an inbound request

use serde_json::Value;
use std::collections::BTreeMap;

/// Everything the pipeline needs to know about an inbound request,
/// detached from the HTTP framework so hop logic is testable directly.
#[derive(Debug, Clone)]
pub struct RequestCapture {
    pub method: String,
    pub url: String,
    /// Scheme and authority serving this request, used to build the
    /// absolute URLs embedded in hop responses.
    pub origin: String,
    pub path: String,
    /// Header names lowercased on insertion.
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
}

impl RequestCapture {
    pub fn new(method: &str, origin: &str, path: &str) -> Self {
        Self {
            method: method.to_string(),
            url: format!("{}{}", origin, path),
            origin: origin.to_string(),
            path: path.to_string(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Best-effort client address, walking the usual proxy headers before
    /// falling back to the socket peer.
    pub fn client_ip(&self, socket_addr: Option<&str>) -> String {
        if let Some(ip) = self.header("cf-connecting-ip") {
            return ip.trim().to_string();
        }
        if let Some(forwarded) = self.header("x-forwarded-for") {
            // First entry is the original client, the rest are proxies.
            if let Some(first) = forwarded.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return first.to_string();
                }
            }
        }
        if let Some(ip) = self.header("x-real-ip") {
            return ip.trim().to_string();
        }
        socket_addr.unwrap_or("0.0.0.0").to_string()
    }

    /// Header subset recorded on sessions: everything the client sent,
    /// as a JSON object.
    pub fn headers_json(&self) -> Value {
        let map: serde_json::Map<String, Value> = self
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_ip_prefers_cf_header() {
        let capture = RequestCapture::new("GET", "https://t.example", "/l/abc")
            .with_header("CF-Connecting-IP", "203.0.113.7")
            .with_header("x-forwarded-for", "198.51.100.1, 10.0.0.1");
        assert_eq!(capture.client_ip(Some("10.0.0.2")), "203.0.113.7");
    }

    #[test]
    fn test_client_ip_forwarded_for_first_entry() {
        let capture = RequestCapture::new("GET", "https://t.example", "/l/abc")
            .with_header("X-Forwarded-For", " 198.51.100.1 , 10.0.0.1");
        assert_eq!(capture.client_ip(None), "198.51.100.1");
    }

    #[test]
    fn test_client_ip_real_ip_then_socket() {
        let capture = RequestCapture::new("GET", "https://t.example", "/l/abc")
            .with_header("x-real-ip", "192.0.2.9");
        assert_eq!(capture.client_ip(Some("10.0.0.2")), "192.0.2.9");

        let bare = RequestCapture::new("GET", "https://t.example", "/l/abc");
        assert_eq!(bare.client_ip(Some("10.0.0.2")), "10.0.0.2");
        assert_eq!(bare.client_ip(None), "0.0.0.0");
    }

    #[test]
    fn test_headers_lowercased_and_exported() {
        let capture = RequestCapture::new("POST", "https://t.example", "/p/x/y")
            .with_header("User-Agent", "curl/8.0")
            .with_body(json!({"p": "data"}));
        assert_eq!(capture.header("user-agent"), Some("curl/8.0"));
        assert_eq!(capture.headers_json()["user-agent"], "curl/8.0");
        assert_eq!(capture.url, "https://t.example/p/x/y");
    }
}
