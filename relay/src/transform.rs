use crate::errors::{RelayError, Result};
use crate::registry::Target;
use http::header::{HOST, HeaderMap, HeaderValue};
use http::{Method, Uri, Version};
use hyper::body::Bytes;
use shared::headers::filter_hop_by_hop;
use std::borrow::Cow;

/// Snapshot of one inbound request with its body buffered exactly once.
///
/// The body is collected up front and shared by reference between the
/// streaming predicate, the outbound request, and the access logger, so no
/// stage can consume it out from under another.
#[derive(Clone, Debug)]
pub struct InboundRequest {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl InboundRequest {
    pub fn from_parts(parts: http::request::Parts, body: Bytes) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
        }
    }

    /// Path component only; this is what prefix matching runs against.
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Path plus original query string, preserved verbatim for forwarding.
    pub fn path_and_query(&self) -> &str {
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| self.uri.path())
    }

    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// The request actually sent upstream. Method and body come from the
/// inbound snapshot.
#[derive(Debug)]
pub struct OutboundRequest {
    pub url: String,
    pub headers: HeaderMap,
}

/// Derives the upstream request from an inbound snapshot and its target.
///
/// Headers are copied with hop-by-hop names stripped and `Host` overwritten
/// with the target's configured host. The URL is the target base plus the
/// original path+query; a query credential is appended with a literal `&`
/// join (the forwarded query string supplies the `?`).
pub fn build_outbound(inbound: &InboundRequest, target: &Target) -> Result<OutboundRequest> {
    let mut headers = inbound.headers.clone();
    filter_hop_by_hop(&mut headers, inbound.version);

    let host = HeaderValue::from_str(&target.host).map_err(|_| {
        RelayError::InternalError(format!(
            "target {} host is not a valid header value",
            target.name
        ))
    })?;
    headers.insert(HOST, host);

    let mut url = format!("{}{}", target.base_url, inbound.path_and_query());
    if let Some(credential) = &target.credential {
        url.push('&');
        url.push_str(&credential.param);
        url.push('=');
        url.push_str(&credential.value);
    }

    Ok(OutboundRequest { url, headers })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamPolicy;
    use crate::registry::QueryCredential;
    use http::Request;
    use http::header::{AUTHORIZATION, CONNECTION, CONTENT_TYPE};

    fn inbound(uri: &str) -> InboundRequest {
        let (parts, _) = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(HOST, "proxy.local:8999")
            .header(AUTHORIZATION, "Bearer caller-token")
            .header(CONTENT_TYPE, "application/json")
            .header(CONNECTION, "keep-alive")
            .body(())
            .unwrap()
            .into_parts();
        InboundRequest::from_parts(parts, Bytes::from_static(b"{\"model\":\"x\"}"))
    }

    fn header_auth_target() -> Target {
        Target {
            name: "chat".to_string(),
            prefix: "/v1/chat/completions".to_string(),
            base_url: "https://api.openai.com".to_string(),
            host: "api.openai.com".to_string(),
            credential: None,
            streaming: StreamPolicy::Never,
        }
    }

    fn query_credential_target() -> Target {
        Target {
            name: "models".to_string(),
            prefix: "/v1beta/models/".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            host: "generativelanguage.googleapis.com".to_string(),
            credential: Some(QueryCredential {
                param: "key".to_string(),
                value: "test-key".to_string(),
            }),
            streaming: StreamPolicy::Never,
        }
    }

    #[test]
    fn test_host_overridden_for_header_auth_target() {
        let outbound = build_outbound(&inbound("/v1/chat/completions"), &header_auth_target())
            .unwrap();

        assert_eq!(outbound.headers.get(HOST).unwrap(), "api.openai.com");
        assert_eq!(outbound.url, "https://api.openai.com/v1/chat/completions");
        // No credential parameter for header-auth targets
        assert!(!outbound.url.contains("key="));
        // Caller auth passes through untouched
        assert_eq!(
            outbound.headers.get(AUTHORIZATION).unwrap(),
            "Bearer caller-token"
        );
    }

    #[test]
    fn test_hop_by_hop_headers_stripped() {
        let outbound = build_outbound(&inbound("/v1/chat/completions"), &header_auth_target())
            .unwrap();

        assert!(outbound.headers.get(CONNECTION).is_none());
        assert_eq!(
            outbound.headers.get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_query_credential_appended_without_query() {
        let outbound = build_outbound(&inbound("/v1beta/models/list"), &query_credential_target())
            .unwrap();

        assert_eq!(
            outbound.url,
            "https://generativelanguage.googleapis.com/v1beta/models/list&key=test-key"
        );
        assert_eq!(
            outbound.headers.get(HOST).unwrap(),
            "generativelanguage.googleapis.com"
        );
    }

    #[test]
    fn test_query_credential_appended_after_existing_query() {
        let outbound = build_outbound(
            &inbound("/v1beta/models/list?pageSize=5"),
            &query_credential_target(),
        )
        .unwrap();

        assert_eq!(
            outbound.url,
            "https://generativelanguage.googleapis.com/v1beta/models/list?pageSize=5&key=test-key"
        );
    }

    #[test]
    fn test_query_string_preserved_verbatim() {
        let outbound = build_outbound(
            &inbound("/v1/chat/completions?a=1&b=two%20words"),
            &header_auth_target(),
        )
        .unwrap();

        assert_eq!(
            outbound.url,
            "https://api.openai.com/v1/chat/completions?a=1&b=two%20words"
        );
    }

    #[test]
    fn test_inbound_path_split() {
        let req = inbound("/v1beta/models/list?pageSize=5");
        assert_eq!(req.path(), "/v1beta/models/list");
        assert_eq!(req.path_and_query(), "/v1beta/models/list?pageSize=5");
        assert_eq!(req.body_text(), "{\"model\":\"x\"}");
    }
}
