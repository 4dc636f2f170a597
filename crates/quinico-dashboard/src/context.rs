use std::collections::HashMap;
use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::header::HOST;
use axum::http::request::Parts;
use axum::http::{HeaderMap, Uri};
use url::form_urlencoded;

/// Header set by the authenticating proxy in front of the dashboard.
pub const REMOTE_USER_HEADER: &str = "x-remote-user";

const FALLBACK_HOST: &str = "localhost";

/// Decoded query parameters. A repeated key keeps its last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryMap(HashMap<String, String>);

impl QueryMap {
    pub fn parse(raw: &str) -> Self {
        Self(form_urlencoded::parse(raw.as_bytes()).into_owned().collect())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everything a view needs from the incoming request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub query: QueryMap,
    pub host: String,
    pub user: Option<String>,
}

impl RequestContext {
    pub fn from_request(uri: &Uri, headers: &HeaderMap) -> Self {
        let query = uri.query().map(QueryMap::parse).unwrap_or_default();
        let host = header_value(headers, HOST.as_str()).unwrap_or(FALLBACK_HOST);
        let user = header_value(headers, REMOTE_USER_HEADER).map(str::to_owned);

        Self {
            query,
            host: host.to_owned(),
            user,
        }
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_request(&parts.uri, &parts.headers))
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn query_values_are_decoded_and_last_wins() {
        let query = QueryMap::parse("keyword=baby+names%26more&format=db&format=csv");
        assert_eq!(query.get("keyword"), Some("baby names&more"));
        assert_eq!(query.get("format"), Some("csv"));
        assert_eq!(query.get("missing"), None);
        assert!(QueryMap::parse("").is_empty());
    }

    #[test]
    fn context_reads_host_and_remote_user() {
        let uri: Uri = "/keyword_rank/dashboard?id=3".parse().expect("uri");
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("reports.example.com"));
        headers.insert(REMOTE_USER_HEADER, HeaderValue::from_static(" alice "));

        let ctx = RequestContext::from_request(&uri, &headers);
        assert_eq!(ctx.host, "reports.example.com");
        assert_eq!(ctx.user.as_deref(), Some("alice"));
        assert_eq!(ctx.query.get("id"), Some("3"));
    }

    #[test]
    fn missing_headers_fall_back() {
        let uri: Uri = "/dashboard".parse().expect("uri");
        let mut headers = HeaderMap::new();
        headers.insert(REMOTE_USER_HEADER, HeaderValue::from_static("   "));

        let ctx = RequestContext::from_request(&uri, &headers);
        assert_eq!(ctx.host, FALLBACK_HOST);
        assert_eq!(ctx.user, None);
        assert!(ctx.query.is_empty());
    }
}
