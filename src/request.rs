use axum::http::header::{IF_MODIFIED_SINCE, IF_NONE_MATCH, RANGE};
use axum::http::{HeaderMap, HeaderName, Method};

/// The parts of an inbound request a download looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadRequest {
    pub method: Method,
    /// Raw `Range` header text.
    pub range: Option<String>,
    /// Raw `If-Modified-Since` header text.
    pub if_modified_since: Option<String>,
    /// Raw `If-None-Match` header text.
    pub if_none_match: Option<String>,
}

impl DownloadRequest {
    pub fn get() -> Self {
        DownloadRequest::default()
    }

    pub fn head() -> Self {
        DownloadRequest { method: Method::HEAD, ..DownloadRequest::default() }
    }

    /// Pulls the relevant headers out of an inbound request. Values that are
    /// not visible ASCII are treated as missing.
    pub fn from_headers(method: &Method, headers: &HeaderMap) -> Self {
        let text = |name: HeaderName| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned)
        };

        DownloadRequest {
            method: method.clone(),
            range: text(RANGE),
            if_modified_since: text(IF_MODIFIED_SINCE),
            if_none_match: text(IF_NONE_MATCH),
        }
    }

    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.range = Some(range.into());
        self
    }

    pub fn with_if_modified_since(mut self, date: impl Into<String>) -> Self {
        self.if_modified_since = Some(date.into());
        self
    }

    pub fn with_if_none_match(mut self, tags: impl Into<String>) -> Self {
        self.if_none_match = Some(tags.into());
        self
    }

    /// HEAD requests get headers only.
    pub fn wants_body(&self) -> bool {
        self.method != Method::HEAD
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(RANGE, HeaderValue::from_static("bytes=0-2"));
        headers.insert(IF_MODIFIED_SINCE, HeaderValue::from_static("Sun, 06 Nov 1994 08:49:37 GMT"));

        let request = DownloadRequest::from_headers(&Method::GET, &headers);
        assert_eq!(Some("bytes=0-2"), request.range.as_deref());
        assert_eq!(Some("Sun, 06 Nov 1994 08:49:37 GMT"), request.if_modified_since.as_deref());
        assert_eq!(None, request.if_none_match);
        assert!(request.wants_body());

        let request = DownloadRequest::from_headers(&Method::HEAD, &HeaderMap::new());
        assert_eq!(DownloadRequest::head(), request);
        assert!(!request.wants_body());
    }
}
