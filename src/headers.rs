use axum::http::header::{
    ACCEPT_RANGES, CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, ETAG,
    EXPIRES, PRAGMA,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum_extra::headers::{ContentRange, HeaderMapExt, LastModified};

use crate::{CacheMode, Classification, Disposition, DownloadOptions, ResourceMetadata, TransferPlan};

const CONTENT_TRANSFER_ENCODING: HeaderName = HeaderName::from_static("content-transfer-encoding");

/// Headers for `plan`, in the order they are handed to the sink.
pub(crate) fn response_headers(
    plan: &TransferPlan,
    meta: &ResourceMetadata,
    options: &DownloadOptions,
) -> HeaderMap {
    let mut headers = HeaderMap::new();

    match plan.classification() {
        Classification::RangeNotSatisfiable => {
            headers.typed_insert(ContentRange::unsatisfied_bytes(plan.size()));
        }
        Classification::Unsupported => {}
        Classification::NotModified => {
            cache_headers(&mut headers, options.cache_mode, meta);
        }
        Classification::FullContent | Classification::SingleRange | Classification::MultiRange => {
            headers.insert(
                CONTENT_DISPOSITION,
                content_disposition(options.disposition, options.file_name.as_deref()),
            );

            let content_type = match plan.boundary() {
                Some(boundary) => format!("multipart/byteranges; boundary={boundary}"),
                None => plan.mime().to_owned(),
            };
            let content_type = HeaderValue::try_from(content_type).unwrap_or_else(|_| {
                tracing::debug!(mime = plan.mime(), "mime type is not a valid header value");
                HeaderValue::from_static("application/octet-stream")
            });
            headers.insert(CONTENT_TYPE, content_type);

            headers.insert(CONTENT_TRANSFER_ENCODING, HeaderValue::from_static("binary"));
            headers.insert(
                ACCEPT_RANGES,
                HeaderValue::from_static(if options.byte_ranges { "bytes" } else { "none" }),
            );
            cache_headers(&mut headers, options.cache_mode, meta);

            if let Some(length) = plan.content_length() {
                headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
            }
            if plan.classification() == Classification::SingleRange {
                if let [range] = plan.ranges().as_slice() {
                    let content_range = format!("bytes {}-{}/{}", range.start(), range.end(), plan.size());
                    if let Ok(value) = HeaderValue::try_from(content_range) {
                        headers.insert(CONTENT_RANGE, value);
                    }
                }
            }
        }
    }

    headers
}

fn cache_headers(headers: &mut HeaderMap, mode: CacheMode, meta: &ResourceMetadata) {
    match mode {
        CacheMode::Never => {
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache, must-revalidate, max-age=0"));
            headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
            headers.insert(EXPIRES, HeaderValue::from_static("0"));
        }
        CacheMode::Revalidate => {
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("must-revalidate"));
            headers.insert(PRAGMA, HeaderValue::from_static("public"));
            if let Some(last_modified) = meta.last_modified {
                headers.typed_insert(LastModified::from(last_modified));
            }
            if let Some(tag) = meta.entity_tag.as_deref() {
                match HeaderValue::try_from(quoted_entity_tag(tag)) {
                    Ok(value) => {
                        headers.insert(ETAG, value);
                    }
                    Err(_) => tracing::debug!(tag, "entity tag is not a valid header value"),
                }
            }
        }
        CacheMode::Omit => {}
    }
}

/// Wraps an opaque tag in quotes unless it already is a quoted or weak tag.
pub(crate) fn quoted_entity_tag(tag: &str) -> String {
    if tag.starts_with('"') || tag.starts_with("W/\"") {
        tag.to_owned()
    } else {
        format!("\"{tag}\"")
    }
}

fn content_disposition(disposition: Disposition, file_name: Option<&str>) -> HeaderValue {
    let Some(name) = file_name else {
        return HeaderValue::from_static(disposition.as_str());
    };

    let mut value = format!("{}; filename=\"", disposition.as_str());
    for c in name.chars() {
        match c {
            '"' | '\\' => {
                value.push('\\');
                value.push(c);
            }
            c if c.is_ascii() && !c.is_ascii_control() => value.push(c),
            _ => value.push('_'),
        }
    }
    value.push('"');

    if !name.is_ascii() {
        value.push_str("; filename*=UTF-8''");
        value.push_str(&percent_encode(name));
    }

    HeaderValue::try_from(value).unwrap_or_else(|_| HeaderValue::from_static(disposition.as_str()))
}

// RFC 5987 attr-char escaping
fn percent_encode(text: &str) -> String {
    let mut encoded = String::with_capacity(text.len() * 3);
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' => encoded.push(byte as char),
            b'!' | b'#' | b'$' | b'&' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use super::*;
    use crate::{ByteRange, RangeSet};

    fn meta() -> ResourceMetadata {
        ResourceMetadata {
            size: 18,
            mime: "text/plain".to_string(),
            last_modified: Some(UNIX_EPOCH + Duration::from_secs(784111777)),
            entity_tag: Some("v1".to_string()),
        }
    }

    fn get<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
        headers.get(name).and_then(|v| v.to_str().ok())
    }

    #[test]
    fn test_full_content_headers() {
        let options = DownloadOptions { file_name: Some("foo.txt".to_string()), ..DownloadOptions::default() };
        let headers = response_headers(&TransferPlan::full(18, "text/plain"), &meta(), &options);

        assert_eq!(Some("attachment; filename=\"foo.txt\""), get(&headers, "content-disposition"));
        assert_eq!(Some("text/plain"), get(&headers, "content-type"));
        assert_eq!(Some("binary"), get(&headers, "content-transfer-encoding"));
        assert_eq!(Some("bytes"), get(&headers, "accept-ranges"));
        assert_eq!(Some("18"), get(&headers, "content-length"));
        assert_eq!(Some("no-cache, must-revalidate, max-age=0"), get(&headers, "cache-control"));
        assert_eq!(Some("no-cache"), get(&headers, "pragma"));
        assert!(headers.get("content-range").is_none());
        assert!(headers.get("etag").is_none());
    }

    #[test]
    fn test_single_range_headers() {
        let ranges = RangeSet::join(vec![ByteRange::new(0, 2).unwrap()]);
        let options = DownloadOptions { disposition: Disposition::Inline, ..DownloadOptions::default() };
        let headers = response_headers(&TransferPlan::single(ranges, 18, "text/plain"), &meta(), &options);

        assert_eq!(Some("inline"), get(&headers, "content-disposition"));
        assert_eq!(Some("bytes 0-2/18"), get(&headers, "content-range"));
        assert_eq!(Some("3"), get(&headers, "content-length"));
    }

    #[test]
    fn test_multi_range_headers() {
        let ranges = RangeSet::join(vec![ByteRange::new(0, 2).unwrap(), ByteRange::new(8, 12).unwrap()]);
        let plan = TransferPlan::multi(ranges, "sep".to_string(), 18, "text/plain");
        let headers = response_headers(&plan, &meta(), &DownloadOptions::default());

        assert_eq!(Some("multipart/byteranges; boundary=sep"), get(&headers, "content-type"));
        let length = plan.content_length().unwrap().to_string();
        assert_eq!(Some(length.as_str()), get(&headers, "content-length"));
        assert!(headers.get("content-range").is_none());
    }

    #[test]
    fn test_revalidate_headers() {
        let options = DownloadOptions { cache_mode: CacheMode::Revalidate, ..DownloadOptions::default() };
        let headers = response_headers(&TransferPlan::full(18, "text/plain"), &meta(), &options);

        assert_eq!(Some("must-revalidate"), get(&headers, "cache-control"));
        assert_eq!(Some("public"), get(&headers, "pragma"));
        assert_eq!(Some("Sun, 06 Nov 1994 08:49:37 GMT"), get(&headers, "last-modified"));
        assert_eq!(Some("\"v1\""), get(&headers, "etag"));

        // no validators, nothing to revalidate against
        let bare = ResourceMetadata { last_modified: None, entity_tag: None, ..meta() };
        let headers = response_headers(&TransferPlan::full(18, "text/plain"), &bare, &options);
        assert_eq!(Some("must-revalidate"), get(&headers, "cache-control"));
        assert!(headers.get("last-modified").is_none());
        assert!(headers.get("etag").is_none());
    }

    #[test]
    fn test_omitted_cache_headers() {
        let options = DownloadOptions { cache_mode: CacheMode::Omit, byte_ranges: false, ..DownloadOptions::default() };
        let headers = response_headers(&TransferPlan::full(18, "text/plain"), &meta(), &options);

        assert!(headers.get("cache-control").is_none());
        assert!(headers.get("pragma").is_none());
        assert!(headers.get("expires").is_none());
        assert_eq!(Some("none"), get(&headers, "accept-ranges"));
    }

    #[test]
    fn test_header_only_statuses() {
        let plan = TransferPlan::without_ranges(Classification::RangeNotSatisfiable, 18, "text/plain");
        let headers = response_headers(&plan, &meta(), &DownloadOptions::default());
        assert_eq!(Some("bytes */18"), get(&headers, "content-range"));
        assert_eq!(1, headers.len());

        let plan = TransferPlan::without_ranges(Classification::Unsupported, 18, "text/plain");
        assert!(response_headers(&plan, &meta(), &DownloadOptions::default()).is_empty());

        let options = DownloadOptions { cache_mode: CacheMode::Revalidate, ..DownloadOptions::default() };
        let plan = TransferPlan::without_ranges(Classification::NotModified, 18, "text/plain");
        let headers = response_headers(&plan, &meta(), &options);
        assert_eq!(Some("\"v1\""), get(&headers, "etag"));
        assert!(headers.get("content-length").is_none());
    }

    #[test]
    fn test_file_name_escaping() {
        let value = content_disposition(Disposition::Attachment, Some("a \"quoted\" name.txt"));
        assert_eq!("attachment; filename=\"a \\\"quoted\\\" name.txt\"", value.to_str().unwrap());

        let value = content_disposition(Disposition::Attachment, Some("résumé.pdf"));
        assert_eq!(
            "attachment; filename=\"r_sum_.pdf\"; filename*=UTF-8''r%C3%A9sum%C3%A9.pdf",
            value.to_str().unwrap(),
        );
    }

    #[test]
    fn test_quoted_entity_tag() {
        assert_eq!("\"abc\"", quoted_entity_tag("abc"));
        assert_eq!("\"abc\"", quoted_entity_tag("\"abc\""));
        assert_eq!("W/\"abc\"", quoted_entity_tag("W/\"abc\""));
    }

    #[test]
    fn test_last_modified_is_http_date() {
        let meta = ResourceMetadata { last_modified: Some(SystemTime::UNIX_EPOCH), ..meta() };
        let options = DownloadOptions { cache_mode: CacheMode::Revalidate, ..DownloadOptions::default() };
        let headers = response_headers(&TransferPlan::full(18, "text/plain"), &meta, &options);
        assert_eq!(Some("Thu, 01 Jan 1970 00:00:00 GMT"), get(&headers, "last-modified"));
    }
}
