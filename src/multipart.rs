//! `multipart/byteranges` framing.
//!
//! Each part is written as
//!
//! ```text
//! \r\n--<boundary>\r\n
//! Content-Type: <mime>\r\n
//! Content-Range: bytes <start>-<end>/<size>\r\n
//! \r\n
//! <part bytes>
//! ```
//!
//! and the body ends with `\r\n--<boundary>--\r\n`. The exact body length is
//! computed from the same functions so `Content-Length` can be sent first.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::{ByteRange, RangeSet};

/// Framing written ahead of one part's bytes.
pub(crate) fn part_header(boundary: &str, mime: &str, range: &ByteRange, size: u64) -> String {
    format!(
        "\r\n--{boundary}\r\n\
         Content-Type: {mime}\r\n\
         Content-Range: bytes {}-{}/{size}\r\n\r\n",
        range.start(),
        range.end(),
    )
}

/// Delimiter closing the body after the last part.
pub(crate) fn closing_delimiter(boundary: &str) -> String {
    format!("\r\n--{boundary}--\r\n")
}

/// Exact length of a multipart body over `ranges`, framing included.
pub(crate) fn body_len(boundary: &str, mime: &str, ranges: &RangeSet, size: u64) -> u64 {
    let parts: u64 = ranges
        .iter()
        .map(|range| part_header(boundary, mime, range, size).len() as u64 + range.len())
        .sum();
    parts + closing_delimiter(boundary).len() as u64
}

/// Boundary unique to one response: a hash over the file name, size and
/// current time, followed by a random v4 uuid.
pub(crate) fn generate_boundary(file_name: Option<&str>, size: u64) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();

    let mut hasher = DefaultHasher::new();
    file_name.hash(&mut hasher);
    size.hash(&mut hasher);
    nanos.hash(&mut hasher);

    format!("RANGE_BOUNDARY-{:016x}-{}", hasher.finish(), Uuid::new_v4().simple())
}

/// Pulls the `boundary` parameter out of a `multipart/byteranges` content type.
pub fn extract_boundary(content_type: &str) -> Option<String> {
    let (mime, params) = content_type.split_once(';')?;
    if !mime.trim().eq_ignore_ascii_case("multipart/byteranges") {
        return None;
    }
    params.split(';').find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let value = value.trim().trim_matches('"');
        (!value.is_empty()).then(|| value.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges(spans: &[(u64, u64)]) -> RangeSet {
        RangeSet::join(spans.iter().map(|&(s, e)| ByteRange::new(s, e).unwrap()).collect())
    }

    #[test]
    fn test_part_header() {
        let range = ByteRange::new(0, 2).unwrap();
        assert_eq!(
            "\r\n--abc\r\nContent-Type: text/plain\r\nContent-Range: bytes 0-2/18\r\n\r\n",
            part_header("abc", "text/plain", &range, 18),
        );
        assert_eq!("\r\n--abc--\r\n", closing_delimiter("abc"));
    }

    #[test]
    fn test_body_len_matches_framing() {
        let set = ranges(&[(0, 2), (8, 12)]);
        let mut body = String::new();
        for range in &set {
            body += &part_header("abc", "text/plain", range, 18);
            body += &"x".repeat(range.len() as usize);
        }
        body += &closing_delimiter("abc");

        assert_eq!(body.len() as u64, body_len("abc", "text/plain", &set, 18));
    }

    #[test]
    fn test_generated_boundaries_differ() {
        let a = generate_boundary(Some("foo.txt"), 18);
        let b = generate_boundary(Some("foo.txt"), 18);
        assert_ne!(a, b);
        assert!(a.len() <= 70, "boundary too long: {a}");
        assert!(a.bytes().all(|c| c.is_ascii_alphanumeric() || c == b'-' || c == b'_'));
    }

    #[test]
    fn test_extract_boundary() {
        assert_eq!(
            Some("RANGE_BOUNDARY-1".to_string()),
            extract_boundary("multipart/byteranges; boundary=RANGE_BOUNDARY-1"),
        );
        assert_eq!(Some("x y".to_string()), extract_boundary("Multipart/ByteRanges; boundary=\"x y\""));
        assert_eq!(None, extract_boundary("text/plain; boundary=abc"));
        assert_eq!(None, extract_boundary("multipart/byteranges"));
    }
}
