use axum::http::StatusCode;

use crate::{multipart, ByteRange, RangeSet};

/// What kind of response a request resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// 200, the whole resource.
    FullContent,
    /// 206 with a `Content-Range` header.
    SingleRange,
    /// 206 with a `multipart/byteranges` body.
    MultiRange,
    /// 304, headers only.
    NotModified,
    /// 416, headers only.
    RangeNotSatisfiable,
    /// 500, multiple ranges requested while multipart responses are off.
    Unsupported,
}

impl Classification {
    pub fn status(&self) -> StatusCode {
        match self {
            Classification::FullContent => StatusCode::OK,
            Classification::SingleRange | Classification::MultiRange => StatusCode::PARTIAL_CONTENT,
            Classification::NotModified => StatusCode::NOT_MODIFIED,
            Classification::RangeNotSatisfiable => StatusCode::RANGE_NOT_SATISFIABLE,
            Classification::Unsupported => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the response streams resource bytes after its headers.
    pub fn has_body(&self) -> bool {
        matches!(
            self,
            Classification::FullContent | Classification::SingleRange | Classification::MultiRange
        )
    }
}

/// Everything decided about one response before any output happens.
///
/// Built per request by [`Downloader::plan`](crate::Downloader::plan) and
/// dropped once the response is done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    classification: Classification,
    ranges: RangeSet,
    boundary: Option<String>,
    size: u64,
    mime: String,
}

impl TransferPlan {
    pub(crate) fn full(size: u64, mime: &str) -> Self {
        TransferPlan::without_ranges(Classification::FullContent, size, mime)
    }

    pub(crate) fn single(ranges: RangeSet, size: u64, mime: &str) -> Self {
        TransferPlan {
            classification: Classification::SingleRange,
            ranges,
            boundary: None,
            size,
            mime: mime.to_owned(),
        }
    }

    pub(crate) fn multi(ranges: RangeSet, boundary: String, size: u64, mime: &str) -> Self {
        TransferPlan {
            classification: Classification::MultiRange,
            ranges,
            boundary: Some(boundary),
            size,
            mime: mime.to_owned(),
        }
    }

    pub(crate) fn without_ranges(classification: Classification, size: u64, mime: &str) -> Self {
        TransferPlan {
            classification,
            ranges: RangeSet::default(),
            boundary: None,
            size,
            mime: mime.to_owned(),
        }
    }

    pub fn classification(&self) -> Classification {
        self.classification
    }

    pub fn status(&self) -> StatusCode {
        self.classification.status()
    }

    /// Requested ranges. Empty means the whole resource.
    pub fn ranges(&self) -> &RangeSet {
        &self.ranges
    }

    pub fn boundary(&self) -> Option<&str> {
        self.boundary.as_deref()
    }

    /// Resource size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Type of the resource, also used for each multipart part.
    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// Body length for responses that carry one, framing included.
    pub fn content_length(&self) -> Option<u64> {
        match (self.classification, self.boundary()) {
            (Classification::FullContent, _) => Some(self.size),
            (Classification::SingleRange, _) => Some(self.ranges.total_len()),
            (Classification::MultiRange, Some(boundary)) => {
                Some(multipart::body_len(boundary, &self.mime, &self.ranges, self.size))
            }
            _ => None,
        }
    }

    /// Ranges the streaming loop walks, synthesizing the whole resource when
    /// none were requested.
    pub(crate) fn transfer_ranges(&self) -> Vec<ByteRange> {
        if self.ranges.is_empty() {
            ByteRange::whole(self.size).into_iter().collect()
        } else {
            self.ranges.as_slice().to_vec()
        }
    }
}
