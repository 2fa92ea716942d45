use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the client should treat the body, sent as `Content-Disposition`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    #[default]
    Attachment,
    Inline,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Attachment => "attachment",
            Disposition::Inline => "inline",
        }
    }
}

/// Which caching headers go out with a response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Clients must revalidate on every request.
    #[default]
    Never,
    /// `must-revalidate` plus `Last-Modified`/`ETag` validators when the
    /// resource has them. Without validators this behaves like `Never`.
    Revalidate,
    /// No caching headers at all.
    #[serde(rename = "none")]
    Omit,
}

/// Per-download settings.
///
/// Plain data, usually built with struct update syntax over
/// [`DownloadOptions::default`] or deserialized from a config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadOptions {
    /// Honour `Range` requests. When off the whole resource is always sent.
    pub byte_ranges: bool,
    /// Answer multi-range requests with `multipart/byteranges`. When off they
    /// get a 500 response.
    pub multipart: bool,
    pub disposition: Disposition,
    pub cache_mode: CacheMode,
    /// Upper bound for a single resource read, in seconds. `0` disables it.
    pub read_time_limit_secs: u64,
    /// Put back the sink's previous time limit once streaming is done.
    pub restore_previous_time_limit: bool,
    /// Throughput cap averaged over one second windows. `0` disables it.
    pub max_bytes_per_second: u64,
    /// File name offered in `Content-Disposition`.
    pub file_name: Option<String>,
    /// Fixed multipart boundary instead of a generated one.
    pub boundary: Option<String>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        DownloadOptions {
            byte_ranges: true,
            multipart: true,
            disposition: Disposition::Attachment,
            cache_mode: CacheMode::Never,
            read_time_limit_secs: 30,
            restore_previous_time_limit: false,
            max_bytes_per_second: 0,
            file_name: None,
            boundary: None,
        }
    }
}

impl DownloadOptions {
    pub fn read_time_limit(&self) -> Option<Duration> {
        match self.read_time_limit_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
