//! `Range` request header parsing.
//!
//! Turns the raw header text into a sorted [`RangeSet`] with overlapping and
//! adjacent spans merged. Bounds against the resource size are checked
//! separately with [`RangeSet::check_bounds`], so an out-of-range request is
//! reported instead of being clamped.

use std::fmt;

use thiserror::Error;

/// An inclusive `[start, end]` span of a resource's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    start: u64,
    end: u64,
    length: u64,
}

impl ByteRange {
    /// Returns `None` when `start > end`.
    pub fn new(start: u64, end: u64) -> Option<Self> {
        if start > end {
            return None;
        }
        Some(ByteRange { start, end, length: span(start, end) })
    }

    /// The range covering a whole resource of `size` bytes, `None` if empty.
    pub fn whole(size: u64) -> Option<Self> {
        ByteRange::new(0, size.checked_sub(1)?)
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    /// Last byte offset, inclusive.
    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    /// Never true, a range holds at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }

    fn touches(&self, next: &ByteRange) -> bool {
        // contiguous or overlapping, with `next` sorted after `self`
        next.start <= self.end.saturating_add(1) && self.start <= next.end.saturating_add(1)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("malformed range header: {0:?}")]
    InvalidSyntax(String),
    #[error("range {start}-{end} is outside a resource of {size} bytes")]
    OutOfBounds { start: u64, end: u64, size: u64 },
}

/// Values substituted into open-ended range specs.
///
/// `end` fills `N-` specs and is normally `size - 1`. When `start` is set, a
/// `-N` spec means `start..=N`; otherwise `-N` is a suffix selecting the last
/// `N` bytes up to `end`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeDefaults {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

impl RangeDefaults {
    /// Suffix semantics against a resource of `size` bytes.
    pub fn for_size(size: u64) -> Self {
        RangeDefaults { start: None, end: size.checked_sub(1) }
    }
}

/// Sorted, non-overlapping, non-adjacent byte ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeSet(Vec<ByteRange>);

impl RangeSet {
    /// Parses a `Range` header value.
    ///
    /// `Ok(None)` means no usable range was requested: the header is blank or
    /// only names units other than `bytes`. Groups separated by `;` are parsed
    /// independently and a malformed group is skipped as long as another one
    /// parses.
    pub fn parse(header: &str, defaults: RangeDefaults) -> Result<Option<RangeSet>, RangeError> {
        let mut ranges = Vec::new();
        let mut parsed_any = false;
        let mut malformed = false;

        for group in header.split(';').map(str::trim).filter(|g| !g.is_empty()) {
            let Some((unit, specs)) = group.split_once('=') else {
                malformed = true;
                continue;
            };
            if !unit.trim().eq_ignore_ascii_case("bytes") {
                tracing::trace!(unit = unit.trim(), "ignoring range group with foreign unit");
                continue;
            }
            match parse_specs(specs, defaults) {
                Some(group_ranges) => {
                    parsed_any = true;
                    ranges.extend(group_ranges);
                }
                None => malformed = true,
            }
        }

        if parsed_any {
            Ok(Some(RangeSet::join(ranges)))
        } else if malformed {
            Err(RangeError::InvalidSyntax(header.to_owned()))
        } else {
            Ok(None)
        }
    }

    /// Sorts by start then end and merges overlapping or contiguous ranges.
    pub fn join(mut ranges: Vec<ByteRange>) -> RangeSet {
        ranges.sort_by_key(|r| (r.start, r.end));

        let mut merged: Vec<ByteRange> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match merged.last_mut() {
                Some(last) if last.touches(&range) => {
                    let start = last.start.min(range.start);
                    let end = last.end.max(range.end);
                    *last = ByteRange { start, end, length: span(start, end) };
                }
                _ => merged.push(range),
            }
        }
        RangeSet(merged)
    }

    /// Fails on the first range reaching past the end of a `size` byte resource.
    pub fn check_bounds(&self, size: u64) -> Result<(), RangeError> {
        match self.0.iter().find(|r| r.end >= size) {
            Some(r) => Err(RangeError::OutOfBounds { start: r.start, end: r.end, size }),
            None => Ok(()),
        }
    }

    /// True for a single range spanning every byte of the resource.
    pub fn covers(&self, size: u64) -> bool {
        matches!(self.0.as_slice(), [only] if Some(*only) == ByteRange::whole(size))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sum of the range lengths.
    pub fn total_len(&self) -> u64 {
        self.0.iter().map(ByteRange::len).sum()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ByteRange> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[ByteRange] {
        &self.0
    }
}

impl<'a> IntoIterator for &'a RangeSet {
    type Item = &'a ByteRange;
    type IntoIter = std::slice::Iter<'a, ByteRange>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// saturates for the single span covering all of u64
fn span(start: u64, end: u64) -> u64 {
    (end - start).saturating_add(1)
}

/// Parses the comma separated specs of one `bytes=` group, `None` if any is bad.
fn parse_specs(specs: &str, defaults: RangeDefaults) -> Option<Vec<ByteRange>> {
    let mut ranges = Vec::new();
    for spec in specs.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        ranges.push(parse_spec(spec, defaults)?);
    }
    if ranges.is_empty() {
        None
    } else {
        Some(ranges)
    }
}

fn parse_spec(spec: &str, defaults: RangeDefaults) -> Option<ByteRange> {
    let (first, last) = spec.split_once('-')?;
    let (first, last) = (first.trim(), last.trim());

    match (first.is_empty(), last.is_empty()) {
        // a lone "-"
        (true, true) => None,
        (true, false) => {
            let n = parse_pos(last)?;
            match defaults.start {
                Some(start) => ByteRange::new(start, n),
                None => {
                    let end = defaults.end?;
                    if n == 0 {
                        return None;
                    }
                    ByteRange::new(end.saturating_add(1).saturating_sub(n), end)
                }
            }
        }
        (false, true) => ByteRange::new(parse_pos(first)?, defaults.end?),
        (false, false) => ByteRange::new(parse_pos(first)?, parse_pos(last)?),
    }
}

fn parse_pos(digits: &str) -> Option<u64> {
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
