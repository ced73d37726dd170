//! Conditional and byte-range request handling for inline object bodies.
//!
//! Single ranges only. A multi-range or malformed `Range` header is ignored
//! and the whole body is sent.

use axum::http::{HeaderMap, header};
use chrono::{DateTime, Utc};

/// Inclusive byte span within an object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn length(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` value for an object of `size` bytes.
    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum RangeRequest {
    Full,
    Partial(ByteRange),
    Unsatisfiable,
}

/// Interpret a `Range` header value against an object of `size` bytes.
pub fn parse_range(value: &str, size: u64) -> RangeRequest {
    let Some(ranges) = value.trim().strip_prefix("bytes=") else {
        return RangeRequest::Full;
    };
    if size == 0 || ranges.contains(',') {
        return RangeRequest::Full;
    }
    let Some((first, last)) = ranges.trim().split_once('-') else {
        return RangeRequest::Full;
    };
    let (first, last) = (first.trim(), last.trim());

    if first.is_empty() {
        // suffix form: the final `last` bytes
        return match last.parse::<u64>() {
            Ok(0) => RangeRequest::Unsatisfiable,
            Ok(suffix) => RangeRequest::Partial(ByteRange {
                start: size.saturating_sub(suffix),
                end: size - 1,
            }),
            Err(_) => RangeRequest::Full,
        };
    }

    let Ok(start) = first.parse::<u64>() else {
        return RangeRequest::Full;
    };
    if start >= size {
        return RangeRequest::Unsatisfiable;
    }
    let end = if last.is_empty() {
        size - 1
    } else {
        match last.parse::<u64>() {
            Ok(end) if end >= start => end.min(size - 1),
            _ => return RangeRequest::Full,
        }
    };
    RangeRequest::Partial(ByteRange { start, end })
}

/// IMF-fixdate, as used by `Last-Modified`.
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn etag_listed(list: &str, etag: Option<&str>) -> bool {
    list.split(',').map(str::trim).any(|candidate| {
        candidate == "*"
            || etag.is_some_and(|tag| {
                candidate.trim_start_matches("W/").trim_matches('"') == tag
            })
    })
}

/// Whether the client's copy is current, so a 304 answers the request.
///
/// `If-None-Match` takes precedence; `If-Modified-Since` is compared at
/// whole-second precision.
pub fn is_not_modified(
    headers: &HeaderMap,
    etag: Option<&str>,
    modified: DateTime<Utc>,
) -> bool {
    if let Some(list) = header_str(headers, header::IF_NONE_MATCH) {
        return etag_listed(list, etag);
    }
    header_str(headers, header::IF_MODIFIED_SINCE)
        .and_then(parse_http_date)
        .is_some_and(|since| modified.timestamp() <= since.timestamp())
}

/// The `Range` header to honour, if any. An `If-Range` validator that no
/// longer matches turns the request into a full one.
pub fn requested_range(
    headers: &HeaderMap,
    size: u64,
    etag: Option<&str>,
    modified: DateTime<Utc>,
) -> RangeRequest {
    let Some(range) = header_str(headers, header::RANGE) else {
        return RangeRequest::Full;
    };
    let validator_matches = match header_str(headers, header::IF_RANGE).map(str::trim) {
        None => true,
        Some(tag) if tag.starts_with('"') => {
            etag.is_some_and(|etag| tag.trim_matches('"') == etag)
        }
        Some(date) => {
            parse_http_date(date).is_some_and(|at| at.timestamp() == modified.timestamp())
        }
    };
    if validator_matches {
        parse_range(range, size)
    } else {
        RangeRequest::Full
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::TimeZone;

    fn span(start: u64, end: u64) -> RangeRequest {
        RangeRequest::Partial(ByteRange { start, end })
    }

    #[test]
    fn range_forms() {
        assert_eq!(parse_range("bytes=0-99", 1000), span(0, 99));
        assert_eq!(parse_range("bytes=500-", 1000), span(500, 999));
        assert_eq!(parse_range("bytes=-200", 1000), span(800, 999));
        assert_eq!(parse_range("bytes=-5000", 1000), span(0, 999));
        assert_eq!(parse_range("bytes=900-5000", 1000), span(900, 999));
    }

    #[test]
    fn unusable_ranges() {
        assert_eq!(parse_range("bytes=1000-", 1000), RangeRequest::Unsatisfiable);
        assert_eq!(parse_range("bytes=-0", 1000), RangeRequest::Unsatisfiable);
        assert_eq!(parse_range("bytes=0-1,5-6", 1000), RangeRequest::Full);
        assert_eq!(parse_range("items=0-1", 1000), RangeRequest::Full);
        assert_eq!(parse_range("bytes=9-3", 1000), RangeRequest::Full);
        assert_eq!(parse_range("bytes=0-", 0), RangeRequest::Full);
    }

    #[test]
    fn content_range_header() {
        let range = ByteRange { start: 4, end: 9 };
        assert_eq!(range.length(), 6);
        assert_eq!(range.content_range(10), "bytes 4-9/10");
    }

    #[test]
    fn not_modified_checks() {
        let modified = Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap();
        let mut headers = HeaderMap::new();
        assert!(!is_not_modified(&headers, Some("abc"), modified));

        headers.insert(
            header::IF_MODIFIED_SINCE,
            HeaderValue::from_str(&http_date(modified)).unwrap(),
        );
        assert!(is_not_modified(&headers, Some("abc"), modified));
        let later = modified + chrono::Duration::seconds(1);
        assert!(!is_not_modified(&headers, Some("abc"), later));

        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("\"other\""));
        assert!(!is_not_modified(&headers, Some("abc"), modified));
        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("W/\"abc\", \"x\""));
        assert!(is_not_modified(&headers, Some("abc"), modified));
    }

    #[test]
    fn stale_if_range_drops_the_range() {
        let modified = Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(header::RANGE, HeaderValue::from_static("bytes=2-3"));
        assert_eq!(requested_range(&headers, 10, Some("abc"), modified), span(2, 3));

        headers.insert(header::IF_RANGE, HeaderValue::from_static("\"abc\""));
        assert_eq!(requested_range(&headers, 10, Some("abc"), modified), span(2, 3));

        headers.insert(header::IF_RANGE, HeaderValue::from_static("\"old\""));
        assert_eq!(
            requested_range(&headers, 10, Some("abc"), modified),
            RangeRequest::Full
        );
    }
}
