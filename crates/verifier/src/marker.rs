//! Marker extraction from probe output.
//!
//! Probe responses are free text. The echo server behind every workload
//! prints one `Key=value` line per fact it wants the caller to see, and the
//! proxy admin endpoint prints a single status line. These formats are a
//! fixed wire contract:
//!
//! | Marker | Pattern | Used by |
//! |---|---|---|
//! | request identifier | `X-Request-Id=<id>` | correlation collector |
//! | version tag | `ServiceVersion=<tag>` | routing verifier |
//! | status code | `StatusCode=<code>` | fault verifier |
//! | restart epoch | `envoy <version>/<build> <state> <uptime> <uptime> <epoch>` | convergence detector |
//!
//! The value runs to the end of the line. Trailing whitespace (including the
//! `\r` of CRLF output) is dropped, and an empty value counts as no match.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

/// Status code reported when the `StatusCode` marker holds a non-integer.
pub const UNPARSABLE_STATUS: i32 = -1;

// Patterns are literals; compilation cannot fail at runtime.
static REQUEST_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"X-Request-Id=(.*)").expect("literal pattern"));
static SERVICE_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ServiceVersion=(.*)").expect("literal pattern"));
static STATUS_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"StatusCode=(.*)").expect("literal pattern"));
static RESTART_EPOCH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"envoy .+/\w+ \w+ \d+ \d+ (\d+)").expect("literal pattern")
});

fn first_capture<'a>(pattern: &Regex, text: &'a str) -> Option<&'a str> {
    let value = pattern.captures(text)?.get(1)?.as_str().trim_end();
    (!value.is_empty()).then_some(value)
}

/// First `X-Request-Id` value in `text`.
pub fn extract_request_id(text: &str) -> Option<&str> {
    first_capture(&REQUEST_ID, text)
}

/// First `ServiceVersion` value in `text`.
pub fn extract_version(text: &str) -> Option<&str> {
    first_capture(&SERVICE_VERSION, text)
}

/// First `StatusCode` value in `text`.
///
/// Returns `Some(UNPARSABLE_STATUS)` when the marker is present but not an
/// integer, `None` when it is absent.
pub fn extract_status_code(text: &str) -> Option<i32> {
    first_capture(&STATUS_CODE, text)
        .map(|raw| raw.trim().parse::<i32>().unwrap_or(UNPARSABLE_STATUS))
}

/// Restart epoch from a proxy admin status line.
///
/// ```text
/// envoy 267724/RELEASE live 1571 1571 0
/// ```
pub fn extract_restart_epoch(text: &str) -> Option<u64> {
    RESTART_EPOCH
        .captures(text)?
        .get(1)?
        .as_str()
        .parse::<u64>()
        .ok()
}

/// Everything one probe produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    /// Combined stdout/stderr of the probe client
    pub raw: String,
    pub request_id: Option<String>,
    pub version: Option<String>,
    pub status_code: Option<i32>,
    /// Wall-clock time around the remote call
    pub elapsed: Duration,
}

impl ProbeResult {
    /// Extracts every marker from `raw`.
    pub fn from_output(raw: String, elapsed: Duration) -> Self {
        let request_id = extract_request_id(&raw).map(str::to_owned);
        let version = extract_version(&raw).map(str::to_owned);
        let status_code = extract_status_code(&raw);
        Self {
            raw,
            request_id,
            version,
            status_code,
            elapsed,
        }
    }
}
