//! Log Redaction Layer
//!
//! Scrubs credentials from strings before they are logged: bearer tokens, API
//! keys, passwords embedded in URLs, and token-like query parameters.

use regex::Regex;
use std::sync::LazyLock;

static URL_USERINFO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?P<scheme>[a-zA-Z][a-zA-Z0-9+.\-]*://)[^/\s@]+@").unwrap());
static API_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(sk-[a-zA-Z0-9]{32,})|(Bearer\s+[a-zA-Z0-9\-\._~+/]+=*)").unwrap()
});
static SECRET_PARAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?P<key>[?&](?:token|access_token|api_key|apikey|key|password|secret|sig|signature)=)[^&#\s]+")
        .unwrap()
});

/// Redacts sensitive patterns in a string.
pub fn redact_sensitive_data(input: &str) -> String {
    let mut redacted = URL_USERINFO_RE
        .replace_all(input, "${scheme}[REDACTED]@")
        .to_string();

    redacted = API_KEY_RE
        .replace_all(&redacted, "[REDACTED_TOKEN]")
        .to_string();

    redacted = SECRET_PARAM_RE
        .replace_all(&redacted, "${key}[REDACTED]")
        .to_string();

    redacted
}
