//! Failure triage for captured invocations. Scripts branch on the kind
//! (skip on `not_configured`, fail hard on `not_authorized`) instead of
//! re-parsing stderr themselves.

use crate::context::Capture;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    NotAuthorized,
    Validation,
    NotFound,
    NotConfigured,
    Transport,
    Unknown,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::NotAuthorized => "not_authorized",
            FailureKind::Validation => "validation",
            FailureKind::NotFound => "not_found",
            FailureKind::NotConfigured => "not_configured",
            FailureKind::Transport => "transport",
            FailureKind::Unknown => "unknown",
        }
    }
}

/// Classify a failed capture. Signals are checked from most to least
/// reliable: process-level transport evidence, then the HTTP status,
/// then JSON:API error documents, then message substrings.
pub fn classify(capture: &Capture) -> FailureKind {
    if capture.timed_out || capture.status == 124 || capture.status == 127 {
        return FailureKind::Transport;
    }

    if let Some(status) = capture.http_status
        && let Some(kind) = from_http_status(status)
    {
        return kind;
    }

    if let Some(doc) = &capture.json
        && let Some(kind) = from_error_document(doc)
    {
        return kind;
    }

    // CLIs often print the error document on stderr among log lines.
    for line in capture.stderr.lines() {
        let line = line.trim_start();
        if line.starts_with('{')
            && let Ok(doc) = serde_json::from_str::<Value>(line)
            && let Some(kind) = from_error_document(&doc)
        {
            return kind;
        }
    }

    from_text(&capture.stdout)
        .or_else(|| from_text(&capture.stderr))
        .unwrap_or(FailureKind::Unknown)
}

fn from_http_status(status: u16) -> Option<FailureKind> {
    match status {
        401 | 403 => Some(FailureKind::NotAuthorized),
        404 => Some(FailureKind::NotFound),
        422 => Some(FailureKind::Validation),
        _ => None,
    }
}

/// Read the first member of a JSON:API `errors` array. The `status`
/// member is a string per the format.
fn from_error_document(doc: &Value) -> Option<FailureKind> {
    let first = doc.get("errors")?.as_array()?.first()?;
    if let Some(status) = first.get("status").and_then(Value::as_str)
        && let Ok(code) = status.parse::<u16>()
        && let Some(kind) = from_http_status(code)
    {
        return Some(kind);
    }
    let code = first.get("code").and_then(Value::as_str).unwrap_or("");
    let title = first.get("title").and_then(Value::as_str).unwrap_or("");
    let detail = first.get("detail").and_then(Value::as_str).unwrap_or("");
    from_text(&format!("{code} {title} {detail}"))
}

fn from_text(text: &str) -> Option<FailureKind> {
    let text = text.to_lowercase();
    let table: &[(&[&str], FailureKind)] = &[
        (
            &["not authorized", "unauthorized", "forbidden"],
            FailureKind::NotAuthorized,
        ),
        (
            &["unprocessable", "validation", "422"],
            FailureKind::Validation,
        ),
        (&["not found"], FailureKind::NotFound),
        (
            &["not configured", "not enabled"],
            FailureKind::NotConfigured,
        ),
        (
            &["connection refused", "timed out"],
            FailureKind::Transport,
        ),
    ];
    for (needles, kind) in table {
        if needles.iter().any(|needle| text.contains(needle)) {
            return Some(*kind);
        }
    }
    None
}
