//! jq-style path access into parsed JSON documents. The supported
//! syntax is the subset scripts actually use against JSON:API payloads:
//! `.key`, `["key"]`, `[0]`, and chains of those such as
//! `.data.attributes["time-zone"]` or `.[0].id`.

use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathError(String);

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for PathError {}

/// Parse a path expression into segments. `""` and `"."` address the
/// whole document.
pub fn parse(path: &str) -> Result<Vec<Segment>, PathError> {
    let mut segments = Vec::new();
    let mut rest = path;

    if rest == "." {
        return Ok(segments);
    }
    if let Some(stripped) = rest.strip_prefix('.') {
        rest = stripped;
    } else if !rest.is_empty() && !rest.starts_with('[') {
        // A bare leading key, jq-style: "data.id" == ".data.id".
        let end = rest.find(['.', '[']).unwrap_or(rest.len());
        segments.push(Segment::Key(rest[..end].to_string()));
        rest = &rest[end..];
    }

    while !rest.is_empty() {
        if let Some(after_dot) = rest.strip_prefix('.') {
            if after_dot.starts_with('[') {
                // ".[0]" reads the same as "[0]".
                rest = after_dot;
                continue;
            }
            let end = after_dot.find(['.', '[']).unwrap_or(after_dot.len());
            if end == 0 {
                return Err(PathError(format!("empty key segment in {path:?}")));
            }
            segments.push(Segment::Key(after_dot[..end].to_string()));
            rest = &after_dot[end..];
        } else if let Some(after_bracket) = rest.strip_prefix('[') {
            let close = after_bracket
                .find(']')
                .ok_or_else(|| PathError(format!("unclosed bracket in {path:?}")))?;
            let inner = &after_bracket[..close];
            if let Some(quoted) = inner.strip_prefix('"') {
                let key = quoted
                    .strip_suffix('"')
                    .ok_or_else(|| PathError(format!("unterminated quoted key in {path:?}")))?;
                segments.push(Segment::Key(key.to_string()));
            } else {
                let index: usize = inner
                    .parse()
                    .map_err(|_| PathError(format!("invalid index {inner:?} in {path:?}")))?;
                segments.push(Segment::Index(index));
            }
            rest = &after_bracket[close + 1..];
        } else {
            return Err(PathError(format!("unexpected {rest:?} in {path:?}")));
        }
    }

    Ok(segments)
}

/// Walk the segments into `value`. `None` means the path does not exist;
/// a present-but-null value is `Some(&Value::Null)`.
pub fn lookup<'a>(value: &'a Value, segments: &[Segment]) -> Option<&'a Value> {
    let mut current = value;
    for segment in segments {
        current = match segment {
            Segment::Key(key) => current.get(key.as_str())?,
            Segment::Index(index) => current.get(*index)?,
        };
    }
    Some(current)
}

/// Format a value the way `jq -r` would: strings bare, null as "null",
/// everything else as compact JSON.
pub fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
