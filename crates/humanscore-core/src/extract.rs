//! Pulls a JSON object out of free-form model output.
//!
//! Candidate selection picks the first of: a fenced code block, the span
//! from the first `{` to the last `}`, or the trimmed text. If the candidate
//! does not parse as-is, a fixed sequence of repairs runs before a second
//! parse. Every repair skips over string literals, so a `//` inside a URL or
//! a `,}` inside quoted text is left alone.

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("response text is empty")]
    Empty,

    #[error("no parseable json object ({message}); candidate starts with: {snippet}")]
    Parse { message: String, snippet: String },

    #[error("expected a json object, found {0}")]
    NotAnObject(&'static str),

    #[error("json object does not match the expected shape: {0}")]
    Shape(String),
}

/// A named text transform applied before the second parse attempt.
pub struct Repair {
    pub name: &'static str,
    pub apply: fn(&str) -> String,
}

/// Comments go first so a comment sitting after a trailing comma does not
/// hide that comma from the last step.
pub const REPAIRS: &[Repair] = &[
    Repair {
        name: "strip_block_comments",
        apply: strip_block_comments,
    },
    Repair {
        name: "strip_line_comments",
        apply: strip_line_comments,
    },
    Repair {
        name: "strip_trailing_commas",
        apply: strip_trailing_commas,
    },
];

pub fn extract_json(raw: &str) -> Result<Value, ExtractError> {
    let candidate = select_candidate(raw);
    if candidate.is_empty() {
        return Err(ExtractError::Empty);
    }

    let value = match serde_json::from_str::<Value>(candidate) {
        Ok(value) => value,
        Err(_) => {
            let mut repaired = candidate.to_string();
            for repair in REPAIRS {
                let next = (repair.apply)(&repaired);
                if next != repaired {
                    tracing::debug!(repair = repair.name, "applied json repair");
                }
                repaired = next;
            }
            serde_json::from_str::<Value>(&repaired).map_err(|e| ExtractError::Parse {
                message: e.to_string(),
                snippet: snippet(&repaired),
            })?
        }
    };

    match value {
        Value::Object(_) => Ok(value),
        Value::Array(_) => Err(ExtractError::NotAnObject("an array")),
        Value::String(_) => Err(ExtractError::NotAnObject("a string")),
        Value::Number(_) => Err(ExtractError::NotAnObject("a number")),
        Value::Bool(_) => Err(ExtractError::NotAnObject("a boolean")),
        Value::Null => Err(ExtractError::NotAnObject("null")),
    }
}

pub fn extract_as<T: DeserializeOwned>(raw: &str) -> Result<T, ExtractError> {
    let value = extract_json(raw)?;
    serde_json::from_value(value).map_err(|e| ExtractError::Shape(e.to_string()))
}

fn select_candidate(raw: &str) -> &str {
    if let Some(inner) = fenced_block(raw) {
        let inner = inner.trim();
        if !inner.is_empty() {
            return inner;
        }
    }

    if let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) {
        if start < end {
            return &raw[start..=end];
        }
    }

    raw.trim()
}

/// Body of the first ```` ``` ```` fence; the info string (e.g. `json`) on the
/// opening line is dropped. An unterminated fence runs to end of input.
fn fenced_block(raw: &str) -> Option<&str> {
    let open = raw.find("```")?;
    let after_ticks = &raw[open + 3..];
    let body_start = match after_ticks.find('\n') {
        Some(nl) if after_ticks[..nl].trim().chars().all(|c| c.is_ascii_alphanumeric()) => {
            nl + 1
        }
        _ => 0,
    };
    let body = &after_ticks[body_start..];
    Some(match body.find("```") {
        Some(close) => &body[..close],
        None => body,
    })
}

fn snippet(text: &str) -> String {
    text.chars().take(80).collect()
}

/// Walks `input` char by char, handing every char outside string literals to
/// `outside`. Chars inside strings (quotes included) are copied verbatim.
fn rewrite_outside_strings(
    input: &str,
    mut outside: impl FnMut(char, &[char], usize, &mut String) -> usize,
) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    let mut in_string = false;
    let mut escaped = false;

    while i < chars.len() {
        let c = chars[i];
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        if c == '"' {
            in_string = true;
            out.push(c);
            i += 1;
            continue;
        }
        i = outside(c, &chars, i, &mut out);
    }
    out
}

pub fn strip_line_comments(input: &str) -> String {
    rewrite_outside_strings(input, |c, chars, i, out| {
        if c == '/' && chars.get(i + 1) == Some(&'/') {
            let mut j = i + 2;
            while j < chars.len() && chars[j] != '\n' {
                j += 1;
            }
            j
        } else {
            out.push(c);
            i + 1
        }
    })
}

pub fn strip_block_comments(input: &str) -> String {
    rewrite_outside_strings(input, |c, chars, i, out| {
        if c == '/' && chars.get(i + 1) == Some(&'*') {
            let mut j = i + 2;
            while j < chars.len() && !(chars[j] == '*' && chars.get(j + 1) == Some(&'/')) {
                j += 1;
            }
            // unterminated comment swallows the rest
            (j + 2).min(chars.len())
        } else {
            out.push(c);
            i + 1
        }
    })
}

pub fn strip_trailing_commas(input: &str) -> String {
    rewrite_outside_strings(input, |c, chars, i, out| {
        if c == ',' {
            let next = chars[i + 1..].iter().copied().find(|ch| !ch.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                return i + 1;
            }
        }
        out.push(c);
        i + 1
    })
}
