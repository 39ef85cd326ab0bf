//! Recovers `execute_command` calls that a model wrote as JSON inside free text.
//!
//! Models without native tool calling (or that ignore it) tend to emit the call inline, often
//! wrapped in a fenced code block and in one of several shapes:
//!
//! ```text
//! {"execute_command": {"command": "ls", "reason": "look"}}
//! {"execute_command": "ls", "reason": "look"}
//! {"command": "ls", "reason": "look"}
//! ```
//!
//! All three normalize to the same [`CommandArgs`].

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::executor::{CallOrigin, CommandArgs, EXECUTE_COMMAND, ToolCall};

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```(?:json)?\s*([\s\S]*?)\s*```").expect("fenced block regex is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
enum Scan {
    /// Byte range of a balanced object, braces included.
    Object(Range<usize>),
    /// An opening brace that is never closed.
    Unterminated,
    /// No opening brace at or after the start offset.
    NoObject,
}

/// Find the first brace-balanced `{...}` at or after `from`.
///
/// Braces inside double-quoted strings are ignored; backslash escapes are honored inside strings.
fn scan_object(text: &str, from: usize) -> Scan {
    let bytes = text.as_bytes();
    let Some(offset) = bytes[from..].iter().position(|&b| b == b'{') else {
        return Scan::NoObject;
    };
    let start = from + offset;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Scan::Object(start..i + 1);
                }
            }
            _ => {}
        }
    }
    Scan::Unterminated
}

fn first_object(text: &str) -> Option<Value> {
    match scan_object(text, 0) {
        Scan::Object(range) => serde_json::from_str(&text[range]).ok(),
        Scan::Unterminated | Scan::NoObject => None,
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Normalize any of the accepted call shapes into [`CommandArgs`].
///
/// Returns `None` when no non-empty string command is present. A nested object without its own
/// `reason` inherits the top-level one.
#[must_use]
pub fn normalize(value: &Value) -> Option<CommandArgs> {
    let obj = value.as_object()?;
    let top_reason = obj.get("reason").map(value_to_text).unwrap_or_default();

    let (command, reason) = match obj.get(EXECUTE_COMMAND) {
        Some(Value::Object(inner)) => {
            let command = inner.get("command")?.as_str()?;
            let reason = inner
                .get("reason")
                .map(value_to_text)
                .filter(|r| !r.is_empty())
                .unwrap_or(top_reason);
            (command, reason)
        }
        Some(Value::String(command)) => (command.as_str(), top_reason),
        _ => (obj.get("command")?.as_str()?, top_reason),
    };

    if command.trim().is_empty() {
        return None;
    }
    Some(CommandArgs {
        command: command.to_owned(),
        reason,
    })
}

/// Extract the first tool call from `text`.
///
/// A fenced code block takes priority; if it holds no object, the whole text is searched.
/// An object that is not valid JSON or does not normalize yields `None`.
#[must_use]
pub fn parse_first(text: &str) -> Option<ToolCall> {
    let fenced = FENCED_BLOCK
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str());

    let mut value = first_object(fenced.unwrap_or(text));
    if value.is_none() && fenced.is_some() {
        value = first_object(text);
    }
    let args = normalize(&value?)?;
    Some(ToolCall::new(args, CallOrigin::ExtractedText))
}

/// Extract every well-formed tool call from `text`, in order of appearance.
///
/// Malformed objects are skipped; scanning stops at the first unterminated brace.
#[must_use]
pub fn parse_all(text: &str) -> Vec<ToolCall> {
    let mut calls = Vec::new();
    let mut pos = 0;
    while pos < text.len() {
        match scan_object(text, pos) {
            Scan::Object(range) => {
                pos = range.end;
                let Ok(value) = serde_json::from_str::<Value>(&text[range]) else {
                    continue;
                };
                if let Some(args) = normalize(&value) {
                    calls.push(ToolCall::new(args, CallOrigin::ExtractedText));
                }
            }
            Scan::Unterminated | Scan::NoObject => break,
        }
    }
    calls
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_shape() {
        let call = parse_first(r#"{"execute_command": {"command": "ls", "reason": "look"}}"#)
            .unwrap();
        assert_eq!(call.command(), "ls");
        assert_eq!(call.reason(), "look");
        assert_eq!(call.origin, CallOrigin::ExtractedText);
    }

    #[test]
    fn string_shape() {
        let call = parse_first(r#"{"execute_command": "ls -la", "reason": "list"}"#).unwrap();
        assert_eq!(call.command(), "ls -la");
        assert_eq!(call.reason(), "list");
    }

    #[test]
    fn flat_shape() {
        let call = parse_first(r#"{"command": "pwd", "reason": "where"}"#).unwrap();
        assert_eq!(call.command(), "pwd");
    }

    #[test]
    fn all_shapes_yield_the_same_call() {
        let shapes = [
            r#"{"execute_command": {"command": "git status", "reason": "check tree"}}"#,
            r#"{"execute_command": "git status", "reason": "check tree"}"#,
            r#"{"command": "git status", "reason": "check tree"}"#,
        ];
        let calls: Vec<ToolCall> = shapes.iter().filter_map(|s| parse_first(s)).collect();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0], calls[1]);
        assert_eq!(calls[1], calls[2]);
        assert_eq!(calls[0].name, EXECUTE_COMMAND);
        assert_eq!(calls[0].command(), "git status");
        assert_eq!(calls[0].reason(), "check tree");
    }

    #[test]
    fn nested_reason_falls_back_to_top_level() {
        let args = normalize(&json!({
            "execute_command": {"command": "ls"},
            "reason": "outer"
        }))
        .unwrap();
        assert_eq!(args.reason, "outer");
    }

    #[test]
    fn missing_reason_is_empty() {
        let args = normalize(&json!({"command": "ls"})).unwrap();
        assert!(args.reason.is_empty());
    }

    #[test]
    fn empty_or_missing_command_rejected() {
        assert!(normalize(&json!({"command": ""})).is_none());
        assert!(normalize(&json!({"command": "   "})).is_none());
        assert!(normalize(&json!({"reason": "x"})).is_none());
        assert!(normalize(&json!({"command": 42})).is_none());
        assert!(normalize(&json!(["ls"])).is_none());
    }

    #[test]
    fn fenced_block_preferred() {
        let text = "Sure.\n```json\n{\"command\": \"git status\", \"reason\": \"check\"}\n```\nDone {\"command\": \"ls\"}";
        assert_eq!(parse_first(text).unwrap().command(), "git status");
    }

    #[test]
    fn fence_without_object_falls_back_to_full_text() {
        let text = "```\nno json here\n```\nthen {\"command\": \"ls\"}";
        assert_eq!(parse_first(text).unwrap().command(), "ls");
    }

    #[test]
    fn plain_fence_without_language() {
        let text = "```\n{\"execute_command\": \"dir\"}\n```";
        assert_eq!(parse_first(text).unwrap().command(), "dir");
    }

    #[test]
    fn braces_inside_strings_ignored() {
        let text = r#"{"command": "echo '}{'", "reason": "braces \" }"}"#;
        assert_eq!(parse_first(text).unwrap().command(), "echo '}{'");
    }

    #[test]
    fn unterminated_object_yields_none() {
        assert!(parse_first(r#"{"command": "ls""#).is_none());
        assert!(parse_all(r#"{"command": "ls""#).is_empty());
    }

    #[test]
    fn invalid_json_yields_none() {
        assert!(parse_first("{command: ls}").is_none());
    }

    #[test]
    fn no_object_yields_none() {
        assert!(parse_first("just chatting").is_none());
        assert!(parse_all("").is_empty());
    }

    #[test]
    fn parse_all_preserves_order_and_skips_malformed() {
        let text = concat!(
            r#"first {"command": "ls"} then {bad json} "#,
            r#"and {"execute_command": {"command": "pwd"}} and {"note": "irrelevant"} "#,
            r#"finally {"execute_command": "whoami", "reason": "id"}"#,
        );
        let calls = parse_all(text);
        let commands: Vec<_> = calls.iter().map(ToolCall::command).collect();
        assert_eq!(commands, vec!["ls", "pwd", "whoami"]);
        assert_eq!(calls[2].reason(), "id");
    }

    #[test]
    fn parse_all_stops_at_unterminated() {
        let text = r#"{"command": "ls"} {"command": "pwd" {"command": "whoami"}"#;
        let calls = parse_all(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].command(), "ls");
    }

    #[test]
    fn multibyte_text_around_objects() {
        let text = "voilà → {\"command\": \"ls\"} ✓";
        assert_eq!(parse_all(text).len(), 1);
        assert_eq!(parse_first(text).unwrap().command(), "ls");
    }

    mod proptest_extractor {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn parse_never_panics(s in "\\PC{0,300}") {
                let _ = parse_first(&s);
                let _ = parse_all(&s);
            }

            #[test]
            fn flat_object_round_trips(cmd in "[a-z][a-z -]{0,30}") {
                let text = serde_json::to_string(&json!({"command": cmd})).unwrap();
                let call = parse_first(&text).unwrap();
                prop_assert_eq!(call.command(), cmd.as_str());
            }
        }
    }
}
