//! Session titles from log files.
//!
//! A session's log is newline-delimited JSON. The title is the text of the
//! first user-authored record found within the first [`TITLE_SCAN_BYTES`]
//! of the file. Anything that goes wrong falls back to the file stem.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace};

/// How much of a log file is read when looking for a title.
pub const TITLE_SCAN_BYTES: u64 = 16 * 1024;

/// Titles longer than this many characters are truncated.
pub const MAX_TITLE_CHARS: usize = 50;

/// Appended to truncated titles.
pub const ELLIPSIS: &str = "...";

// ============================================================================
// Log Records
// ============================================================================

/// One line of a session log. Unknown fields are ignored.
///
/// A field holding the wrong JSON type reads as absent; the rest of the
/// record still counts.
#[derive(Debug, Deserialize)]
struct LogRecord {
    #[serde(rename = "type", default)]
    kind: Option<Value>,
    #[serde(default)]
    message: Option<Value>,
}

impl LogRecord {
    fn is_user_authored(&self) -> bool {
        self.kind.as_ref().and_then(Value::as_str) == Some("user")
            || self.message_field("role").and_then(Value::as_str) == Some("user")
    }

    /// Returns the record's text: direct string content, else the first
    /// `text` block with non-empty string text.
    fn text(&self) -> Option<&str> {
        match self.message_field("content")? {
            Value::String(text) if !text.is_empty() => Some(text.as_str()),
            Value::Array(blocks) => blocks.iter().find_map(block_text),
            _ => None,
        }
    }

    fn message_field(&self, name: &str) -> Option<&Value> {
        self.message.as_ref()?.get(name)
    }
}

/// Text of a content block; malformed blocks yield `None`.
fn block_text(block: &Value) -> Option<&str> {
    if block.get("type").and_then(Value::as_str) != Some("text") {
        return None;
    }
    block
        .get("text")
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
}

// ============================================================================
// Extraction
// ============================================================================

/// Derives a display title for a session log.
///
/// Never fails: returns the file stem when the file cannot be read, is not
/// UTF-8, or holds no user-authored text in its first 16 KiB.
pub fn extract_title(path: &Path) -> String {
    match read_prefix(path).and_then(|text| first_user_message(&text)) {
        Some(title) => title,
        None => {
            debug!(path = %path.display(), "No user message found, using file name as title");
            file_stem_title(path)
        }
    }
}

/// Finds the first user-authored message in newline-delimited JSON.
///
/// Lines that are empty or fail to decode are skipped.
pub fn first_user_message(text: &str) -> Option<String> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<LogRecord>(line) {
            Ok(record) => Some(record),
            Err(e) => {
                trace!(error = %e, "Skipping undecodable log line");
                None
            }
        })
        .filter(LogRecord::is_user_authored)
        .find_map(|record| record.text().map(clean_title))
}

/// Normalizes and truncates a title.
///
/// Newlines become spaces and surrounding whitespace is trimmed. Anything
/// longer than [`MAX_TITLE_CHARS`] becomes the first 47 characters plus
/// [`ELLIPSIS`].
pub fn clean_title(text: &str) -> String {
    let cleaned = text.replace('\n', " ");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= MAX_TITLE_CHARS {
        return cleaned.to_string();
    }

    let keep = MAX_TITLE_CHARS - ELLIPSIS.len();
    let mut truncated: String = cleaned.chars().take(keep).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}

/// The fallback title: the file name without its extension.
pub fn file_stem_title(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Reads at most [`TITLE_SCAN_BYTES`] of the file as UTF-8.
///
/// A character split by the read limit is dropped; any other invalid
/// UTF-8 rejects the whole prefix.
fn read_prefix(path: &Path) -> Option<String> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Cannot open log file");
            return None;
        }
    };

    let mut buf = Vec::new();
    if let Err(e) = file.take(TITLE_SCAN_BYTES).read_to_end(&mut buf) {
        debug!(path = %path.display(), error = %e, "Cannot read log file");
        return None;
    }

    match String::from_utf8(buf) {
        Ok(text) => Some(text),
        Err(e) if e.utf8_error().error_len().is_none() => {
            let valid = e.utf8_error().valid_up_to();
            let mut bytes = e.into_bytes();
            bytes.truncate(valid);
            String::from_utf8(bytes).ok()
        }
        Err(_) => {
            debug!(path = %path.display(), "Log file is not valid UTF-8");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_log(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_clean_title_short_unchanged() {
        assert_eq!(clean_title("Fix the login bug"), "Fix the login bug");
    }

    #[test]
    fn test_clean_title_newlines_and_trim() {
        assert_eq!(clean_title("  line one\nline two \n"), "line one line two");
    }

    #[test]
    fn test_clean_title_exactly_fifty() {
        let input = "a".repeat(50);
        assert_eq!(clean_title(&input), input);
    }

    #[test]
    fn test_clean_title_truncates_long() {
        let input = "b".repeat(51);
        let title = clean_title(&input);
        assert_eq!(title.chars().count(), 50);
        assert_eq!(title, format!("{}...", "b".repeat(47)));
    }

    #[test]
    fn test_clean_title_counts_chars_not_bytes() {
        let input = "é".repeat(50);
        assert_eq!(clean_title(&input), input);

        let long = "日".repeat(60);
        let title = clean_title(&long);
        assert_eq!(title, format!("{}...", "日".repeat(47)));
    }

    #[test]
    fn test_first_user_message_string_content() {
        let text = concat!(
            r#"{"type":"summary","summary":"x"}"#,
            "\n",
            r#"{"type":"user","message":{"role":"user","content":"Refactor the parser"}}"#,
            "\n",
        );
        assert_eq!(first_user_message(text).as_deref(), Some("Refactor the parser"));
    }

    #[test]
    fn test_first_user_message_by_role_only() {
        let text = r#"{"type":"event","message":{"role":"user","content":"by role"}}"#;
        assert_eq!(first_user_message(text).as_deref(), Some("by role"));
    }

    #[test]
    fn test_first_user_message_content_blocks() {
        let text = r#"{"type":"user","message":{"role":"user","content":[{"type":"image"},{"type":"text","text":""},{"type":"text","text":"Add tests"}]}}"#;
        assert_eq!(first_user_message(text).as_deref(), Some("Add tests"));
    }

    #[test]
    fn test_first_user_message_skips_assistant_and_garbage() {
        let text = concat!(
            "not json at all\n",
            r#"{"type":"assistant","message":{"role":"assistant","content":"hello"}}"#,
            "\n\n",
            r#"{"type":"user","message":{"role":"user","content":""}}"#,
            "\n",
            r#"{"type":"user","message":{"role":"user","content":"second try"}}"#,
            "\n",
        );
        assert_eq!(first_user_message(text).as_deref(), Some("second try"));
    }

    #[test]
    fn test_first_user_message_none() {
        let text = r#"{"type":"assistant","message":{"role":"assistant","content":"hi"}}"#;
        assert!(first_user_message(text).is_none());
        assert!(first_user_message("").is_none());
    }

    #[test]
    fn test_first_user_message_unexpected_content_shape() {
        let text = concat!(
            r#"{"type":"user","message":{"role":"user","content":{"weird":true}}}"#,
            "\n",
            r#"{"type":"user","message":{"role":"user","content":"fallback"}}"#,
        );
        assert_eq!(first_user_message(text).as_deref(), Some("fallback"));
    }

    #[test]
    fn test_first_user_message_non_string_role_with_user_type() {
        let text = r#"{"type":"user","message":{"role":7,"content":"hi there"}}"#;
        assert_eq!(first_user_message(text).as_deref(), Some("hi there"));
    }

    #[test]
    fn test_first_user_message_non_string_type_with_user_role() {
        let text = r#"{"type":["user"],"message":{"role":"user","content":"role wins"}}"#;
        assert_eq!(first_user_message(text).as_deref(), Some("role wins"));
    }

    #[test]
    fn test_first_user_message_skips_malformed_blocks() {
        let text = r#"{"type":"user","message":{"content":[{"type":"text","text":5},"loose",{"type":3,"text":"no"},{"type":"text","text":"real"}]}}"#;
        assert_eq!(first_user_message(text).as_deref(), Some("real"));
    }

    #[test]
    fn test_first_user_message_non_object_message() {
        let text = concat!(
            r#"{"type":"user","message":"flat"}"#,
            "\n",
            r#"{"type":"user","message":{"content":"next line"}}"#,
        );
        assert_eq!(first_user_message(text).as_deref(), Some("next line"));
    }

    #[test]
    fn test_extract_title_from_file() {
        let dir = TempDir::new().unwrap();
        let path = write_log(
            &dir,
            "abc.jsonl",
            "{\"type\":\"user\",\"message\":{\"role\":\"user\",\"content\":\"Explain\\nthis code\"}}\n",
        );
        assert_eq!(extract_title(&path), "Explain this code");
    }

    #[test]
    fn test_extract_title_falls_back_to_stem() {
        let dir = TempDir::new().unwrap();
        let path = write_log(&dir, "226f3c14-cc34.jsonl", "{\"type\":\"assistant\"}\n");
        assert_eq!(extract_title(&path), "226f3c14-cc34");
    }

    #[test]
    fn test_extract_title_missing_file() {
        let path = Path::new("/nonexistent/dir/session-1.jsonl");
        assert_eq!(extract_title(path), "session-1");
    }

    #[test]
    fn test_extract_title_invalid_utf8() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.jsonl");
        fs::write(&path, [0xff, 0xfe, b'\n', b'{', b'}']).unwrap();
        assert_eq!(extract_title(&path), "bad");
    }

    #[test]
    fn test_extract_title_only_reads_prefix() {
        let dir = TempDir::new().unwrap();
        let filler = format!(
            "{{\"type\":\"summary\",\"pad\":\"{}\"}}\n",
            "x".repeat(TITLE_SCAN_BYTES as usize)
        );
        let contents = format!(
            "{filler}{}\n",
            r#"{"type":"user","message":{"role":"user","content":"too late"}}"#
        );
        let path = write_log(&dir, "late.jsonl", &contents);
        assert_eq!(extract_title(&path), "late");
    }

    #[test]
    fn test_extract_title_multibyte_split_at_limit() {
        let dir = TempDir::new().unwrap();
        let first = "{\"type\":\"user\",\"message\":{\"role\":\"user\",\"content\":\"héllo\"}}\n";
        let pad_len = TITLE_SCAN_BYTES as usize - first.len() - 1;
        // The 2-byte character starts on the last byte inside the limit.
        let contents = format!("{first}{}é", "x".repeat(pad_len));
        let path = write_log(&dir, "split.jsonl", &contents);
        assert_eq!(extract_title(&path), "héllo");
    }
}
