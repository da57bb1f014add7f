//! Pre-parse duplicate-key detection
//!
//! `serde_json` keeps the last occurrence of a repeated object key, which
//! would let a malformed manifest silently drop definitions. This scanner
//! walks the raw text before parsing and reports every key re-declared within
//! the same object scope.

use crate::error::DuplicateKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Object,
    Array,
}

/// Scan `raw` for object keys re-declared within one scope.
///
/// Scopes are tracked with a stack keyed by brace depth, so identical keys in
/// sibling objects are fine while a re-declaration at any nesting depth is
/// reported with its line number. The scanner is string- and escape-aware but
/// performs no validation beyond key tracking; malformed JSON is left for the
/// parser to reject.
pub fn find_duplicate_keys(raw: &str) -> Vec<DuplicateKey> {
    let mut duplicates = Vec::new();
    let mut scopes: Vec<Scope> = Vec::new();
    let mut seen: Vec<std::collections::HashSet<String>> = Vec::new();
    let mut line = 1usize;

    let bytes: Vec<char> = raw.chars().collect();
    let mut i = 0usize;

    while i < bytes.len() {
        let c = bytes[i];
        match c {
            '\n' => line += 1,
            '{' => {
                scopes.push(Scope::Object);
                seen.push(std::collections::HashSet::new());
            }
            '}' => {
                if scopes.pop() == Some(Scope::Object) {
                    seen.pop();
                }
            }
            '[' => scopes.push(Scope::Array),
            ']' => {
                scopes.pop();
            }
            '"' => {
                let start_line = line;
                let (text, next) = read_string(&bytes, i + 1, &mut line);
                i = next;

                // A string is a key iff the next significant character is a
                // colon and the enclosing scope is an object.
                let mut j = i;
                while j < bytes.len() && bytes[j].is_whitespace() {
                    j += 1;
                }
                let is_key = j < bytes.len()
                    && bytes[j] == ':'
                    && scopes.last() == Some(&Scope::Object);

                if is_key {
                    if let Some(keys) = seen.last_mut() {
                        if !keys.insert(text.clone()) {
                            duplicates.push(DuplicateKey {
                                line: start_line,
                                key: text,
                            });
                        }
                    }
                }
                continue;
            }
            _ => {}
        }
        i += 1;
    }

    duplicates
}

/// Consume a JSON string starting just past the opening quote.
///
/// Returns the unescaped-enough key text (escape pairs are kept verbatim;
/// equality of repeated keys is still detected) and the index just past the
/// closing quote.
fn read_string(bytes: &[char], mut i: usize, line: &mut usize) -> (String, usize) {
    let mut text = String::new();
    while i < bytes.len() {
        match bytes[i] {
            '\\' => {
                if i + 1 < bytes.len() {
                    text.push(bytes[i]);
                    text.push(bytes[i + 1]);
                    i += 2;
                    continue;
                }
                i += 1;
            }
            '"' => return (text, i + 1),
            c => {
                if c == '\n' {
                    *line += 1;
                }
                text.push(c);
                i += 1;
            }
        }
    }
    (text, i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_document_has_no_duplicates() {
        let raw = r#"{"tasks": {"a": 1}, "workflows": {"a": 2}}"#;
        assert!(find_duplicate_keys(raw).is_empty());
    }

    #[test]
    fn test_top_level_duplicate_is_found() {
        let raw = "{\n  \"tasks\": {},\n  \"tasks\": {}\n}";
        let dups = find_duplicate_keys(raw);
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].key, "tasks");
        assert_eq!(dups[0].line, 3);
    }

    #[test]
    fn test_nested_duplicate_is_found() {
        let raw = r#"{"tasks": {"build": {"file": "a", "file": "b"}}}"#;
        let dups = find_duplicate_keys(raw);
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].key, "file");
    }

    #[test]
    fn test_sibling_objects_may_share_keys() {
        let raw = r#"{"a": {"file": "x"}, "b": {"file": "y"}}"#;
        assert!(find_duplicate_keys(raw).is_empty());
    }

    #[test]
    fn test_braces_inside_strings_are_ignored() {
        let raw = r#"{"cmd": "{not json}", "cmd2": "}{", "cmd": "again"}"#;
        let dups = find_duplicate_keys(raw);
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].key, "cmd");
    }

    #[test]
    fn test_string_values_matching_keys_are_not_keys() {
        // "tasks" appears as an array value; only the real key counts.
        let raw = r#"{"kinds": ["tasks", "tasks"], "tasks": {}}"#;
        assert!(find_duplicate_keys(raw).is_empty());
    }

    #[test]
    fn test_escaped_quotes_do_not_break_scanning() {
        let raw = r#"{"a": "quote \" here", "a": 1}"#;
        let dups = find_duplicate_keys(raw);
        assert_eq!(dups.len(), 1);
    }
}
