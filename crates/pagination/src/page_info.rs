//! Connection page info helpers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Relay-style page info of a connection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
}

fn walk<'a>(state: &'a Value, path: &[String]) -> Option<&'a Value> {
    let mut current = state;
    for segment in path {
        current = current.get(segment)?;
        if current.is_null() {
            return None;
        }
    }
    Some(current)
}

/// Reads the page info of the connection at `path`.
///
/// Returns `None` if the path does not resolve to a connection carrying a
/// `pageInfo` object.
pub fn extract_page_info(state: &Value, path: &[String]) -> Option<PageInfo> {
    let page_info = walk(state, path)?.get("pageInfo")?;
    if !page_info.is_object() {
        return None;
    }
    serde_json::from_value(page_info.clone()).ok()
}

/// Counts the items of the list at `path`.
///
/// A missing path or a non-list value counts as zero.
pub fn count_page(path: &[String], state: &Value) -> usize {
    walk(state, path)
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_extract_page_info() {
        let state = json!({
            "user": {
                "friends": {
                    "edges": [{ "cursor": "a" }, { "cursor": "b" }],
                    "pageInfo": {
                        "hasNextPage": true,
                        "hasPreviousPage": false,
                        "startCursor": "a",
                        "endCursor": "b"
                    }
                }
            }
        });

        let info = extract_page_info(&state, &path(&["user", "friends"])).unwrap();
        assert!(info.has_next_page);
        assert!(!info.has_previous_page);
        assert_eq!(info.start_cursor.as_deref(), Some("a"));
        assert_eq!(info.end_cursor.as_deref(), Some("b"));

        assert_eq!(count_page(&path(&["user", "friends", "edges"]), &state), 2);
    }

    #[test]
    fn test_extract_page_info_missing() {
        let state = json!({ "user": null });
        assert_eq!(extract_page_info(&state, &path(&["user", "friends"])), None);
        assert_eq!(extract_page_info(&json!({ "user": {} }), &path(&["user"])), None);
        assert_eq!(count_page(&path(&["user", "friends", "edges"]), &state), 0);
    }

    #[test]
    fn test_page_info_partial_fields() {
        let state = json!({ "feed": { "pageInfo": { "hasNextPage": true } } });
        let info = extract_page_info(&state, &path(&["feed"])).unwrap();
        assert!(info.has_next_page);
        assert_eq!(info.end_cursor, None);
    }
}
