//! Stored values for normalized records.
//!
//! A record field holds either a scalar (any JSON value) or a link to one or
//! more other records. Links may nest when a field is a list of lists.

use serde_json::Value;

/// Opaque identity of a normalized record.
pub type RecordId = String;

/// Field name plus serialized arguments, after variable substitution.
pub type FieldKey = String;

/// Variable bindings of an operation.
pub type Variables = serde_json::Map<String, Value>;

/// Identity of the query root record.
pub const ROOT_ID: &str = "_ROOT_";

/// Returns true if the record is the root or nested under it.
#[inline]
pub fn is_root_scoped(id: &str) -> bool {
    id.starts_with(ROOT_ID)
}

/// A link from a field to other records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkValue {
    /// Explicit null link.
    Null,
    /// A single linked record.
    Record(RecordId),
    /// A list of links, possibly nested.
    List(Vec<LinkValue>),
}

impl LinkValue {
    /// Returns every record id referenced by this link, in order.
    ///
    /// Nested lists are flattened and nulls are skipped.
    pub fn flatten(&self) -> Vec<RecordId> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(link) = stack.pop() {
            match link {
                LinkValue::Null => {}
                LinkValue::Record(id) => out.push(id.clone()),
                LinkValue::List(items) => stack.extend(items.iter().rev()),
            }
        }
        out
    }

    /// Returns true if `id` is referenced anywhere in this link.
    pub fn contains(&self, id: &str) -> bool {
        match self {
            LinkValue::Null => false,
            LinkValue::Record(linked) => linked == id,
            LinkValue::List(items) => items.iter().any(|item| item.contains(id)),
        }
    }
}

impl From<RecordId> for LinkValue {
    fn from(id: RecordId) -> Self {
        LinkValue::Record(id)
    }
}

impl From<&str> for LinkValue {
    fn from(id: &str) -> Self {
        LinkValue::Record(id.to_string())
    }
}

/// The value stored under a (record, field key) pair.
#[derive(Clone, Debug, PartialEq)]
pub enum StoredValue {
    /// A scalar JSON value (including objects for custom scalars).
    Scalar(Value),
    /// A link to other records.
    Link(LinkValue),
}

impl StoredValue {
    /// Returns the scalar value, if any.
    #[inline]
    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            StoredValue::Scalar(value) => Some(value),
            StoredValue::Link(_) => None,
        }
    }

    /// Returns the link value, if any.
    #[inline]
    pub fn as_link(&self) -> Option<&LinkValue> {
        match self {
            StoredValue::Link(link) => Some(link),
            StoredValue::Scalar(_) => None,
        }
    }

    /// Returns the linked record ids, or nothing for scalars.
    pub fn linked_ids(&self) -> Vec<RecordId> {
        self.as_link().map(LinkValue::flatten).unwrap_or_default()
    }
}

impl From<Value> for StoredValue {
    fn from(value: Value) -> Self {
        StoredValue::Scalar(value)
    }
}

impl From<LinkValue> for StoredValue {
    fn from(link: LinkValue) -> Self {
        StoredValue::Link(link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_nested_links() {
        let link = LinkValue::List(vec![
            LinkValue::from("User:1"),
            LinkValue::Null,
            LinkValue::List(vec![LinkValue::from("User:2"), LinkValue::from("User:3")]),
        ]);
        assert_eq!(link.flatten(), vec!["User:1", "User:2", "User:3"]);
        assert!(link.contains("User:3"));
        assert!(!link.contains("User:4"));
    }

    #[test]
    fn test_root_scoped() {
        assert!(is_root_scoped(ROOT_ID));
        assert!(is_root_scoped("_ROOT_.viewer"));
        assert!(!is_root_scoped("User:1"));
    }

    #[test]
    fn test_stored_value_linked_ids() {
        let scalar = StoredValue::from(Value::from(3));
        assert!(scalar.linked_ids().is_empty());
        assert_eq!(scalar.as_scalar(), Some(&Value::from(3)));

        let link = StoredValue::from(LinkValue::from("User:1"));
        assert_eq!(link.linked_ids(), vec!["User:1"]);
    }
}
