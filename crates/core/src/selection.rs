//! Selection trees handed in by generated artifacts.
//!
//! A `Selection` describes the static shape of a document: which fields are
//! read under a record and, for linked fields, the nested selection applied
//! to the linked records. Abstract (interface/union) selections carry one
//! field map per concrete type, resolved through [`Selection::fields_for_type`].

use crate::value::Variables;
use hashbrown::HashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::rc::Rc;

/// Ordered map from response field name to its selection.
pub type FieldMap = IndexMap<String, FieldSelection>;

/// A selection set.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    /// Fields selected regardless of concrete type.
    #[serde(default)]
    pub fields: FieldMap,
    /// Per-type field maps for abstract selections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abstract_fields: Option<AbstractFields>,
}

/// Type-conditional field maps.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbstractFields {
    /// Concrete or abstract type name -> fields.
    #[serde(default)]
    pub fields: HashMap<String, FieldMap>,
    /// Concrete type name -> abstract type name with an entry in `fields`.
    #[serde(default)]
    pub type_map: HashMap<String, String>,
}

impl Selection {
    /// Creates an empty selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field, builder style.
    pub fn field(mut self, name: impl Into<String>, field: FieldSelection) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    /// Adds a type-conditional field map, builder style.
    pub fn on_type(mut self, type_name: impl Into<String>, fields: Selection) -> Self {
        self.abstract_fields
            .get_or_insert_with(AbstractFields::default)
            .fields
            .insert(type_name.into(), fields.fields);
        self
    }

    /// Maps a concrete type onto an abstract entry, builder style.
    pub fn map_type(mut self, concrete: impl Into<String>, abstract_type: impl Into<String>) -> Self {
        self.abstract_fields
            .get_or_insert_with(AbstractFields::default)
            .type_map
            .insert(concrete.into(), abstract_type.into());
        self
    }

    /// Resolves the field map that applies to a record of the given type.
    ///
    /// Without a type, or when no type-conditional entry matches, the plain
    /// `fields` map applies.
    pub fn fields_for_type(&self, typename: Option<&str>) -> &FieldMap {
        let (Some(typename), Some(abstract_fields)) = (typename, self.abstract_fields.as_ref()) else {
            return &self.fields;
        };
        if let Some(fields) = abstract_fields.fields.get(typename) {
            return fields;
        }
        abstract_fields
            .type_map
            .get(typename)
            .and_then(|mapped| abstract_fields.fields.get(mapped))
            .unwrap_or(&self.fields)
    }

    /// Returns true if no field is selected at all.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
            && self
                .abstract_fields
                .as_ref()
                .map(|a| a.fields.values().all(IndexMap::is_empty))
                .unwrap_or(true)
    }
}

/// List metadata for a list-backed field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSpec {
    /// Name the list is registered under.
    pub name: String,
    /// Whether the list is a connection (edges/node).
    #[serde(default)]
    pub connection: bool,
    /// Type of the list items.
    #[serde(rename = "type")]
    pub list_type: String,
}

/// A filter argument attached to a list field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterArg {
    /// `Variable` when `value` names a variable, otherwise the literal kind.
    pub kind: String,
    /// Literal value, or the variable name.
    pub value: Value,
}

impl FilterArg {
    /// Resolves the filter against the operation variables.
    pub fn resolve(&self, variables: &Variables) -> Value {
        if self.kind != "Variable" {
            return self.value.clone();
        }
        self.value
            .as_str()
            .and_then(|name| variables.get(name))
            .cloned()
            .unwrap_or(Value::Null)
    }
}

/// The static shape of one selected field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSelection {
    /// Key template, evaluated against variables.
    pub key_raw: String,
    /// GraphQL type of the field.
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<ListSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<IndexMap<String, FilterArg>>,
    /// Nested selection for linked fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<Rc<Selection>>,
    /// Whether subscribers observe this field.
    #[serde(default)]
    pub visible: bool,
    /// Whether the field carries an optimistic key.
    #[serde(default)]
    pub optimistic_key: bool,
}

impl FieldSelection {
    /// Creates a visible scalar field.
    pub fn scalar(key_raw: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            key_raw: key_raw.into(),
            type_name: type_name.into(),
            nullable: false,
            list: None,
            filters: None,
            selection: None,
            visible: true,
            optimistic_key: false,
        }
    }

    /// Creates a visible linked field.
    pub fn linked(key_raw: impl Into<String>, type_name: impl Into<String>, selection: Selection) -> Self {
        Self {
            selection: Some(Rc::new(selection)),
            nullable: true,
            ..Self::scalar(key_raw, type_name)
        }
    }

    /// Marks the field as list-backed.
    pub fn with_list(mut self, list: ListSpec) -> Self {
        self.list = Some(list);
        self
    }

    /// Adds a list filter.
    pub fn with_filter(mut self, name: impl Into<String>, filter: FilterArg) -> Self {
        self.filters.get_or_insert_with(IndexMap::new).insert(name.into(), filter);
        self
    }

    /// Marks the field as an optimistic key.
    pub fn as_optimistic_key(mut self) -> Self {
        self.optimistic_key = true;
        self
    }

    /// Hides the field from subscribers.
    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Returns true if the field links to other records.
    #[inline]
    pub fn is_linked(&self) -> bool {
        self.selection.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node_selection() -> Selection {
        Selection::new()
            .field("id", FieldSelection::scalar("id", "ID"))
            .on_type("User", Selection::new().field("name", FieldSelection::scalar("name", "String")))
            .on_type("Cat", Selection::new().field("lives", FieldSelection::scalar("lives", "Int")))
            .map_type("Kitten", "Cat")
    }

    #[test]
    fn test_fields_for_type() {
        let selection = node_selection();
        assert!(selection.fields_for_type(Some("User")).contains_key("name"));
        assert!(selection.fields_for_type(Some("Kitten")).contains_key("lives"));
        assert!(selection.fields_for_type(Some("Dog")).contains_key("id"));
        assert!(selection.fields_for_type(None).contains_key("id"));
    }

    #[test]
    fn test_deserialize_artifact_selection() {
        let selection: Selection = serde_json::from_value(json!({
            "fields": {
                "viewer": {
                    "type": "User",
                    "keyRaw": "viewer",
                    "nullable": true,
                    "visible": true,
                    "selection": {
                        "fields": {
                            "id": { "type": "ID", "keyRaw": "id", "visible": true }
                        }
                    }
                }
            }
        }))
        .unwrap();

        let viewer = &selection.fields["viewer"];
        assert!(viewer.is_linked());
        assert_eq!(viewer.type_name, "User");
        assert!(viewer.selection.as_ref().unwrap().fields["id"].visible);
    }

    #[test]
    fn test_filter_resolve() {
        let variables = json!({ "status": "active" }).as_object().cloned().unwrap();
        let var = FilterArg {
            kind: "Variable".into(),
            value: json!("status"),
        };
        let literal = FilterArg {
            kind: "String".into(),
            value: json!("fixed"),
        };
        assert_eq!(var.resolve(&variables), json!("active"));
        assert_eq!(literal.resolve(&variables), json!("fixed"));
    }
}
