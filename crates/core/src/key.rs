//! Field key evaluation.
//!
//! Generated artifacts carry a raw key template per field, e.g.
//! `friends(first: $first, filter: "$raw")`. Evaluating the template replaces
//! every variable reference outside string literals with the JSON encoding of
//! its binding.

use crate::value::{FieldKey, Variables};

#[inline]
fn is_var_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn push_binding(out: &mut String, name: &str, variables: &Variables) {
    match variables.get(name) {
        Some(value) => out.push_str(&value.to_string()),
        None => out.push_str("undefined"),
    }
}

/// Evaluates a raw key template against the given variables.
///
/// Unbound variables render as `undefined`.
pub fn evaluate_key(key_raw: &str, variables: &Variables) -> FieldKey {
    let mut evaluated = String::with_capacity(key_raw.len());
    let mut var_name: Option<String> = None;
    let mut in_string = false;

    for c in key_raw.chars() {
        if let Some(name) = var_name.as_mut() {
            if is_var_char(c) {
                name.push(c);
                continue;
            }
            push_binding(&mut evaluated, name, variables);
            var_name = None;
        }

        if c == '$' && !in_string {
            var_name = Some(String::new());
            continue;
        }
        if c == '"' {
            in_string = !in_string;
        }
        evaluated.push(c);
    }

    if let Some(name) = var_name {
        push_binding(&mut evaluated, &name, variables);
    }

    evaluated
}
