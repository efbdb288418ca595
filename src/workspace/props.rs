//! Total accessors over the untyped property tree of a page.
//!
//! Each function looks up one property by name and returns a default on any
//! missing or mistyped path. None of them can fail.

use serde_json::{Map, Value};

type Properties = Map<String, Value>;

fn field<'a>(props: &'a Properties, name: &str, kind: &str) -> Option<&'a Value> {
    props.get(name)?.get(kind)
}

fn plain_text(fragments: Option<&Value>) -> String {
    fragments
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    item.get("plain_text")
                        .or_else(|| item.get("text").and_then(|t| t.get("content")))
                        .and_then(Value::as_str)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Concatenated plain text of a `title` property.
pub fn title_text(props: &Properties, name: &str) -> String {
    plain_text(field(props, name, "title"))
}

/// Concatenated plain text of a `rich_text` property.
pub fn rich_text(props: &Properties, name: &str) -> String {
    plain_text(field(props, name, "rich_text"))
}

/// Value of a `number` property.
pub fn number(props: &Properties, name: &str) -> Option<f64> {
    field(props, name, "number").and_then(Value::as_f64)
}

/// Numeric result of a `formula` property.
pub fn formula_number(props: &Properties, name: &str) -> Option<f64> {
    field(props, name, "formula")
        .and_then(|f| f.get("number"))
        .and_then(Value::as_f64)
}

/// Value of a `checkbox` property; `false` when absent.
pub fn checkbox(props: &Properties, name: &str) -> bool {
    field(props, name, "checkbox")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Selected option name of a `status` property; empty when absent.
pub fn status_name(props: &Properties, name: &str) -> String {
    field(props, name, "status")
        .and_then(|s| s.get("name"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Ids referenced by a `relation` property, in order.
pub fn relation_ids(props: &Properties, name: &str) -> Vec<String> {
    field(props, name, "relation")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("id").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Start of a `date` property.
pub fn date_start(props: &Properties, name: &str) -> Option<String> {
    date_part(props, name, "start")
}

/// End of a `date` property.
pub fn date_end(props: &Properties, name: &str) -> Option<String> {
    date_part(props, name, "end")
}

fn date_part(props: &Properties, name: &str, part: &str) -> Option<String> {
    field(props, name, "date")
        .and_then(|d| d.get(part))
        .and_then(Value::as_str)
        .map(str::to_string)
}
