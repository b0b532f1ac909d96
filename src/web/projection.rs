//! `fields=` projection of serialized items.

use serde_json::{Map, Value};

/// Keep only the requested keys of a JSON object. `fields` holds lower-cased
/// names; object keys are compared case-insensitively. An empty list keeps
/// everything.
pub fn project_item(item: Value, fields: &[String]) -> Value {
    if fields.is_empty() {
        return item;
    }
    match item {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(key, _)| fields.contains(&key.to_lowercase()))
                .collect::<Map<String, Value>>(),
        ),
        other => other,
    }
}

/// Project every element of a page's `items` array.
pub fn project_page(mut page: Value, fields: &[String]) -> Value {
    if fields.is_empty() {
        return page;
    }
    if let Some(Value::Array(items)) = page.get_mut("items") {
        let projected = std::mem::take(items)
            .into_iter()
            .map(|item| project_item(item, fields))
            .collect();
        *items = projected;
    }
    page
}
