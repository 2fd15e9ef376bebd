//! Reminder suppression for approaching goals.
//!
//! Collectors report goals that are coming due as objects inside an
//! `approaching` array. Once a check-in mentions a goal, its id is marked as
//! reminded and the goal is filtered out of later payloads until the
//! reminder cooldown runs out.

use std::collections::HashSet;

use serde_json::Value;

/// Key under which collectors list goals that are coming due.
pub const APPROACHING_KEY: &str = "approaching";

/// Normalised identifier of a goal item (`id` may be a number or a string).
pub fn goal_id(item: &Value) -> Option<String> {
    match item.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Copy of `data` with every reminded goal removed from `approaching` lists.
pub fn filter_reminded(data: &Value, reminded: &HashSet<String>) -> Value {
    match data {
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (key, value) in map {
                let filtered = match value {
                    Value::Array(items) if key == APPROACHING_KEY => Value::Array(
                        items
                            .iter()
                            .filter(|item| goal_id(item).is_none_or(|id| !reminded.contains(&id)))
                            .cloned()
                            .collect(),
                    ),
                    other => filter_reminded(other, reminded),
                };
                out.insert(key.clone(), filtered);
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

/// Ids of every goal still listed as approaching, in order of appearance.
pub fn approaching_goal_ids(data: &Value) -> Vec<String> {
    let mut ids = Vec::new();
    collect_ids(data, &mut ids);
    ids
}

fn collect_ids(data: &Value, ids: &mut Vec<String>) {
    if let Value::Object(map) = data {
        for (key, value) in map {
            match value {
                Value::Array(items) if key == APPROACHING_KEY => {
                    for id in items.iter().filter_map(goal_id) {
                        if !ids.contains(&id) {
                            ids.push(id);
                        }
                    }
                }
                other => collect_ids(other, ids),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn set(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_goal_id_accepts_numbers_and_strings() {
        assert_eq!(goal_id(&json!({"id": 7})).as_deref(), Some("7"));
        assert_eq!(goal_id(&json!({"id": "g-7"})).as_deref(), Some("g-7"));
        assert_eq!(goal_id(&json!({"title": "no id"})), None);
    }

    #[test]
    fn test_filter_removes_only_reminded() {
        let data = json!({
            "goals": {"approaching": [{"id": 1}, {"id": 2}, {"id": 3}], "stale": [{"id": 1}]},
            "calendar": {"events": [{"id": 1}]}
        });
        let filtered = filter_reminded(&data, &set(&["1", "3"]));
        assert_eq!(filtered["goals"]["approaching"], json!([{"id": 2}]));
        // Only `approaching` lists are touched.
        assert_eq!(filtered["goals"]["stale"], json!([{"id": 1}]));
        assert_eq!(filtered["calendar"]["events"], json!([{"id": 1}]));
    }

    #[test]
    fn test_items_without_id_survive() {
        let data = json!({"goals": {"approaching": [{"title": "untracked"}]}});
        let filtered = filter_reminded(&data, &set(&["1"]));
        assert_eq!(filtered, data);
    }

    #[test]
    fn test_approaching_ids_deduped_in_order() {
        let data = json!({
            "goals": {"approaching": [{"id": 5}, {"id": "a"}]},
            "work": {"approaching": [{"id": 5}, {"id": 9}]}
        });
        let ids = approaching_goal_ids(&data);
        assert_eq!(ids.len(), 3);
        assert!(ids.contains(&"5".to_string()));
        assert!(ids.contains(&"a".to_string()));
        assert!(ids.contains(&"9".to_string()));
    }
}
