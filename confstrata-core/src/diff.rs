//! Diff calculation between flat configuration value sets.
//!
//! Diffs are keyed by value name. Applying `calculate_diff(a, b)` to `a`
//! reproduces the name/value content of `b`.

use crate::types::{ConfigDiff, ConfigValue};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

fn index_by_name(values: &[ConfigValue]) -> HashMap<&str, &Value> {
    values
        .iter()
        .map(|entry| (entry.name.as_str(), &entry.value))
        .collect()
}

/// Compute the add/modify/remove delta from `old` to `new`.
///
/// Output lists additions and modifications in `new` order, then removals in
/// `old` order; each name appears at most once. When a name is repeated inside
/// one input the last occurrence wins.
pub fn calculate_diff(old: &[ConfigValue], new: &[ConfigValue]) -> Vec<ConfigDiff> {
    let old_index = index_by_name(old);
    let new_index = index_by_name(new);

    let mut diff = Vec::new();
    let mut seen = HashSet::new();

    for entry in new {
        let name = entry.name.as_str();
        if !seen.insert(name) {
            continue;
        }
        let new_value = new_index[name];
        match old_index.get(name) {
            None => diff.push(ConfigDiff::Added {
                name: name.to_string(),
                new_value: new_value.clone(),
            }),
            Some(old_value) if *old_value != new_value => diff.push(ConfigDiff::Modified {
                name: name.to_string(),
                old_value: (*old_value).clone(),
                new_value: new_value.clone(),
            }),
            Some(_) => {}
        }
    }

    for entry in old {
        let name = entry.name.as_str();
        if new_index.contains_key(name) || !seen.insert(name) {
            continue;
        }
        diff.push(ConfigDiff::Removed {
            name: name.to_string(),
            old_value: old_index[name].clone(),
        });
    }

    diff
}

/// Apply a diff to `base`.
///
/// Entries untouched by the diff pass through unchanged and keep their position;
/// modified entries are updated in place, added entries are appended.
pub fn apply_diff(base: &[ConfigValue], diff: &[ConfigDiff]) -> Vec<ConfigValue> {
    let mut result: Vec<ConfigValue> = Vec::with_capacity(base.len() + diff.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for entry in base {
        match positions.get(&entry.name) {
            Some(&idx) => result[idx] = entry.clone(),
            None => {
                positions.insert(entry.name.clone(), result.len());
                result.push(entry.clone());
            }
        }
    }

    let mut removed = HashSet::new();
    for change in diff {
        match change {
            ConfigDiff::Added { name, new_value }
            | ConfigDiff::Modified {
                name, new_value, ..
            } => {
                removed.remove(name.as_str());
                let upserted = ConfigValue::new(name.clone(), new_value.clone());
                match positions.get(name) {
                    Some(&idx) => result[idx] = upserted,
                    None => {
                        positions.insert(name.clone(), result.len());
                        result.push(upserted);
                    }
                }
            }
            ConfigDiff::Removed { name, .. } => {
                removed.insert(name.as_str());
            }
        }
    }

    result
        .into_iter()
        .filter(|entry| !removed.contains(entry.name.as_str()))
        .collect()
}

/// The diff that undoes `diff`: additions become removals and vice versa,
/// modifications swap their sides.
pub fn invert_diff(diff: &[ConfigDiff]) -> Vec<ConfigDiff> {
    diff.iter()
        .map(|change| match change {
            ConfigDiff::Added { name, new_value } => ConfigDiff::Removed {
                name: name.clone(),
                old_value: new_value.clone(),
            },
            ConfigDiff::Modified {
                name,
                old_value,
                new_value,
            } => ConfigDiff::Modified {
                name: name.clone(),
                old_value: new_value.clone(),
                new_value: old_value.clone(),
            },
            ConfigDiff::Removed { name, old_value } => ConfigDiff::Added {
                name: name.clone(),
                new_value: old_value.clone(),
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn values(pairs: &[(&str, Value)]) -> Vec<ConfigValue> {
        pairs
            .iter()
            .map(|(name, value)| ConfigValue::new(*name, value.clone()))
            .collect()
    }

    fn as_map(values: &[ConfigValue]) -> BTreeMap<String, Value> {
        values
            .iter()
            .map(|entry| (entry.name.clone(), entry.value.clone()))
            .collect()
    }

    #[test]
    fn test_calculate_diff_kinds() {
        let old = values(&[
            ("currency", json!("USD")),
            ("locale", json!("en_US")),
            ("timezone", json!("UTC")),
        ]);
        let new = values(&[
            ("currency", json!("EUR")),
            ("locale", json!("en_US")),
            ("weight_unit", json!("kg")),
        ]);

        let diff = calculate_diff(&old, &new);
        assert_eq!(
            diff,
            vec![
                ConfigDiff::Modified {
                    name: "currency".to_string(),
                    old_value: json!("USD"),
                    new_value: json!("EUR"),
                },
                ConfigDiff::Added {
                    name: "weight_unit".to_string(),
                    new_value: json!("kg"),
                },
                ConfigDiff::Removed {
                    name: "timezone".to_string(),
                    old_value: json!("UTC"),
                },
            ]
        );
    }

    #[test]
    fn test_structural_equality_ignores_object_key_order() {
        let old = values(&[("shipping", json!({"a": 1, "b": [1, 2]}))]);
        let new = vec![ConfigValue {
            name: "shipping".to_string(),
            value: serde_json::from_str(r#"{"b": [1, 2], "a": 1}"#).unwrap(),
            origin: None,
        }];
        assert!(calculate_diff(&old, &new).is_empty());
    }

    #[test]
    fn test_falsy_values_are_present() {
        let old = values(&[("enabled", json!(false))]);
        let new = values(&[("enabled", json!(0)), ("label", json!(""))]);
        let diff = calculate_diff(&old, &new);
        assert_eq!(diff.len(), 2);
        assert_eq!(diff[0].kind(), "modified");
        assert_eq!(diff[1].kind(), "added");
    }

    #[test]
    fn test_duplicate_names_emit_once() {
        let old = values(&[("a", json!(1)), ("a", json!(2))]);
        let new = values(&[("b", json!(1)), ("b", json!(3))]);
        let diff = calculate_diff(&old, &new);
        assert_eq!(diff.len(), 2);
        assert_eq!(
            diff[0],
            ConfigDiff::Added {
                name: "b".to_string(),
                new_value: json!(3)
            }
        );
        assert_eq!(
            diff[1],
            ConfigDiff::Removed {
                name: "a".to_string(),
                old_value: json!(2)
            }
        );
    }

    #[test]
    fn test_apply_inverse_restores_base() {
        let old = values(&[("currency", json!("USD")), ("locale", json!("en_US"))]);
        let new = values(&[("currency", json!("EUR")), ("country", json!("DE"))]);
        let diff = calculate_diff(&old, &new);

        let before = apply_diff(&new, &invert_diff(&diff));
        assert_eq!(as_map(&before), as_map(&old));
    }

    fn value_set() -> impl Strategy<Value = Vec<ConfigValue>> {
        prop::collection::btree_map("[a-e]{1,2}", 0i64..4, 0..8).prop_map(|map| {
            map.into_iter()
                .map(|(name, value)| ConfigValue::new(name, json!(value)))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_apply_calculated_diff_reproduces_new(old in value_set(), new in value_set()) {
            let diff = calculate_diff(&old, &new);
            prop_assert_eq!(as_map(&apply_diff(&old, &diff)), as_map(&new));
        }

        #[test]
        fn prop_diff_against_self_is_empty(values in value_set()) {
            prop_assert!(calculate_diff(&values, &values).is_empty());
        }

        #[test]
        fn prop_names_are_not_duplicated(old in value_set(), new in value_set()) {
            let diff = calculate_diff(&old, &new);
            let names: HashSet<&str> = diff.iter().map(ConfigDiff::name).collect();
            prop_assert_eq!(names.len(), diff.len());
        }
    }
}
