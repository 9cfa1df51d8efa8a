//! Merge-node combination strategies (spec §4.6: "merging logic lives on
//! a node's inbound edges").
//!
//! A `merge` node has no config of its own; a [`MergeStrategy`] is
//! attached to each inbound edge (or, for the common case, to the node
//! and shared by all its inbound edges) and decides how a newly-arrived
//! delivery is folded into the accumulator built from earlier arrivals.

use hermod_core::Value;
use serde::{Deserialize, Serialize};

/// How an incoming delivery combines with what a `merge` node has
/// accumulated so far (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Recursively merge maps key-by-key; `incoming` wins on any key
    /// conflict that isn't itself two maps. The default.
    #[default]
    Deep,
    /// `incoming` replaces `base` entirely.
    Overwrite,
    /// Top-level keys from `incoming` replace the same key in `base`;
    /// nested maps are not merged further.
    Shallow,
    /// Only fields absent from `base` are taken from `incoming`; existing
    /// fields in `base` are never overwritten.
    IfMissing,
}

/// Fold `incoming` into `base` per `strategy`, in place.
pub fn merge(base: &mut Value, incoming: &Value, strategy: MergeStrategy) {
    match strategy {
        MergeStrategy::Overwrite => *base = incoming.clone(),
        MergeStrategy::Shallow => shallow_merge(base, incoming),
        MergeStrategy::Deep => deep_merge(base, incoming),
        MergeStrategy::IfMissing => if_missing_merge(base, incoming),
    }
}

fn shallow_merge(base: &mut Value, incoming: &Value) {
    let (Value::Map(base_map), Value::Map(incoming_map)) = (&mut *base, incoming) else {
        *base = incoming.clone();
        return;
    };
    for (key, value) in incoming_map {
        base_map.insert(key.clone(), value.clone());
    }
}

fn deep_merge(base: &mut Value, incoming: &Value) {
    let (Value::Map(base_map), Value::Map(incoming_map)) = (&mut *base, incoming) else {
        *base = incoming.clone();
        return;
    };
    for (key, incoming_value) in incoming_map {
        match base_map.get_mut(key) {
            Some(existing @ Value::Map(_)) if matches!(incoming_value, Value::Map(_)) => {
                deep_merge(existing, incoming_value);
            }
            _ => {
                base_map.insert(key.clone(), incoming_value.clone());
            }
        }
    }
}

fn if_missing_merge(base: &mut Value, incoming: &Value) {
    let (Value::Map(base_map), Value::Map(incoming_map)) = (&mut *base, incoming) else {
        if matches!(base, Value::Null) {
            *base = incoming.clone();
        }
        return;
    };
    for (key, incoming_value) in incoming_map {
        base_map.entry(key.clone()).or_insert_with(|| incoming_value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn map(pairs: &[(&str, Value)]) -> Value {
        let mut m = BTreeMap::new();
        for (k, v) in pairs {
            m.insert((*k).to_string(), v.clone());
        }
        Value::Map(m)
    }

    #[test]
    fn overwrite_replaces_base_entirely() {
        let mut base = map(&[("a", Value::I64(1))]);
        let incoming = map(&[("b", Value::I64(2))]);
        merge(&mut base, &incoming, MergeStrategy::Overwrite);
        assert_eq!(base, incoming);
    }

    #[test]
    fn shallow_does_not_recurse_into_nested_maps() {
        let mut base = map(&[("nested", map(&[("x", Value::I64(1))]))]);
        let incoming = map(&[("nested", map(&[("y", Value::I64(2))]))]);
        merge(&mut base, &incoming, MergeStrategy::Shallow);
        assert_eq!(base.get_path("nested.y"), Some(&Value::I64(2)));
        assert_eq!(base.get_path("nested.x"), None);
    }

    #[test]
    fn deep_merges_nested_maps_recursively() {
        let mut base = map(&[("nested", map(&[("x", Value::I64(1))]))]);
        let incoming = map(&[("nested", map(&[("y", Value::I64(2))]))]);
        merge(&mut base, &incoming, MergeStrategy::Deep);
        assert_eq!(base.get_path("nested.x"), Some(&Value::I64(1)));
        assert_eq!(base.get_path("nested.y"), Some(&Value::I64(2)));
    }

    #[test]
    fn if_missing_never_overwrites_existing_fields() {
        let mut base = map(&[("a", Value::I64(1))]);
        let incoming = map(&[("a", Value::I64(99)), ("b", Value::I64(2))]);
        merge(&mut base, &incoming, MergeStrategy::IfMissing);
        assert_eq!(base.get_path("a"), Some(&Value::I64(1)));
        assert_eq!(base.get_path("b"), Some(&Value::I64(2)));
    }

    #[test]
    fn default_strategy_is_deep() {
        assert_eq!(MergeStrategy::default(), MergeStrategy::Deep);
    }
}
