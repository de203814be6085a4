//! Namespaced variables exposed to templates as `$Vars`.

use std::collections::BTreeMap;
use std::sync::Arc;

use ecow::EcoString;

use crate::compiler::NAMESPACE_SEPARATOR;
use crate::values::{Key, KeyKind, MapValue, Value};

/// Variables passed to a render, visible as `$Vars`.
///
/// A key `ns|key` belongs to namespace `ns`. Templates in that namespace see
/// it as `key`, shadowing an un-namespaced `key`; templates elsewhere don't
/// see it at all.
///
/// ```
/// use quill_core::api::VarMap;
/// use quill_core::values::Value;
///
/// let vars = VarMap::new()
///     .with("Title", Value::str("site"))
///     .with("blog|Title", Value::str("blog"));
/// assert_eq!(vars.unpack("blog").get("Title"), Some(&Value::str("blog")));
/// assert_eq!(vars.unpack("shop").get("Title"), Some(&Value::str("site")));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VarMap {
    entries: BTreeMap<EcoString, Value>,
}

impl VarMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<EcoString>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    pub fn with(mut self, key: impl Into<EcoString>, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The variables as seen from namespace `ns`.
    pub fn unpack(&self, ns: &str) -> VarMap {
        VarMap {
            entries: unpack_entries(self.entries.iter().map(|(k, v)| (k.as_str(), v)), ns)
                .collect(),
        }
    }

    pub fn to_value(&self) -> Value {
        let mut map = MapValue::new(KeyKind::Str);
        for (key, value) in &self.entries {
            map.insert(key.clone(), value.clone());
        }
        Value::Map(Arc::new(map))
    }
}

impl<K: Into<EcoString>> FromIterator<(K, Value)> for VarMap {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        VarMap {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Unpack a `$Vars` map for a template in namespace `ns`. Maps whose keys
/// aren't strings are returned as they are.
pub(crate) fn unpack_map(vars: &Arc<MapValue>, ns: &str) -> Value {
    if ns.is_empty() || vars.key_kind() != KeyKind::Str {
        return Value::Map(Arc::clone(vars));
    }
    let entries = vars.sorted_entries().filter_map(|(key, value)| match key {
        Key::Str(key) => Some((key.as_str(), value)),
        _ => None,
    });
    let mut map = MapValue::new(KeyKind::Str);
    for (key, value) in unpack_entries(entries, ns) {
        map.insert(key, value);
    }
    Value::Map(Arc::new(map))
}

/// Un-namespaced entries first, then the ones of `ns` with their prefix
/// removed, so the latter win when collected.
fn unpack_entries<'a>(
    entries: impl Iterator<Item = (&'a str, &'a Value)> + Clone,
    ns: &'a str,
) -> impl Iterator<Item = (EcoString, Value)> {
    let global = entries
        .clone()
        .filter(|(key, _)| !key.contains(NAMESPACE_SEPARATOR))
        .map(|(key, value)| (EcoString::from(key), value.clone()));
    let local = entries.filter_map(move |(key, value)| {
        let rest = key.strip_prefix(ns)?.strip_prefix(NAMESPACE_SEPARATOR)?;
        Some((EcoString::from(rest), value.clone()))
    });
    global.chain(local)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_unpack_namespaces() {
        let vars: VarMap = [
            ("Title", Value::str("site")),
            ("Shared", Value::Int(1)),
            ("blog|Title", Value::str("blog")),
            ("blog|admin|Title", Value::str("admin")),
            ("shop|Title", Value::str("shop")),
        ]
        .into_iter()
        .collect();

        let blog = vars.unpack("blog");
        assert_eq!(blog.get("Title"), Some(&Value::str("blog")));
        assert_eq!(blog.get("Shared"), Some(&Value::Int(1)));
        assert_eq!(blog.get("admin|Title"), Some(&Value::str("admin")));
        assert_eq!(blog.get("shop|Title"), None);
        assert_eq!(blog.len(), 3);

        assert_eq!(vars.unpack("blog").unpack("admin").get("Title"), Some(&Value::str("admin")));
    }

    #[test]
    fn test_unpack_map_matches_var_map() {
        let vars = VarMap::new()
            .with("Title", Value::str("site"))
            .with("ui|Title", Value::str("ui"));
        let Value::Map(map) = vars.to_value() else {
            panic!("not a map");
        };
        assert_eq!(unpack_map(&map, "ui"), vars.unpack("ui").to_value());
        assert_eq!(unpack_map(&map, ""), vars.to_value());
    }
}
