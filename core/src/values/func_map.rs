//! Function registry consulted by the compiler.

use std::sync::Arc;

use ecow::EcoString;
use hashbrown::HashMap;

use super::function::Function;

#[derive(Debug, Default, Clone)]
struct Entry {
    pure: Option<Arc<Function>>,
    plain: Option<Arc<Function>>,
}

/// Functions available to templates, by name.
///
/// A name can have both a pure and a regular variant. The compiler always
/// picks the pure one when present, so constant pipelines calling it can be
/// folded.
#[derive(Debug, Default, Clone)]
pub struct FuncMap {
    entries: HashMap<EcoString, Entry>,
}

impl FuncMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn bind(mut self, function: Function) -> Self {
        self.insert(function);
        self
    }

    /// Register `function`, replacing a previous variant of the same purity.
    pub fn insert(&mut self, function: Function) {
        self.insert_shared(Arc::new(function));
    }

    pub fn insert_shared(&mut self, function: Arc<Function>) {
        let entry = self.entries.entry(function.name().into()).or_default();
        let slot = if function.is_pure() {
            &mut entry.pure
        } else {
            &mut entry.plain
        };
        *slot = Some(function);
    }

    /// Drop both variants of `name`.
    pub fn remove(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Function>> {
        let entry = self.entries.get(name)?;
        entry.pure.as_ref().or(entry.plain.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(EcoString::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
