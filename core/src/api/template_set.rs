//! Compiler input: a named set of parsed templates.

use std::collections::BTreeMap;

use crate::syntax::Tree;

/// Parsed templates that can call each other, plus the data the compiler
/// inlines at the asset hooks.
///
/// Template names may be namespaced as `ns|name`. The root template is the
/// one rendered by default.
///
/// ```
/// use quill_core::api::TemplateSet;
/// use quill_core::syntax::{Node, Tree};
///
/// let set = TemplateSet::new(Tree::new("page", vec![Node::template("header", None)]))
///     .with_template(Tree::new("header", vec![Node::text("<h1>Hi</h1>")]))
///     .with_content_type("text/html; charset=utf-8");
/// assert_eq!(set.root(), "page");
/// assert!(set.contains("header"));
/// ```
#[derive(Debug, Clone)]
pub struct TemplateSet {
    trees: BTreeMap<String, Tree>,
    root: String,
    content_type: String,
    top_assets: Vec<u8>,
    bottom_assets: Vec<u8>,
}

impl TemplateSet {
    pub fn new(root: Tree) -> Self {
        let mut trees = BTreeMap::new();
        let name = root.name.clone();
        trees.insert(name.clone(), root);
        Self {
            trees,
            root: name,
            content_type: "text/plain".to_string(),
            top_assets: Vec::new(),
            bottom_assets: Vec::new(),
        }
    }

    /// Add a template, replacing one with the same name.
    pub fn add(&mut self, tree: Tree) {
        self.trees.insert(tree.name.clone(), tree);
    }

    pub fn with_template(mut self, tree: Tree) -> Self {
        self.add(tree);
        self
    }

    /// Content type of the rendered output. HTML templates get the newline
    /// left by their header line removed.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Bytes emitted at `render_top_assets`.
    pub fn with_top_assets(mut self, assets: impl Into<Vec<u8>>) -> Self {
        self.top_assets = assets.into();
        self
    }

    /// Bytes emitted at `render_bottom_assets`.
    pub fn with_bottom_assets(mut self, assets: impl Into<Vec<u8>>) -> Self {
        self.bottom_assets = assets.into();
        self
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn top_assets(&self) -> &[u8] {
        &self.top_assets
    }

    pub fn bottom_assets(&self) -> &[u8] {
        &self.bottom_assets
    }

    pub fn get(&self, name: &str) -> Option<&Tree> {
        self.trees.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.trees.contains_key(name)
    }

    /// Templates in name order.
    pub fn trees(&self) -> impl Iterator<Item = (&String, &Tree)> {
        self.trees.iter()
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }
}
