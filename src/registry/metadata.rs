use std::collections::{BTreeSet, HashMap};

use indexmap::IndexMap;

use crate::hint::ClassHierarchy;
use crate::value::{ClassName, Value};

/// Static per-type presentation and construction hints.
#[derive(Debug, Clone, Default)]
pub struct ClassMetadata {
    /// Constructor parameters never shown to the user.
    pub hidden_params: BTreeSet<String>,
    /// Hidden parameters re-added with these values right before construction.
    pub default_params_to_hide: IndexMap<String, Value>,
    /// Parameter name → runtime attribute name, where they differ.
    pub param_to_attribute: IndexMap<String, String>,
    /// The one attribute that holds "this type's children".
    pub children_attribute: Option<String>,
    pub add_action_label: Option<String>,
}

impl ClassMetadata {
    pub fn hide(mut self, param: impl Into<String>) -> Self {
        self.hidden_params.insert(param.into());
        self
    }

    pub fn hide_with_default(mut self, param: impl Into<String>, value: Value) -> Self {
        self.default_params_to_hide.insert(param.into(), value);
        self
    }

    pub fn attribute(mut self, param: impl Into<String>, attribute: impl Into<String>) -> Self {
        self.param_to_attribute.insert(param.into(), attribute.into());
        self
    }

    pub fn children(mut self, attribute: impl Into<String>) -> Self {
        self.children_attribute = Some(attribute.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.add_action_label = Some(label.into());
        self
    }

    /// Whether `param` is kept out of user-facing forms.
    pub fn is_hidden(&self, param: &str) -> bool {
        self.hidden_params.contains(param) || self.default_params_to_hide.contains_key(param)
    }

    /// Runtime attribute name for `param`.
    pub fn attribute_for<'a>(&'a self, param: &'a str) -> &'a str {
        self.param_to_attribute
            .get(param)
            .map(String::as_str)
            .unwrap_or(param)
    }

    pub fn is_neutral(&self) -> bool {
        self.hidden_params.is_empty()
            && self.default_params_to_hide.is_empty()
            && self.param_to_attribute.is_empty()
            && self.children_attribute.is_none()
            && self.add_action_label.is_none()
    }
}

/// Metadata table keyed by class; the nearest registered ancestor wins.
#[derive(Debug, Default)]
pub struct ClassMetadataRegistry {
    entries: HashMap<ClassName, ClassMetadata>,
    neutral: ClassMetadata,
}

impl ClassMetadataRegistry {
    pub(crate) fn insert(&mut self, class: ClassName, metadata: ClassMetadata) {
        self.entries.insert(class, metadata);
    }

    pub fn contains(&self, class: &ClassName) -> bool {
        self.entries.contains_key(class)
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassName> {
        self.entries.keys()
    }

    /// Metadata for `class`, inherited from the nearest ancestor that has an
    /// entry. Classes without any entry get neutral metadata.
    pub fn lookup(&self, class: &ClassName, hierarchy: &dyn ClassHierarchy) -> &ClassMetadata {
        hierarchy
            .lineage(class)
            .iter()
            .find_map(|c| self.entries.get(c))
            .unwrap_or(&self.neutral)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hint::Flat;

    struct TwoLevels;

    impl ClassHierarchy for TwoLevels {
        fn lineage(&self, class: &ClassName) -> Vec<ClassName> {
            match class.as_str() {
                "Leaf" => vec!["Leaf".into(), "Middle".into(), "Root".into()],
                "Middle" => vec!["Middle".into(), "Root".into()],
                other => vec![other.into()],
            }
        }
    }

    #[test]
    fn nearest_ancestor_wins() {
        let mut reg = ClassMetadataRegistry::default();
        reg.insert("Root".into(), ClassMetadata::default().label("root"));
        reg.insert("Middle".into(), ClassMetadata::default().label("middle"));
        let leaf = reg.lookup(&"Leaf".into(), &TwoLevels);
        assert_eq!(leaf.add_action_label.as_deref(), Some("middle"));
        let root = reg.lookup(&"Root".into(), &TwoLevels);
        assert_eq!(root.add_action_label.as_deref(), Some("root"));
    }

    #[test]
    fn missing_entries_are_neutral() {
        let reg = ClassMetadataRegistry::default();
        let meta = reg.lookup(&"Unknown".into(), &Flat);
        assert!(meta.is_neutral());
        assert_eq!(meta.attribute_for("id_"), "id_");
    }

    #[test]
    fn hidden_defaults_count_as_hidden() {
        let meta = ClassMetadata::default()
            .hide("parent")
            .hide_with_default("kind", Value::str("Instance"))
            .attribute("id_", "id");
        assert!(meta.is_hidden("parent"));
        assert!(meta.is_hidden("kind"));
        assert!(!meta.is_hidden("id_"));
        assert_eq!(meta.attribute_for("id_"), "id");
    }
}
