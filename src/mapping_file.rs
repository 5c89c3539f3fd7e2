//! The column-mapping file: a flat JSON object from canonical
//! [`ObjectReference`] text to the output of [`PreObject::extract_mapping`].
//!
//! [`PreObject::extract_mapping`]: crate::preobject::PreObject::extract_mapping
pub mod reference;

use std::path::Path;

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::path_de;

pub use reference::{Key, ObjectReference, ReferenceKind};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingFile {
    entries: IndexMap<ObjectReference, serde_json::Value>,
}

impl MappingFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, reference: ObjectReference, mapping: serde_json::Value) -> Option<serde_json::Value> {
        self.entries.insert(reference, mapping)
    }

    pub fn get(&self, reference: &ObjectReference) -> Option<&serde_json::Value> {
        self.entries.get(reference)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ObjectReference, &serde_json::Value)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn parse(src: &str) -> Result<Self> {
        let raw: IndexMap<String, serde_json::Value> = path_de::from_str_with_path(src)?;
        Self::from_raw(raw)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw: IndexMap<String, serde_json::Value> = path_de::from_file_with_path(path.as_ref())?;
        let file = Self::from_raw(raw)?;
        tracing::debug!(path = %path.as_ref().display(), entries = file.len(), "loaded mapping file");
        Ok(file)
    }

    fn from_raw(raw: IndexMap<String, serde_json::Value>) -> Result<Self> {
        let mut entries = IndexMap::with_capacity(raw.len());
        for (key, mapping) in raw {
            if !mapping.is_object() {
                return Err(Error::JsonPath {
                    path: key,
                    message: "mapping must be a JSON object".into(),
                });
            }
            entries.insert(ObjectReference::parse(&key)?, mapping);
        }
        Ok(Self { entries })
    }

    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .entries
            .iter()
            .map(|(reference, mapping)| (reference.to_string(), mapping.clone()))
            .collect();
        serde_json::Value::Object(map)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = serde_json::to_string_pretty(&self.to_json())?;
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_round_trip_keeps_entries() {
        let mut file = MappingFile::new();
        let reference = ObjectReference::model("Property", vec![Key::new("Submodel", "urn:sm")]);
        file.insert(reference.clone(), json!({"value": "$B$"}));
        let text = serde_json::to_string(&file.to_json()).unwrap();
        let parsed = MappingFile::parse(&text).unwrap();
        assert_eq!(parsed, file);
        assert_eq!(parsed.get(&reference), Some(&json!({"value": "$B$"})));
    }

    #[test]
    fn keys_outside_the_grammar_are_rejected() {
        let err = MappingFile::parse(r#"{"os.system(\"rm\")": {}}"#).unwrap_err();
        assert!(matches!(err, Error::ReferenceSyntax { .. }));
    }

    #[test]
    fn non_object_mappings_are_rejected() {
        let src = r#"{"ModelReference(type=A, key=())": "$A$"}"#;
        assert!(matches!(MappingFile::parse(src), Err(Error::JsonPath { .. })));
    }
}
