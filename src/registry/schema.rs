//! JSON registry files: a declarative way to populate a [`Registry`] for
//! domain classes that are plain records.
//!
//! ```json
//! {
//!   "enums": { "Status": ["Draft", "Released"] },
//!   "classes": [
//!     { "name": "Element", "abstract": true, "params": [{ "name": "id_short", "type": "Str" }] },
//!     { "name": "Property", "parent": "Element", "params": [
//!         { "name": "id_short", "type": "Str" },
//!         { "name": "value", "type": "Optional[Str]", "default": null }
//!     ] }
//!   ],
//!   "metadata": { "Element": { "hidden": ["parent"], "add_label": "Add element" } },
//!   "default_items": { "list": "Str" }
//! }
//! ```
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};

use super::{ClassDef, ClassMetadata, DeclaredParam, Registry};
use crate::error::{Error, Result};
use crate::hint::{self, ContainerKind, EnumType, Flat, TypeDescriptor};
use crate::path_de;
use crate::value::Value;

// ————————————————————————————————————————————————————————————————————————————
// FILE FORMAT
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryFile {
    #[serde(default)]
    pub enums: IndexMap<String, Vec<String>>,
    #[serde(default)]
    pub classes: Vec<ClassEntry>,
    #[serde(default)]
    pub metadata: IndexMap<String, MetadataEntry>,
    /// Container kind (`list`, `set`, `dict`) → item type text.
    #[serde(default)]
    pub default_items: IndexMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassEntry {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default)]
    pub opaque: bool,
    #[serde(default)]
    pub params: Vec<ParamEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParamEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    /// `None` when the key is absent; `Some(Null)` for an explicit `null` default.
    #[serde(default, deserialize_with = "present")]
    pub default: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetadataEntry {
    #[serde(default)]
    pub hidden: Vec<String>,
    #[serde(default)]
    pub hidden_defaults: IndexMap<String, serde_json::Value>,
    #[serde(default)]
    pub attributes: IndexMap<String, String>,
    #[serde(default)]
    pub children: Option<String>,
    #[serde(default)]
    pub add_label: Option<String>,
}

fn present<'de, D: Deserializer<'de>>(de: D) -> Result<Option<serde_json::Value>, D::Error> {
    serde_json::Value::deserialize(de).map(Some)
}

// ————————————————————————————————————————————————————————————————————————————
// LOADING
// ————————————————————————————————————————————————————————————————————————————

impl RegistryFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        path_de::from_file_with_path(path)
    }

    pub fn parse(src: &str) -> Result<Self> {
        path_de::from_str_with_path(src)
    }

    pub fn into_registry(self) -> Result<Registry> {
        let mut builder = Registry::builder();
        for (name, variants) in &self.enums {
            let variants: Vec<&str> = variants.iter().map(String::as_str).collect();
            builder = builder.enumeration(name.clone(), &variants);
        }

        let mut declared: IndexMap<String, Vec<DeclaredParam>> = IndexMap::new();
        for entry in &self.classes {
            let params = entry
                .params
                .iter()
                .map(|p| declared_param(&entry.name, p, builder.enums()))
                .collect::<Result<Vec<_>>>()?;
            declared.insert(entry.name.clone(), params.clone());
            builder = builder.class(class_def(entry, params));
        }

        for (class, entry) in self.metadata {
            let params = declared.get(&class).map(Vec::as_slice).unwrap_or_default();
            builder = builder.metadata(class.as_str(), metadata(&class, entry, params)?);
        }

        for (kind, text) in &self.default_items {
            let kind = container_kind(kind)?;
            let item = hint::parse_descriptor(text, builder.enums())?;
            builder = builder.default_item(kind, item);
        }
        builder.build()
    }
}

/// Loads and builds a registry from a JSON file.
pub fn load_registry(path: impl AsRef<Path>) -> Result<Registry> {
    RegistryFile::load(path)?.into_registry()
}

fn declared_param(
    class: &str,
    entry: &ParamEntry,
    enums: &IndexMap<String, EnumType>,
) -> Result<DeclaredParam> {
    let ty = hint::parse_descriptor(&entry.ty, enums)?;
    let default = match &entry.default {
        None => None,
        Some(json) => Some(cast_default(class, &entry.name, json, &ty)?),
    };
    Ok(DeclaredParam { name: entry.name.clone(), ty, default })
}

fn cast_default(class: &str, param: &str, json: &serde_json::Value, ty: &TypeDescriptor) -> Result<Value> {
    // defaults are plain data; no class instances are involved
    hint::typecast(Value::from_json(json), ty, &Flat).map_err(|failure| {
        Error::Registry(format!("default of `{class}.{param}`: {}", failure.error))
    })
}

fn class_def(entry: &ClassEntry, params: Vec<DeclaredParam>) -> ClassDef {
    let mut def = if entry.opaque {
        ClassDef::opaque(entry.name.as_str())
    } else {
        ClassDef::new(entry.name.as_str())
    };
    if let Some(parent) = &entry.parent {
        def = def.extends(parent.as_str());
    }
    if entry.is_abstract {
        def = def.abstract_();
    }
    for p in params {
        def = match p.default {
            Some(default) => def.param_default(p.name, p.ty, default),
            None => def.param(p.name, p.ty),
        };
    }
    def
}

fn metadata(class: &str, entry: MetadataEntry, params: &[DeclaredParam]) -> Result<ClassMetadata> {
    let mut meta = ClassMetadata::default();
    for name in entry.hidden {
        meta = meta.hide(name);
    }
    for (name, json) in entry.hidden_defaults {
        let value = match params.iter().find(|p| p.name == name) {
            Some(p) => cast_default(class, &name, &json, &p.ty)?,
            None => Value::from_json(&json),
        };
        meta = meta.hide_with_default(name, value);
    }
    for (param, attribute) in entry.attributes {
        meta = meta.attribute(param, attribute);
    }
    if let Some(children) = entry.children {
        meta = meta.children(children);
    }
    if let Some(label) = entry.add_label {
        meta = meta.label(label);
    }
    Ok(meta)
}

fn container_kind(text: &str) -> Result<ContainerKind> {
    match text {
        "list" => Ok(ContainerKind::List),
        "set" => Ok(ContainerKind::Set),
        "dict" => Ok(ContainerKind::Dict),
        other => Err(Error::Registry(format!("unknown container kind `{other}`"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hint::ClassHierarchy;
    use crate::value::ClassName;

    const SRC: &str = r#"{
        "enums": { "Status": ["Draft", "Released"] },
        "classes": [
            { "name": "Element", "abstract": true, "params": [{ "name": "id_short", "type": "Str" }] },
            { "name": "Property", "parent": "Element", "params": [
                { "name": "id_short", "type": "Str" },
                { "name": "value", "type": "Optional[Str]", "default": null },
                { "name": "status", "type": "Status", "default": "draft" },
                { "name": "count", "type": "Int", "default": "3" }
            ] }
        ],
        "metadata": { "Element": { "hidden": ["parent"], "add_label": "Add element" } },
        "default_items": { "list": "Str" }
    }"#;

    #[test]
    fn loads_classes_enums_and_metadata() {
        let reg = RegistryFile::parse(SRC).unwrap().into_registry().unwrap();
        assert!(reg.is_subclass(&"Property".into(), &"Element".into()));
        assert!(reg.class(&ClassName::new("Element")).unwrap().is_abstract());
        assert_eq!(reg.add_action_label(&"Property".into()), "Add element");
        assert_eq!(reg.default_item(ContainerKind::List), Some(&TypeDescriptor::string()));

        let sig = reg.class(&"Property".into()).unwrap().signature().unwrap();
        assert_eq!(sig[1].default, Some(Value::None), "explicit null is a default");
        assert_eq!(sig[0].default, None, "absent key is no default");
        assert_eq!(sig[2].default, Some(Value::Enum(crate::value::EnumValue::new("Status", "Draft"))));
        assert_eq!(sig[3].default, Some(Value::Int(3)));
    }

    #[test]
    fn unknown_fields_report_their_path() {
        let err = RegistryFile::parse(r#"{"classes": [{"name": "A", "bogus": 1}]}"#).unwrap_err();
        match err {
            Error::JsonPath { path, .. } => assert!(path.starts_with("classes[0]"), "{path}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn bad_defaults_are_registry_errors() {
        let src = r#"{"classes": [{"name": "A", "params": [{"name": "n", "type": "Int", "default": "x"}]}]}"#;
        let err = RegistryFile::parse(src).unwrap().into_registry().unwrap_err();
        assert!(matches!(err, Error::Registry(_)));
    }
}
