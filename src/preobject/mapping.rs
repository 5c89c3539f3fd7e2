//! Column mappings: the placeholder leaves of a pre-object as nested JSON.
//!
//! Keyword children are keyed by parameter name, positional children by their
//! decimal index. Only paths that end in a placeholder string are extracted.
use serde_json::{Map, Value as Json};

use super::{PreObject, Target};
use crate::error::{Error, Result};
use crate::introspect::{self, IntrospectOptions};
use crate::placeholder;
use crate::registry::Registry;
use crate::value::Value;

impl PreObject {
    /// Nested JSON object of every placeholder leaf; `{}` when there is none.
    pub fn extract_mapping(&self) -> Json {
        extract(self).unwrap_or_else(|| Json::Object(Map::new()))
    }

    /// Writes each string leaf of `mapping` into the matching path, replacing
    /// or inserting a literal. Intermediate nodes must already exist.
    ///
    /// Keyword keys must name a visible parameter of the target class and are
    /// stored under its canonical name; containers and pairs only take
    /// positional indices.
    pub fn apply_mapping(&mut self, mapping: &Json, registry: &Registry) -> Result<()> {
        let Json::Object(entries) = mapping else {
            return Err(Error::TypeMismatch { expected: "mapping object".into(), found: json_kind(mapping).into() });
        };
        for (key, sub) in entries {
            apply_entry(self, key, sub, registry)?;
        }
        Ok(())
    }
}

fn extract(pre: &PreObject) -> Option<Json> {
    match pre {
        PreObject::Literal(Value::Str(s)) if placeholder::is_placeholder(s) => Some(Json::String(s.clone())),
        PreObject::Pending { positional, keyword, .. } => {
            let mut out = Map::new();
            for (i, child) in positional.iter().enumerate() {
                if let Some(sub) = extract(child) {
                    out.insert(i.to_string(), sub);
                }
            }
            for (name, child) in keyword {
                if let Some(sub) = extract(child) {
                    out.insert(name.clone(), sub);
                }
            }
            (!out.is_empty()).then_some(Json::Object(out))
        }
        _ => None,
    }
}

/// Where a mapping key points inside a pending pre-object.
enum Key {
    Index(usize),
    Param(String),
}

fn resolve_key(target: &Target, key: &str, registry: &Registry) -> Option<Result<Key>> {
    if let Ok(i) = key.parse::<usize>() {
        return Some(Ok(Key::Index(i)));
    }
    let Target::Class(class) = target else {
        return None;
    };
    let params = match introspect::introspect(class, registry, IntrospectOptions::default()) {
        Ok(params) => params,
        Err(error) => return Some(Err(error)),
    };
    introspect::find_param(&params, key).map(|p| Ok(Key::Param(p.name.clone())))
}

fn apply_entry(pre: &mut PreObject, key: &str, sub: &Json, registry: &Registry) -> Result<()> {
    let owner = pre.target().map(ToString::to_string).unwrap_or_else(|| "value".into());
    let unknown = || Error::UnknownParameter { class: owner.clone(), param: key.to_string() };
    let PreObject::Pending { target, positional, keyword } = pre else {
        return Err(unknown());
    };
    let resolved = resolve_key(target, key, registry).ok_or_else(unknown)??;
    match sub {
        Json::String(text) => {
            let leaf = PreObject::Literal(Value::str(text.as_str()));
            match resolved {
                Key::Index(i) => *positional.get_mut(i).ok_or_else(unknown)? = leaf,
                Key::Param(name) => {
                    keyword.insert(name, leaf);
                }
            }
            Ok(())
        }
        Json::Object(_) => {
            let child = match resolved {
                Key::Index(i) => positional.get_mut(i),
                Key::Param(name) => keyword.get_mut(&name),
            };
            match child {
                Some(child) if child.is_pending() => child.apply_mapping(sub, registry),
                _ => Err(unknown()),
            }
        }
        other => Err(Error::TypeMismatch {
            expected: format!("placeholder string at `{key}`"),
            found: json_kind(other).into(),
        }),
    }
}

fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}
