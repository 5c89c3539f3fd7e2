//! A lazily populated tree over a live object graph.
//!
//! Nodes hold a location (the slots leading from the root to the value), never
//! the value itself; [`TreeModel::current_value`] re-reads the graph on every
//! call. Children are created on expansion and thrown away on collapse or
//! when a mutation touches the node, so they cannot go stale.
//!
//! All mutation goes through [`TreeModel::set_value`], [`TreeModel::add_child`]
//! and [`TreeModel::clear`], each validated before anything is written and
//! each recorded in the bounded [`UndoLog`]. Attributes of objects whose class
//! cannot be introspected are shown read-only.
pub mod undo;

use std::fmt::Write as _;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::hint::{self, TypeDescriptor};
use crate::introspect::{self, IntrospectOptions};
use crate::registry::Registry;
use crate::value::{self, ObjectRef, Slot, Value};

pub use undo::{UndoEntry, UndoKind, UndoLog};

/// Valid until its node is discarded; the ids of discarded nodes are reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Why a node cannot be edited.
#[derive(Debug, Clone)]
struct ReadOnly {
    class: String,
    reason: String,
}

impl ReadOnly {
    fn error(&self) -> Error {
        Error::introspection(&self.class, self.reason.clone())
    }
}

#[derive(Debug)]
struct Node {
    path: Vec<Slot>,
    declared: TypeDescriptor,
    read_only: Option<ReadOnly>,
    /// `None` while unpopulated.
    children: Option<Vec<NodeId>>,
}

struct ChildSpec {
    slot: Slot,
    declared: TypeDescriptor,
    read_only: Option<ReadOnly>,
}

pub struct TreeModel<'r> {
    registry: &'r Registry,
    root: Value,
    nodes: Vec<Option<Node>>,
    /// Vacated `nodes` slots, reused before the arena grows.
    free: Vec<usize>,
    log: UndoLog,
}

/// `$.parts[2].name` style rendering of a location.
pub fn render_path(path: &[Slot]) -> String {
    let mut out = String::from("$");
    for slot in path {
        match slot {
            Slot::Attr(name) => {
                let _ = write!(out, ".{name}");
            }
            Slot::Index(i) => {
                let _ = write!(out, "[{i}]");
            }
        }
    }
    out
}

fn invalid(path: &[Slot]) -> Error {
    Error::InvalidPath { path: render_path(path) }
}

fn step(value: &Value, slot: &Slot) -> Option<Value> {
    match (value, slot) {
        (Value::Object(o), Slot::Attr(name)) => o.get(name),
        (_, Slot::Index(i)) => value.element(*i),
        _ => None,
    }
}

/// Descends through plain collections only; objects are reached by attribute
/// through their own handle.
fn descend_mut<R>(value: &mut Value, path: &[Slot], f: impl FnOnce(&mut Value) -> R) -> Option<R> {
    let Some((slot, rest)) = path.split_first() else {
        return Some(f(value));
    };
    match (value, slot) {
        (Value::List(xs) | Value::Set(xs), Slot::Index(i)) => descend_mut(xs.get_mut(*i)?, rest, f),
        (Value::Dict(entries), Slot::Index(i)) => {
            let entry = entries.get_mut(*i)?;
            match rest.split_first() {
                None => {
                    let mut pair = Value::List(vec![entry.0.clone(), entry.1.clone()]);
                    let out = f(&mut pair);
                    if let Value::List(mut kv) = pair {
                        if kv.len() == 2 {
                            entry.1 = kv.pop()?;
                            entry.0 = kv.pop()?;
                        }
                    }
                    Some(out)
                }
                Some((Slot::Index(0), rest)) => descend_mut(&mut entry.0, rest, f),
                Some((Slot::Index(1), rest)) => descend_mut(&mut entry.1, rest, f),
                Some(_) => None,
            }
        }
        _ => None,
    }
}

impl<'r> TreeModel<'r> {
    pub fn new(root: Value, declared: TypeDescriptor, registry: &'r Registry, config: &EngineConfig) -> Self {
        let root_node = Node { path: Vec::new(), declared, read_only: None, children: None };
        Self {
            registry,
            root,
            nodes: vec![Some(root_node)],
            free: Vec::new(),
            log: UndoLog::new(config.max_undos),
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn root_value(&self) -> &Value {
        &self.root
    }

    pub fn undo_log(&self) -> &UndoLog {
        &self.log
    }

    // ————————————————————————————————————————————————————————————————————————
    // NODES
    // ————————————————————————————————————————————————————————————————————————

    fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| Error::InvalidPath { path: format!("node #{}", id.0) })
    }

    fn node_parts(&self, id: NodeId) -> Result<(Vec<Slot>, TypeDescriptor)> {
        let node = self.node(id)?;
        Ok((node.path.clone(), node.declared.clone()))
    }

    /// Like [`Self::node_parts`], failing for read-only nodes.
    fn writable_parts(&self, id: NodeId) -> Result<(Vec<Slot>, TypeDescriptor)> {
        let node = self.node(id)?;
        match &node.read_only {
            Some(read_only) => Err(read_only.error()),
            None => Ok((node.path.clone(), node.declared.clone())),
        }
    }

    pub fn is_read_only(&self, id: NodeId) -> bool {
        self.node(id).is_ok_and(|n| n.read_only.is_some())
    }

    pub fn path(&self, id: NodeId) -> Result<&[Slot]> {
        Ok(&self.node(id)?.path)
    }

    pub fn declared_type(&self, id: NodeId) -> Result<&TypeDescriptor> {
        Ok(&self.node(id)?.declared)
    }

    /// The value at the node's location, read from the graph now.
    pub fn current_value(&self, id: NodeId) -> Result<Value> {
        self.resolve(&self.node(id)?.path)
    }

    pub fn resolve(&self, path: &[Slot]) -> Result<Value> {
        let mut current = self.root.clone();
        for slot in path {
            current = step(&current, slot).ok_or_else(|| invalid(path))?;
        }
        Ok(current)
    }

    pub fn is_populated(&self, id: NodeId) -> bool {
        self.node(id).is_ok_and(|n| n.children.is_some())
    }

    pub fn children(&self, id: NodeId) -> Option<&[NodeId]> {
        self.node(id).ok()?.children.as_deref()
    }

    /// The live node at `path`, if one is currently populated.
    pub fn find(&self, path: &[Slot]) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.as_ref().is_some_and(|n| n.path == path))
            .map(NodeId)
    }

    /// (Re)populates the node's children from the live graph.
    pub fn expand(&mut self, id: NodeId) -> Result<Vec<NodeId>> {
        let (path, declared) = self.node_parts(id)?;
        let inherited = self.node(id)?.read_only.clone();
        let value = self.resolve(&path)?;
        self.discard_children(id);
        let mut ids = Vec::new();
        for spec in self.child_specs(&value, &declared) {
            let mut child_path = path.clone();
            child_path.push(spec.slot);
            let read_only = inherited.clone().or(spec.read_only);
            ids.push(self.alloc(Node { path: child_path, declared: spec.declared, read_only, children: None }));
        }
        tracing::debug!(path = %render_path(&path), children = ids.len(), "populated node");
        if let Some(Some(node)) = self.nodes.get_mut(id.0) {
            node.children = Some(ids.clone());
        }
        Ok(ids)
    }

    pub fn collapse(&mut self, id: NodeId) {
        self.discard_children(id);
        if let Some(Some(node)) = self.nodes.get_mut(id.0) {
            node.children = None;
        }
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(i) => {
                self.nodes[i] = Some(node);
                NodeId(i)
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        }
    }

    fn discard_children(&mut self, id: NodeId) {
        let children = self
            .nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .and_then(|n| n.children.take());
        for child in children.into_iter().flatten() {
            self.discard_children(child);
            if let Some(slot) = self.nodes.get_mut(child.0) {
                if slot.take().is_some() {
                    self.free.push(child.0);
                }
            }
        }
    }

    /// Collapses the populated node at `path`, if any.
    fn invalidate(&mut self, path: &[Slot]) {
        if let Some(id) = self.find(path) {
            self.collapse(id);
        }
    }

    fn child_specs(&self, value: &Value, declared: &TypeDescriptor) -> Vec<ChildSpec> {
        let writable = |slot, declared| ChildSpec { slot, declared, read_only: None };
        if let (TypeDescriptor::Pair(k, v), Value::List(kv)) = (hint::unwrap_optional(declared), value) {
            if kv.len() == 2 {
                return vec![
                    writable(Slot::Index(0), k.as_ref().clone()),
                    writable(Slot::Index(1), v.as_ref().clone()),
                ];
            }
        }
        match value {
            Value::Object(object) => {
                let class = object.class();
                let params = introspect::introspect(&class, self.registry, IntrospectOptions::all());
                object
                    .attr_names()
                    .into_iter()
                    .map(|attr| {
                        let param = match &params {
                            Ok(params) => params.iter().find(|p| p.mapped_attribute == attr).ok_or_else(|| {
                                format!("no constructor parameter sets attribute `{attr}`")
                            }),
                            Err(Error::Introspection { reason, .. }) => Err(reason.clone()),
                            Err(error) => Err(error.to_string()),
                        };
                        match param {
                            Ok(param) => writable(Slot::Attr(attr), param.ty.clone()),
                            Err(reason) => ChildSpec {
                                slot: Slot::Attr(attr),
                                declared: TypeDescriptor::Any,
                                read_only: Some(ReadOnly { class: class.to_string(), reason }),
                            },
                        }
                    })
                    .collect()
            }
            Value::List(xs) | Value::Set(xs) => {
                let item = self.registry.item_descriptor(declared).unwrap_or(TypeDescriptor::Any);
                (0..xs.len()).map(|i| writable(Slot::Index(i), item.clone())).collect()
            }
            Value::Dict(entries) => {
                let item = match self.registry.item_descriptor(declared) {
                    Ok(pair @ TypeDescriptor::Pair(..)) => pair,
                    _ => TypeDescriptor::Pair(Box::new(TypeDescriptor::Any), Box::new(TypeDescriptor::Any)),
                };
                (0..entries.len()).map(|i| writable(Slot::Index(i), item.clone())).collect()
            }
            _ => Vec::new(),
        }
    }

    // ————————————————————————————————————————————————————————————————————————
    // GRAPH ACCESS
    // ————————————————————————————————————————————————————————————————————————

    /// The deepest object whose attribute lies on `path`, with that attribute
    /// and its position. Fails if `path` does not resolve.
    fn locate(&self, path: &[Slot]) -> Result<Option<(ObjectRef, String, usize)>> {
        let mut split = None;
        let mut current = self.root.clone();
        for (i, slot) in path.iter().enumerate() {
            if let (Value::Object(o), Slot::Attr(name)) = (&current, slot) {
                split = Some((o.clone(), name.clone(), i));
            }
            current = step(&current, slot).ok_or_else(|| invalid(path))?;
        }
        Ok(split)
    }

    fn owner_of(&self, path: &[Slot]) -> Option<ObjectRef> {
        self.locate(path).ok().flatten().map(|(owner, ..)| owner)
    }

    fn edit_at<R>(&mut self, path: &[Slot], f: impl FnOnce(&mut Value) -> Result<R>) -> Result<R> {
        match self.locate(path)? {
            None => descend_mut(&mut self.root, path, f).ok_or_else(|| invalid(path))?,
            Some((owner, attr, i)) => owner
                .with_attr_mut(&attr, |v| descend_mut(v, &path[i + 1..], f))
                .flatten()
                .ok_or_else(|| invalid(path))?,
        }
    }

    fn replace_at(&mut self, path: &[Slot], value: Value) -> Result<Value> {
        self.edit_at(path, |slot| Ok(std::mem::replace(slot, value)))
    }

    fn insert_at(&mut self, path: &[Slot], value: Value) -> Result<()> {
        let Some((Slot::Index(i), parent)) = path.split_last() else {
            return Err(invalid(path));
        };
        let i = *i;
        self.edit_at(parent, |collection| match collection {
            Value::List(xs) if i <= xs.len() => {
                xs.insert(i, value);
                Ok(())
            }
            Value::Set(xs) if i <= xs.len() => {
                if !xs.contains(&value) {
                    xs.insert(i, value);
                }
                Ok(())
            }
            Value::Dict(entries) if i <= entries.len() => match value {
                Value::List(mut kv) if kv.len() == 2 => {
                    let v = kv.pop().unwrap_or(Value::None);
                    let k = kv.pop().unwrap_or(Value::None);
                    entries.insert(i, (k, v));
                    Ok(())
                }
                other => Err(Error::type_mismatch("a key-value pair", &other)),
            },
            _ => Err(invalid(path)),
        })
    }

    fn remove_at(&mut self, path: &[Slot]) -> Result<Value> {
        let Some((Slot::Index(i), parent)) = path.split_last() else {
            return Err(invalid(path));
        };
        let i = *i;
        self.edit_at(parent, |collection| match collection {
            Value::List(xs) | Value::Set(xs) if i < xs.len() => Ok(xs.remove(i)),
            Value::Dict(entries) if i < entries.len() => {
                let (k, v) = entries.remove(i);
                Ok(Value::List(vec![k, v]))
            }
            _ => Err(invalid(path)),
        })
    }

    /// Whether `path` names an element slot of a list, set or dict (which may
    /// be one past the end). Key and value slots of a dict entry are not.
    fn is_element_slot(&self, path: &[Slot]) -> bool {
        let Some((Slot::Index(_), parent)) = path.split_last() else {
            return false;
        };
        if !self.resolve(parent).is_ok_and(|v| v.is_collection()) {
            return false;
        }
        match parent.split_last() {
            Some((Slot::Index(_), grandparent)) => !matches!(self.resolve(grandparent), Ok(Value::Dict(_))),
            _ => true,
        }
    }

    fn item_type(&self, declared: &TypeDescriptor) -> Result<TypeDescriptor> {
        match self.registry.item_descriptor(declared) {
            Ok(item) => Ok(item),
            Err(Error::TypeMismatch { .. } | Error::AmbiguousArity { .. }) => Ok(TypeDescriptor::Any),
            Err(error) => Err(error),
        }
    }

    fn default_for(&self, path: &[Slot]) -> Result<Value> {
        let no_default = || Error::NoDefaultValue { location: render_path(path) };
        let Some((Slot::Attr(attr), parent)) = path.split_last() else {
            return Err(no_default());
        };
        let Value::Object(owner) = self.resolve(parent)? else {
            return Err(no_default());
        };
        let class = owner.class();
        let params = introspect::introspect(&class, self.registry, IntrospectOptions::all())?;
        let param = params
            .iter()
            .find(|p| &p.mapped_attribute == attr)
            .ok_or_else(no_default)?;
        if let Some(default) = &param.default_value {
            return Ok(default.clone());
        }
        if let Some(default) = self.registry.lookup_metadata(&class).default_params_to_hide.get(&param.name) {
            return Ok(default.clone());
        }
        if param.ty.accepts_none() {
            return Ok(Value::None);
        }
        Err(no_default())
    }

    // ————————————————————————————————————————————————————————————————————————
    // USER OPERATIONS
    // ————————————————————————————————————————————————————————————————————————

    /// Assigns `value` at the node after checking it against the declared type.
    /// A set element cannot be made equal to one of its siblings.
    pub fn set_value(&mut self, id: NodeId, value: Value) -> Result<()> {
        let (path, declared) = self.writable_parts(id)?;
        if !hint::is_of_type(&value, &declared, self.registry) {
            return Err(Error::type_mismatch(declared.display_name(), &value));
        }
        if let Some((Slot::Index(i), parent)) = path.split_last() {
            if let Ok(Value::Set(xs)) = self.resolve(parent) {
                if xs.iter().enumerate().any(|(j, x)| j != *i && *x == value) {
                    return Err(Error::DuplicateElement { path: render_path(&path) });
                }
            }
        }
        let old = self.replace_at(&path, value.clone())?;
        value::detach(&old);
        if let Some(owner) = self.owner_of(&path) {
            value::adopt(&owner, &value);
        }
        tracing::debug!(path = %render_path(&path), "edited value");
        self.log.record(UndoEntry { location: path, previous_value: Some(old), kind: UndoKind::Edit });
        self.collapse(id);
        Ok(())
    }

    /// Adds `value` under the node: appended to the class's children
    /// attribute or to the node's own collection, else assigned to the node.
    /// Returns the location the value ended up at.
    pub fn add_child(&mut self, parent: NodeId, value: Value) -> Result<Vec<Slot>> {
        let (path, declared) = self.writable_parts(parent)?;
        let current = self.resolve(&path)?;
        let collection = match &current {
            Value::Object(object) => {
                let class = object.class();
                match self.registry.lookup_metadata(&class).children_attribute.clone() {
                    Some(attr) => {
                        let item = self.registry.item_descriptor(&TypeDescriptor::Class(class))?;
                        let mut collection_path = path.clone();
                        collection_path.push(Slot::Attr(attr));
                        Some((collection_path, item))
                    }
                    None => None,
                }
            }
            v if v.is_collection() => Some((path.clone(), self.item_type(&declared)?)),
            _ => None,
        };

        let Some((collection_path, item)) = collection else {
            if !hint::is_of_type(&value, &declared, self.registry) {
                return Err(Error::type_mismatch(declared.display_name(), &value));
            }
            let old = self.replace_at(&path, value.clone())?;
            value::detach(&old);
            if let Some(owner) = self.owner_of(&path) {
                value::adopt(&owner, &value);
            }
            // Recorded as an edit: replaying it must replace, never insert.
            self.log.record(UndoEntry { location: path.clone(), previous_value: Some(old), kind: UndoKind::Edit });
            self.collapse(parent);
            return Ok(path);
        };

        if !hint::is_of_type(&value, &item, self.registry) {
            return Err(Error::type_mismatch(item.display_name(), &value));
        }
        let existing = self.resolve(&collection_path)?;
        if let Value::Set(xs) = &existing {
            if let Some(i) = xs.iter().position(|x| *x == value) {
                let mut location = collection_path;
                location.push(Slot::Index(i));
                return Ok(location);
            }
        }
        let index = existing.len().ok_or_else(|| invalid(&collection_path))?;
        let mut location = collection_path.clone();
        location.push(Slot::Index(index));
        self.insert_at(&location, value.clone())?;
        if let Some(owner) = self.owner_of(&collection_path) {
            value::adopt(&owner, &value);
        }
        tracing::debug!(path = %render_path(&location), "added child");
        self.log.record(UndoEntry { location: location.clone(), previous_value: None, kind: UndoKind::Add });
        self.invalidate(&collection_path);
        self.collapse(parent);
        Ok(location)
    }

    /// Removes a collection element, or resets an attribute to its registered
    /// default.
    pub fn clear(&mut self, id: NodeId) -> Result<()> {
        let (path, _) = self.writable_parts(id)?;
        let Some((_, parent)) = path.split_last() else {
            return Err(invalid(&path));
        };
        let parent = parent.to_vec();
        let previous = if self.is_element_slot(&path) {
            let removed = self.remove_at(&path)?;
            value::detach(&removed);
            self.invalidate(&parent);
            removed
        } else {
            let default = self.default_for(&path)?;
            let old = self.replace_at(&path, default.clone())?;
            value::detach(&old);
            if let Some(owner) = self.owner_of(&path) {
                value::adopt(&owner, &default);
            }
            self.collapse(id);
            old
        };
        tracing::debug!(path = %render_path(&path), "cleared value");
        self.log.record(UndoEntry { location: path, previous_value: Some(previous), kind: UndoKind::Clear });
        Ok(())
    }

    /// Reverts the most recent operation. `false` when there is nothing to undo.
    pub fn undo(&mut self) -> Result<bool> {
        let Some(entry) = self.log.pop_undo() else {
            return Ok(false);
        };
        match self.replay(&entry) {
            Ok(inverse) => {
                self.log.push_redo(inverse);
                Ok(true)
            }
            Err(error) => {
                self.log.push_undo(entry);
                Err(error)
            }
        }
    }

    /// Re-applies the most recently undone operation. `false` when there is
    /// nothing to redo.
    pub fn redo(&mut self) -> Result<bool> {
        let Some(entry) = self.log.pop_redo() else {
            return Ok(false);
        };
        match self.replay(&entry) {
            Ok(inverse) => {
                self.log.push_undo(inverse);
                Ok(true)
            }
            Err(error) => {
                self.log.push_redo(entry);
                Err(error)
            }
        }
    }

    /// Restores `entry.previous_value` at its location and returns the entry
    /// that restores the state just replaced.
    fn replay(&mut self, entry: &UndoEntry) -> Result<UndoEntry> {
        let location = entry.location.as_slice();
        let parent = location.split_last().map_or(&[][..], |(_, p)| p).to_vec();
        let element = entry.kind != UndoKind::Edit && self.is_element_slot(location);
        let previous = match (&entry.previous_value, element) {
            (Some(v), true) => {
                self.insert_at(location, v.clone())?;
                if let Some(owner) = self.owner_of(&parent) {
                    value::adopt(&owner, v);
                }
                None
            }
            (None, true) => {
                let removed = self.remove_at(location)?;
                value::detach(&removed);
                Some(removed)
            }
            (Some(v), false) => {
                let old = self.replace_at(location, v.clone())?;
                value::detach(&old);
                if let Some(owner) = self.owner_of(location) {
                    value::adopt(&owner, v);
                }
                Some(old)
            }
            (None, false) => return Err(invalid(location)),
        };
        tracing::debug!(kind = ?entry.kind, path = %render_path(location), "replayed undo entry");
        if element {
            self.invalidate(&parent);
        } else {
            self.invalidate(location);
        }
        Ok(UndoEntry { location: location.to_vec(), previous_value: previous, kind: entry.kind })
    }
}
