//! Runtime values judged by the type algebra.
//!
//! Everything is plain owned data except [`ObjectRef`], a shared handle into
//! the live, mutable object graph. Objects point back at their owner through a
//! weak reference only; the owner holds the strong edge.

use std::cell::{Ref, RefCell};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use chrono::{NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use serde_json::json;

// ————————————————————————————————————————————————————————————————————————————
// NAMES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassName(String);

impl ClassName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClassName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClassName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ClassName {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumValue {
    pub enum_name: String,
    pub variant: String,
}

impl EnumValue {
    pub fn new(enum_name: impl Into<String>, variant: impl Into<String>) -> Self {
        Self { enum_name: enum_name.into(), variant: variant.into() }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// VALUE
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    Str(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Enum(EnumValue),
    List(Vec<Value>),
    /// Insertion ordered; [`Value::set_insert`] keeps it free of duplicates.
    Set(Vec<Value>),
    Dict(Vec<(Value, Value)>),
    Object(ObjectRef),
    /// A class handle, the value of a `TypeOf` parameter.
    Class(ClassName),
}

/// One step into a value: an attribute of an object or an element index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Slot {
    Attr(String),
    Index(usize),
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Attr(name) => f.write_str(name),
            Slot::Index(i) => write!(f, "[{i}]"),
        }
    }
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }
    pub fn float(f: f64) -> Self {
        Value::Float(OrderedFloat(f))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Value::List(_) | Value::Set(_) | Value::Dict(_))
    }

    /// Short label for error messages.
    pub fn type_label(&self) -> String {
        match self {
            Value::None => "None".into(),
            Value::Bool(_) => "bool".into(),
            Value::Int(_) => "int".into(),
            Value::Float(_) => "float".into(),
            Value::Str(_) => "str".into(),
            Value::Bytes(_) => "bytes".into(),
            Value::Date(_) => "date".into(),
            Value::DateTime(_) => "datetime".into(),
            Value::Enum(e) => e.enum_name.clone(),
            Value::List(_) => "list".into(),
            Value::Set(_) => "set".into(),
            Value::Dict(_) => "dict".into(),
            Value::Object(o) => format!("{} object", o.class()),
            Value::Class(c) => format!("class {c}"),
        }
    }

    /// Element count for collections, `None` otherwise.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::List(xs) | Value::Set(xs) => Some(xs.len()),
            Value::Dict(kv) => Some(kv.len()),
            _ => None,
        }
    }

    pub fn set_insert(items: &mut Vec<Value>, value: Value) -> bool {
        if items.contains(&value) {
            return false;
        }
        items.push(value);
        true
    }

    /// Element at `index`; dict entries are exposed as two-element lists.
    pub fn element(&self, index: usize) -> Option<Value> {
        match self {
            Value::List(xs) | Value::Set(xs) => xs.get(index).cloned(),
            Value::Dict(kv) => kv
                .get(index)
                .map(|(k, v)| Value::List(vec![k.clone(), v.clone()])),
            _ => None,
        }
    }

    /// Structural equality: objects compare by class and attributes rather
    /// than identity. Parent back-references are ignored.
    pub fn deep_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => {
                if a.ptr_eq(b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.class == b.class
                    && a.attrs.len() == b.attrs.len()
                    && a.attrs.iter().all(|(name, va)| {
                        b.attrs.get(name).is_some_and(|vb| va.deep_eq(vb))
                    })
            }
            (Value::List(a), Value::List(b)) | (Value::Set(a), Value::Set(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.deep_eq(y))
            }
            (Value::Dict(a), Value::Dict(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b).all(|((ka, va), (kb, vb))| ka.deep_eq(kb) && va.deep_eq(vb))
            }
            _ => self == other,
        }
    }

    /// Text used when a cell value is spliced into a composite placeholder.
    pub fn to_cell_text(&self) -> String {
        match self {
            Value::None => String::new(),
            Value::Str(s) => s.clone(),
            Value::Enum(e) => e.variant.clone(),
            other => other.to_string(),
        }
    }

    // ————————————————————————————————————————————————————————————————————————
    // JSON BRIDGE
    // ————————————————————————————————————————————————————————————————————————

    /// Rows arrive as JSON. Objects become string-keyed dicts.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::None,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(xs) => Value::List(xs.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(m) => Value::Dict(
                m.iter()
                    .map(|(k, v)| (Value::Str(k.clone()), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::None => serde_json::Value::Null,
            Value::Bool(b) => json!(b),
            Value::Int(i) => json!(i),
            Value::Float(f) => json!(f.0),
            Value::Str(s) => json!(s),
            Value::Bytes(b) => json!(String::from_utf8_lossy(b)),
            Value::Date(d) => json!(d.format("%Y-%m-%d").to_string()),
            Value::DateTime(d) => json!(d.format("%Y-%m-%dT%H:%M:%S").to_string()),
            Value::Enum(e) => json!(e.variant),
            Value::List(xs) | Value::Set(xs) => {
                serde_json::Value::Array(xs.iter().map(Value::to_json).collect())
            }
            Value::Dict(kv) => {
                if kv.iter().all(|(k, _)| matches!(k, Value::Str(_))) {
                    let mut map = serde_json::Map::new();
                    for (k, v) in kv {
                        map.insert(k.to_cell_text(), v.to_json());
                    }
                    serde_json::Value::Object(map)
                } else {
                    serde_json::Value::Array(
                        kv.iter().map(|(k, v)| json!([k.to_json(), v.to_json()])).collect(),
                    )
                }
            }
            Value::Object(o) => {
                let obj = o.borrow();
                let mut map = serde_json::Map::new();
                map.insert("@class".into(), json!(obj.class.as_str()));
                for (k, v) in &obj.attrs {
                    map.insert(k.clone(), v.to_json());
                }
                serde_json::Value::Object(map)
            }
            Value::Class(c) => json!(c.as_str()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn seq(f: &mut fmt::Formatter<'_>, open: &str, xs: &[Value], close: &str) -> fmt::Result {
            f.write_str(open)?;
            for (i, x) in xs.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{x}")?;
            }
            f.write_str(close)
        }
        match self {
            Value::None => f.write_str("None"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{}", x.0),
            Value::Str(s) => f.write_str(s),
            Value::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::DateTime(d) => write!(f, "{}", d.format("%Y-%m-%dT%H:%M:%S")),
            Value::Enum(e) => write!(f, "{}.{}", e.enum_name, e.variant),
            Value::List(xs) => seq(f, "[", xs, "]"),
            Value::Set(xs) => seq(f, "{", xs, "}"),
            Value::Dict(kv) => {
                f.write_str("{")?;
                for (i, (k, v)) in kv.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
            Value::Object(o) => {
                let obj = o.borrow();
                write!(f, "{}(", obj.class)?;
                for (i, (k, v)) in obj.attrs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}={v}")?;
                }
                f.write_str(")")
            }
            Value::Class(c) => write!(f, "<class {c}>"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}
impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}
impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::float(value)
    }
}
impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}
impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}
impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}
impl From<ObjectRef> for Value {
    fn from(value: ObjectRef) -> Self {
        Value::Object(value)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// OBJECTS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug)]
pub struct Object {
    pub class: ClassName,
    pub attrs: IndexMap<String, Value>,
    parent: Weak<RefCell<Object>>,
}

/// Shared handle to a live object. Equality and hashing are by identity.
#[derive(Clone)]
pub struct ObjectRef(Rc<RefCell<Object>>);

impl ObjectRef {
    pub fn new(class: ClassName, attrs: IndexMap<String, Value>) -> Self {
        Self(Rc::new(RefCell::new(Object { class, attrs, parent: Weak::new() })))
    }

    pub fn class(&self) -> ClassName {
        self.0.borrow().class.clone()
    }

    pub fn borrow(&self) -> Ref<'_, Object> {
        self.0.borrow()
    }

    pub fn get(&self, attr: &str) -> Option<Value> {
        self.0.borrow().attrs.get(attr).cloned()
    }

    pub fn has(&self, attr: &str) -> bool {
        self.0.borrow().attrs.contains_key(attr)
    }

    /// Assigns `attr`, returning the previous value.
    pub fn set(&self, attr: &str, value: Value) -> Option<Value> {
        self.0.borrow_mut().attrs.insert(attr.to_string(), value)
    }

    /// Runs `f` against the attribute in place. Returns `None` when absent.
    pub fn with_attr_mut<R>(&self, attr: &str, f: impl FnOnce(&mut Value) -> R) -> Option<R> {
        let mut obj = self.0.borrow_mut();
        obj.attrs.get_mut(attr).map(f)
    }

    pub fn attr_names(&self) -> Vec<String> {
        self.0.borrow().attrs.keys().cloned().collect()
    }

    pub fn parent(&self) -> Option<ObjectRef> {
        self.0.borrow().parent.upgrade().map(ObjectRef)
    }

    pub fn set_parent(&self, parent: &ObjectRef) {
        self.0.borrow_mut().parent = Rc::downgrade(&parent.0);
    }

    pub fn clear_parent(&self) {
        self.0.borrow_mut().parent = Weak::new();
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ObjectRef {}

impl Hash for ObjectRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Rc::as_ptr(&self.0), state)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(obj) => f
                .debug_struct(obj.class.as_str())
                .field("attrs", &obj.attrs)
                .finish(),
            Err(_) => write!(f, "<object {:p}>", Rc::as_ptr(&self.0)),
        }
    }
}

/// Points the back-reference of every object directly held by `value` at `owner`.
pub fn adopt(owner: &ObjectRef, value: &Value) {
    match value {
        Value::Object(child) => child.set_parent(owner),
        Value::List(xs) | Value::Set(xs) => xs.iter().for_each(|x| adopt(owner, x)),
        _ => {}
    }
}

/// Clears the back-reference of every object directly held by `value`.
pub fn detach(value: &Value) {
    match value {
        Value::Object(o) => o.clear_parent(),
        Value::List(xs) | Value::Set(xs) => xs.iter().for_each(detach),
        _ => {}
    }
}
