//! Type descriptors and the algebra over them.
//!
//! A closed sum type replaces open-ended runtime type hints: every shape the
//! engine understands is a variant here, and every question the engine asks
//! about a shape (subtyping, membership, optional-unwrap, item type, naming)
//! is an exhaustive match.
//!
//! Class relationships are not stored in descriptors. A `Class` descriptor
//! only names the class; ancestry comes from a [`ClassHierarchy`] passed in
//! by reference.
pub mod cast;
pub mod parse;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::value::{ClassName, Value};

pub use cast::typecast;
pub use parse::parse_descriptor;

// ————————————————————————————————————————————————————————————————————————————
// SHAPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    Bool,
    Int,
    Float,
    Str,
    Bytes,
    Date,
    DateTime,
}

impl ScalarKind {
    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::Bool => "Bool",
            ScalarKind::Int => "Int",
            ScalarKind::Float => "Float",
            ScalarKind::Str => "Str",
            ScalarKind::Bytes => "Bytes",
            ScalarKind::Date => "Date",
            ScalarKind::DateTime => "DateTime",
        }
    }

    pub fn matches(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (ScalarKind::Bool, Value::Bool(_))
                | (ScalarKind::Int, Value::Int(_))
                | (ScalarKind::Float, Value::Float(_))
                | (ScalarKind::Str, Value::Str(_))
                | (ScalarKind::Bytes, Value::Bytes(_))
                | (ScalarKind::Date, Value::Date(_))
                | (ScalarKind::DateTime, Value::DateTime(_))
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    List,
    Set,
    Dict,
}

impl ContainerKind {
    pub fn name(self) -> &'static str {
        match self {
            ContainerKind::List => "ListOf",
            ContainerKind::Set => "SetOf",
            ContainerKind::Dict => "DictOf",
        }
    }

    pub fn arity(self) -> usize {
        match self {
            ContainerKind::List | ContainerKind::Set => 1,
            ContainerKind::Dict => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumType {
    pub name: String,
    pub variants: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    Any,
    None,
    Scalar(ScalarKind),
    Enum(EnumType),
    Class(ClassName),
    /// Always the arity-2 union of `inner` and `None`.
    Optional(Box<TypeDescriptor>),
    Union(Vec<TypeDescriptor>),
    /// `args` is empty for a bare generic.
    Container {
        kind: ContainerKind,
        args: Vec<TypeDescriptor>,
    },
    /// Synthetic item descriptor of a dict: one key-value entry.
    Pair(Box<TypeDescriptor>, Box<TypeDescriptor>),
    /// "Choose a concrete subtype of `bound`".
    TypeOf(Box<TypeDescriptor>),
}

static NONE_DESCRIPTOR: TypeDescriptor = TypeDescriptor::None;

impl TypeDescriptor {
    pub fn scalar(kind: ScalarKind) -> Self {
        TypeDescriptor::Scalar(kind)
    }
    pub fn int() -> Self {
        TypeDescriptor::Scalar(ScalarKind::Int)
    }
    pub fn float() -> Self {
        TypeDescriptor::Scalar(ScalarKind::Float)
    }
    pub fn string() -> Self {
        TypeDescriptor::Scalar(ScalarKind::Str)
    }
    pub fn boolean() -> Self {
        TypeDescriptor::Scalar(ScalarKind::Bool)
    }
    pub fn date() -> Self {
        TypeDescriptor::Scalar(ScalarKind::Date)
    }
    pub fn class(name: impl Into<ClassName>) -> Self {
        TypeDescriptor::Class(name.into())
    }
    pub fn enumeration(name: impl Into<String>, variants: &[&str]) -> Self {
        TypeDescriptor::Enum(EnumType {
            name: name.into(),
            variants: variants.iter().map(|v| v.to_string()).collect(),
        })
    }
    pub fn list_of(item: TypeDescriptor) -> Self {
        TypeDescriptor::Container { kind: ContainerKind::List, args: vec![item] }
    }
    pub fn set_of(item: TypeDescriptor) -> Self {
        TypeDescriptor::Container { kind: ContainerKind::Set, args: vec![item] }
    }
    pub fn dict_of(key: TypeDescriptor, value: TypeDescriptor) -> Self {
        TypeDescriptor::Container { kind: ContainerKind::Dict, args: vec![key, value] }
    }
    pub fn bare(kind: ContainerKind) -> Self {
        TypeDescriptor::Container { kind, args: Vec::new() }
    }
    pub fn type_of(bound: TypeDescriptor) -> Self {
        TypeDescriptor::TypeOf(Box::new(bound))
    }

    /// `Optional[inner]`. Already-optional and `None` inputs are returned as is.
    pub fn optional(inner: TypeDescriptor) -> Self {
        match inner {
            TypeDescriptor::Optional(_) | TypeDescriptor::None | TypeDescriptor::Any => inner,
            other => TypeDescriptor::Optional(Box::new(other)),
        }
    }

    /// Canonical union: nested unions flattened, duplicates dropped, a single
    /// variant unwrapped and `[X, None]` folded into `Optional[X]`.
    pub fn union(variants: impl IntoIterator<Item = TypeDescriptor>) -> Self {
        fn push(d: TypeDescriptor, flat: &mut Vec<TypeDescriptor>) {
            if !flat.contains(&d) {
                flat.push(d);
            }
        }
        let mut flat: Vec<TypeDescriptor> = Vec::new();
        for v in variants {
            match v {
                TypeDescriptor::Union(inner) => inner.into_iter().for_each(|d| push(d, &mut flat)),
                TypeDescriptor::Optional(inner) => {
                    push(*inner, &mut flat);
                    push(TypeDescriptor::None, &mut flat);
                }
                other => push(other, &mut flat),
            }
        }
        let has_none = flat.contains(&TypeDescriptor::None);
        match flat.len() {
            0 => TypeDescriptor::None,
            1 => flat.remove(0),
            2 if has_none => {
                let inner = flat.into_iter().find(|d| *d != TypeDescriptor::None);
                TypeDescriptor::Optional(Box::new(inner.unwrap_or(TypeDescriptor::None)))
            }
            _ => TypeDescriptor::Union(flat),
        }
    }

    pub fn is_optional(&self) -> bool {
        match self {
            TypeDescriptor::Optional(_) => true,
            TypeDescriptor::Union(vs) => vs.len() == 2 && vs.contains(&TypeDescriptor::None),
            _ => false,
        }
    }

    /// Whether `None` is a member of this type.
    pub fn accepts_none(&self) -> bool {
        match self {
            TypeDescriptor::Any | TypeDescriptor::None | TypeDescriptor::Optional(_) => true,
            TypeDescriptor::Union(vs) => vs.iter().any(TypeDescriptor::accepts_none),
            _ => false,
        }
    }

    /// Variants of a union-like descriptor; a single-element list otherwise.
    pub fn variants(&self) -> Vec<&TypeDescriptor> {
        match self {
            TypeDescriptor::Optional(inner) => vec![inner.as_ref(), &NONE_DESCRIPTOR],
            TypeDescriptor::Union(vs) => vs.iter().collect(),
            other => vec![other],
        }
    }

    pub fn display_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn args(f: &mut fmt::Formatter<'_>, name: &str, xs: &[&TypeDescriptor]) -> fmt::Result {
            f.write_str(name)?;
            if xs.is_empty() {
                return Ok(());
            }
            f.write_str("[")?;
            for (i, x) in xs.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{x}")?;
            }
            f.write_str("]")
        }
        match self {
            TypeDescriptor::Any => f.write_str("Any"),
            TypeDescriptor::None => f.write_str("None"),
            TypeDescriptor::Scalar(k) => f.write_str(k.name()),
            TypeDescriptor::Enum(e) => f.write_str(&e.name),
            TypeDescriptor::Class(c) => f.write_str(c.as_str()),
            TypeDescriptor::Optional(inner) => args(f, "Optional", &[inner.as_ref()]),
            TypeDescriptor::Union(vs) => args(f, "Union", &vs.iter().collect::<Vec<_>>()),
            TypeDescriptor::Container { kind, args: xs } => {
                args(f, kind.name(), &xs.iter().collect::<Vec<_>>())
            }
            TypeDescriptor::Pair(k, v) => args(f, "Pair", &[k.as_ref(), v.as_ref()]),
            TypeDescriptor::TypeOf(bound) => args(f, "TypeOf", &[bound.as_ref()]),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// HIERARCHY
// ————————————————————————————————————————————————————————————————————————————

pub trait ClassHierarchy {
    /// `class` first, then its ancestors nearest-first.
    fn lineage(&self, class: &ClassName) -> Vec<ClassName>;

    fn is_subclass(&self, class: &ClassName, ancestor: &ClassName) -> bool {
        class == ancestor || self.lineage(class).iter().any(|c| c == ancestor)
    }
}

/// A hierarchy without inheritance; every class is only its own subclass.
pub struct Flat;

impl ClassHierarchy for Flat {
    fn lineage(&self, class: &ClassName) -> Vec<ClassName> {
        vec![class.clone()]
    }
}

// ————————————————————————————————————————————————————————————————————————————
// ALGEBRA
// ————————————————————————————————————————————————————————————————————————————

/// Whether `a` can stand in for `b`.
///
/// Unions are permissive on the left: a union is a subtype when some variant
/// is. On the right, `a` is a subtype when some variant of `b` accepts it.
pub fn is_subtype(a: &TypeDescriptor, b: &TypeDescriptor, h: &dyn ClassHierarchy) -> bool {
    use TypeDescriptor as T;
    if a == b || matches!(b, T::Any) {
        return true;
    }
    match (a, b) {
        (T::Optional(_) | T::Union(_), _) => a.variants().into_iter().any(|v| is_subtype(v, b, h)),
        (_, T::Optional(_) | T::Union(_)) => b.variants().into_iter().any(|v| is_subtype(a, v, h)),
        (T::Class(x), T::Class(y)) => h.is_subclass(x, y),
        (T::Enum(x), T::Enum(y)) => x.name == y.name,
        (T::Container { kind: ka, args: aa }, T::Container { kind: kb, args: ab }) => {
            ka == kb
                && (ab.is_empty()
                    || (aa.len() == ab.len() && aa.iter().zip(ab).all(|(x, y)| is_subtype(x, y, h))))
        }
        (T::Pair(ka, va), T::Pair(kb, vb)) => is_subtype(ka, kb, h) && is_subtype(va, vb, h),
        (T::TypeOf(x), T::TypeOf(y)) => is_subtype(x, y, h),
        _ => false,
    }
}

/// Runtime membership test.
pub fn is_of_type(value: &Value, d: &TypeDescriptor, h: &dyn ClassHierarchy) -> bool {
    use TypeDescriptor as T;
    match d {
        T::Any => true,
        T::None => value.is_none(),
        T::Scalar(kind) => kind.matches(value),
        T::Enum(e) => matches!(
            value,
            Value::Enum(ev) if ev.enum_name == e.name && e.variants.contains(&ev.variant)
        ),
        T::Class(c) => matches!(value, Value::Object(o) if h.is_subclass(&o.class(), c)),
        T::Optional(inner) => value.is_none() || is_of_type(value, inner, h),
        T::Union(vs) => vs.iter().any(|v| is_of_type(value, v, h)),
        T::Container { kind, args } => match (kind, value) {
            (ContainerKind::List, Value::List(xs)) | (ContainerKind::Set, Value::Set(xs)) => {
                match args.as_slice() {
                    [] => true,
                    [item] => xs.iter().all(|x| is_of_type(x, item, h)),
                    _ => false,
                }
            }
            (ContainerKind::Dict, Value::Dict(kv)) => match args.as_slice() {
                [] => true,
                [kt, vt] => kv.iter().all(|(k, v)| is_of_type(k, kt, h) && is_of_type(v, vt, h)),
                _ => false,
            },
            _ => false,
        },
        T::Pair(kt, vt) => matches!(
            value,
            Value::List(xs) if xs.len() == 2 && is_of_type(&xs[0], kt, h) && is_of_type(&xs[1], vt, h)
        ),
        T::TypeOf(bound) => matches!(
            value,
            Value::Class(c) if is_subtype(&T::Class(c.clone()), bound, h)
        ),
    }
}

/// The non-`None` variant of an optional; `d` itself otherwise.
pub fn unwrap_optional(d: &TypeDescriptor) -> &TypeDescriptor {
    match d {
        TypeDescriptor::Optional(inner) => inner.as_ref(),
        TypeDescriptor::Union(vs) if d.is_optional() => vs
            .iter()
            .find(|v| **v != TypeDescriptor::None)
            .unwrap_or(d),
        _ => d,
    }
}

/// Item type of a parametrized container. Dicts yield a [`TypeDescriptor::Pair`].
///
/// Bare containers fail here; [`crate::registry::Registry::item_descriptor`]
/// consults the registered default item types first.
pub fn item_descriptor(d: &TypeDescriptor) -> Result<TypeDescriptor> {
    match unwrap_optional(d) {
        TypeDescriptor::Container { kind, args } => match (kind, args.as_slice()) {
            (ContainerKind::List | ContainerKind::Set, [item]) => Ok(item.clone()),
            (ContainerKind::Dict, [k, v]) => {
                Ok(TypeDescriptor::Pair(Box::new(k.clone()), Box::new(v.clone())))
            }
            (kind, found) => Err(Error::AmbiguousArity {
                descriptor: d.display_name(),
                expected: kind.arity(),
                found: found.len(),
            }),
        },
        other => Err(Error::TypeMismatch {
            expected: "a container type".into(),
            found: other.display_name(),
        }),
    }
}

pub fn display_name(d: &TypeDescriptor) -> String {
    d.display_name()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{EnumValue, ObjectRef};
    use indexmap::IndexMap;

    /// Element → Property → Range-ish chain for subclass checks.
    struct Chain;

    impl ClassHierarchy for Chain {
        fn lineage(&self, class: &ClassName) -> Vec<ClassName> {
            let order = ["Range", "Property", "Element"];
            match order.iter().position(|c| *c == class.as_str()) {
                Some(i) => order[i..].iter().map(|c| ClassName::new(*c)).collect(),
                None => vec![class.clone()],
            }
        }
    }

    #[test]
    fn optional_is_a_two_variant_union_with_none() {
        let opt = TypeDescriptor::optional(TypeDescriptor::int());
        assert_eq!(opt.variants(), vec![&TypeDescriptor::int(), &TypeDescriptor::None]);
        assert_eq!(
            TypeDescriptor::union([TypeDescriptor::int(), TypeDescriptor::None]),
            opt
        );
        assert_eq!(
            TypeDescriptor::union([opt.clone(), TypeDescriptor::None]),
            opt,
            "re-wrapping must not nest"
        );
    }

    #[test]
    fn unwrap_optional_is_lossless() {
        let x = TypeDescriptor::list_of(TypeDescriptor::int());
        assert_eq!(unwrap_optional(&TypeDescriptor::optional(x.clone())), &x);
        assert_eq!(unwrap_optional(&x), &x);
        let raw = TypeDescriptor::Union(vec![TypeDescriptor::None, TypeDescriptor::string()]);
        assert_eq!(unwrap_optional(&raw), &TypeDescriptor::string());
    }

    #[test]
    fn display_names_compose() {
        let d = TypeDescriptor::optional(TypeDescriptor::list_of(TypeDescriptor::int()));
        assert_eq!(d.display_name(), "Optional[ListOf[Int]]");
        let u = TypeDescriptor::union([TypeDescriptor::string(), TypeDescriptor::class("Key")]);
        assert_eq!(u.display_name(), "Union[Str, Key]");
        assert_eq!(
            TypeDescriptor::dict_of(TypeDescriptor::string(), TypeDescriptor::float()).display_name(),
            "DictOf[Str, Float]"
        );
        assert_eq!(TypeDescriptor::bare(ContainerKind::Set).display_name(), "SetOf");
    }

    #[test]
    fn subtyping_follows_classes_and_unions() {
        let range = TypeDescriptor::class("Range");
        let element = TypeDescriptor::class("Element");
        assert!(is_subtype(&range, &element, &Chain));
        assert!(!is_subtype(&element, &range, &Chain));

        let either = TypeDescriptor::union([TypeDescriptor::string(), element.clone()]);
        assert!(is_subtype(&range, &either, &Chain));
        assert!(is_subtype(&either, &TypeDescriptor::string(), &Chain));
        assert!(!is_subtype(&TypeDescriptor::int(), &either, &Chain));

        assert!(is_subtype(
            &TypeDescriptor::list_of(range.clone()),
            &TypeDescriptor::list_of(element.clone()),
            &Chain
        ));
        assert!(is_subtype(
            &TypeDescriptor::list_of(range.clone()),
            &TypeDescriptor::bare(ContainerKind::List),
            &Chain
        ));
        assert!(!is_subtype(
            &TypeDescriptor::set_of(range.clone()),
            &TypeDescriptor::list_of(range.clone()),
            &Chain
        ));
        assert!(is_subtype(
            &TypeDescriptor::type_of(range),
            &TypeDescriptor::type_of(element),
            &Chain
        ));
    }

    #[test]
    fn membership_checks_values() {
        let h = &Chain;
        let status = TypeDescriptor::enumeration("Status", &["Draft", "Released"]);
        assert!(is_of_type(&Value::Enum(EnumValue::new("Status", "Draft")), &status, h));
        assert!(!is_of_type(&Value::Enum(EnumValue::new("Status", "Gone")), &status, h));
        assert!(!is_of_type(&Value::Enum(EnumValue::new("Other", "Draft")), &status, h));

        let ints = TypeDescriptor::list_of(TypeDescriptor::int());
        assert!(is_of_type(&Value::List(vec![Value::Int(1), Value::Int(2)]), &ints, h));
        assert!(!is_of_type(&Value::List(vec![Value::Int(1), Value::str("x")]), &ints, h));

        let opt = TypeDescriptor::optional(TypeDescriptor::string());
        assert!(is_of_type(&Value::None, &opt, h));
        assert!(is_of_type(&Value::str("x"), &opt, h));
        assert!(!is_of_type(&Value::Int(1), &opt, h));

        let range = ObjectRef::new(ClassName::new("Range"), IndexMap::new());
        assert!(is_of_type(&Value::Object(range), &TypeDescriptor::class("Element"), h));

        let chooser = TypeDescriptor::type_of(TypeDescriptor::class("Property"));
        assert!(is_of_type(&Value::Class(ClassName::new("Range")), &chooser, h));
        assert!(!is_of_type(&Value::Class(ClassName::new("Element")), &chooser, h));
    }

    #[test]
    fn item_descriptor_checks_arity() {
        let d = TypeDescriptor::dict_of(TypeDescriptor::string(), TypeDescriptor::int());
        assert_eq!(
            item_descriptor(&d).unwrap(),
            TypeDescriptor::Pair(Box::new(TypeDescriptor::string()), Box::new(TypeDescriptor::int()))
        );
        let broken = TypeDescriptor::Container {
            kind: ContainerKind::Dict,
            args: vec![TypeDescriptor::string()],
        };
        assert!(matches!(
            item_descriptor(&broken),
            Err(Error::AmbiguousArity { expected: 2, found: 1, .. })
        ));
        assert!(matches!(
            item_descriptor(&TypeDescriptor::bare(ContainerKind::List)),
            Err(Error::AmbiguousArity { expected: 1, found: 0, .. })
        ));
        let opt_list = TypeDescriptor::optional(TypeDescriptor::list_of(TypeDescriptor::int()));
        assert_eq!(item_descriptor(&opt_list).unwrap(), TypeDescriptor::int());
    }
}
