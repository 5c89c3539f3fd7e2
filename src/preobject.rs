//! Deferred construction: what to build, from which type, with which
//! arguments, materialized into a real object on demand.
//!
//! A [`PreObject`] is either an existing value that is handed back as is, a
//! literal leaf (strings may hold spreadsheet placeholders), or a pending
//! construction of a class or container whose children are pre-objects again.
pub mod mapping;

use std::collections::HashSet;
use std::fmt;

use indexmap::IndexMap;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::hint::{self, ContainerKind, TypeDescriptor, cast::typecast_with};
use crate::introspect::{self, ConstructorParam, IntrospectOptions};
use crate::placeholder::{self, Row, Workbook};
use crate::registry::{BoundArgs, Registry};
use crate::value::{self, ClassName, ObjectRef, Value};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// What a pending pre-object turns into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Class(ClassName),
    Container(ContainerKind),
    /// One dict entry; exactly two positional children.
    Pair,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Class(c) => write!(f, "{c}"),
            Target::Container(kind) => f.write_str(kind.name()),
            Target::Pair => f.write_str("Pair"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum PreObject {
    /// Materializes to this very value.
    Existing(Value),
    Literal(Value),
    Pending {
        target: Target,
        positional: Vec<PreObject>,
        keyword: IndexMap<String, PreObject>,
    },
}

/// A tolerated problem met while materializing one field.
#[derive(Debug)]
pub struct FieldProblem {
    pub location: String,
    pub error: Error,
}

/// Where placeholder cells come from.
#[derive(Clone, Copy)]
pub enum CellSource<'a> {
    /// Placeholders are left unresolved.
    None,
    Row(&'a Row),
    Workbook {
        book: &'a dyn Workbook,
        sheet: &'a str,
        row_number: usize,
    },
}

pub struct MaterializeContext<'a> {
    pub registry: &'a Registry,
    pub cells: CellSource<'a>,
    pub config: &'a EngineConfig,
    problems: Vec<FieldProblem>,
    /// Parent links of the current pass, applied only if it succeeds.
    adoptions: Vec<(ObjectRef, Value)>,
}

impl<'a> MaterializeContext<'a> {
    pub fn new(registry: &'a Registry, config: &'a EngineConfig) -> Self {
        Self { registry, cells: CellSource::None, config, problems: Vec::new(), adoptions: Vec::new() }
    }

    pub fn with_row(mut self, row: &'a Row) -> Self {
        self.cells = CellSource::Row(row);
        self
    }

    pub fn with_workbook(mut self, book: &'a dyn Workbook, sheet: &'a str, row_number: usize) -> Self {
        self.cells = CellSource::Workbook { book, sheet, row_number };
        self
    }

    pub fn problems(&self) -> &[FieldProblem] {
        &self.problems
    }

    pub fn take_problems(&mut self) -> Vec<FieldProblem> {
        std::mem::take(&mut self.problems)
    }

    fn resolve(&self, text: &str) -> Result<Option<Value>> {
        match self.cells {
            CellSource::None => Ok(None),
            CellSource::Row(row) => placeholder::resolve_against_row(text, row).map(Some),
            CellSource::Workbook { book, sheet, row_number } => {
                placeholder::resolve_against_workbook(text, book, sheet, row_number).map(Some)
            }
        }
    }

    fn commit(&mut self, mark: usize, result: Result<Value>) -> Result<Value> {
        let adoptions = self.adoptions.split_off(mark);
        if result.is_ok() {
            for (owner, child) in &adoptions {
                value::adopt(owner, child);
            }
        }
        result
    }

    fn tolerate(&mut self, location: &str, error: Error) {
        tracing::warn!(%location, %error, "keeping unconverted field value");
        self.problems.push(FieldProblem { location: location.to_string(), error });
    }
}

// ————————————————————————————————————————————————————————————————————————————
// CONSTRUCTION
// ————————————————————————————————————————————————————————————————————————————

impl PreObject {
    pub fn literal(value: impl Into<Value>) -> Self {
        PreObject::Literal(value.into())
    }

    pub fn container(kind: ContainerKind, items: Vec<PreObject>) -> Self {
        PreObject::Pending { target: Target::Container(kind), positional: items, keyword: IndexMap::new() }
    }

    pub fn pair(key: PreObject, value: PreObject) -> Self {
        PreObject::Pending { target: Target::Pair, positional: vec![key, value], keyword: IndexMap::new() }
    }

    /// Describes how `value` could be rebuilt. Objects of types that cannot be
    /// introspected, and objects already on the current descent path, are
    /// kept as [`PreObject::Existing`].
    pub fn from_value(value: &Value, registry: &Registry) -> PreObject {
        from_value_inner(value, registry, &mut HashSet::new())
    }

    /// A pending construction of `class`, with keywords resolved to canonical
    /// parameter names. Hidden parameters are not addressable.
    pub fn build(
        class: &ClassName,
        positional: Vec<PreObject>,
        keyword: IndexMap<String, PreObject>,
        registry: &Registry,
    ) -> Result<PreObject> {
        let params = introspect::introspect(class, registry, IntrospectOptions::default())?;
        if positional.len() > params.len() {
            return Err(Error::UnknownParameter {
                class: class.to_string(),
                param: format!("positional argument #{}", params.len() + 1),
            });
        }
        let mut canonical = IndexMap::with_capacity(keyword.len());
        for (name, child) in keyword {
            let param = introspect::find_param(&params, &name).ok_or_else(|| Error::UnknownParameter {
                class: class.to_string(),
                param: name.clone(),
            })?;
            canonical.insert(param.name.clone(), child);
        }
        Ok(PreObject::Pending { target: Target::Class(class.clone()), positional, keyword: canonical })
    }

    /// A skeleton of `class` with every visible parameter filled: defaults
    /// where declared, nested skeletons for required class-typed parameters,
    /// empty containers and `None` otherwise.
    pub fn template(class: &ClassName, registry: &Registry) -> Result<PreObject> {
        template_inner(class, registry, &mut Vec::new())
    }

    // ————————————————————————————————————————————————————————————————————————
    // ACCESS
    // ————————————————————————————————————————————————————————————————————————

    pub fn target(&self) -> Option<&Target> {
        match self {
            PreObject::Pending { target, .. } => Some(target),
            _ => None,
        }
    }

    /// The keyword child for `name`.
    pub fn param(&self, name: &str) -> Option<&PreObject> {
        match self {
            PreObject::Pending { keyword, .. } => keyword.get(name),
            _ => None,
        }
    }

    pub fn param_mut(&mut self, name: &str) -> Option<&mut PreObject> {
        match self {
            PreObject::Pending { keyword, .. } => keyword.get_mut(name),
            _ => None,
        }
    }

    pub fn positional(&self) -> &[PreObject] {
        match self {
            PreObject::Pending { positional, .. } => positional,
            _ => &[],
        }
    }

    /// Sets a keyword child; returns the previous one. No-op on non-pending
    /// pre-objects, which have no keywords.
    pub fn set_param(&mut self, name: impl Into<String>, child: PreObject) -> Option<PreObject> {
        match self {
            PreObject::Pending { keyword, .. } => keyword.insert(name.into(), child),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, PreObject::Pending { .. })
    }

    // ————————————————————————————————————————————————————————————————————————
    // MATERIALIZATION
    // ————————————————————————————————————————————————————————————————————————

    /// Builds the described value. Literals are kept as they are; use
    /// [`PreObject::materialize_as`] to cast a root literal.
    ///
    /// Existing objects are re-parented only once the whole construction
    /// succeeds; on error the live graph is left as it was.
    pub fn materialize(&self, ctx: &mut MaterializeContext) -> Result<Value> {
        let location = match self.target() {
            Some(target) => target.to_string(),
            None => String::from("$"),
        };
        let mark = ctx.adoptions.len();
        let result = self.materialize_at(None, ctx, &location);
        ctx.commit(mark, result)
    }

    /// Builds the described value as a member of `ty`.
    pub fn materialize_as(&self, ty: &TypeDescriptor, ctx: &mut MaterializeContext) -> Result<Value> {
        let mark = ctx.adoptions.len();
        let result = self.materialize_at(Some(ty), ctx, &ty.display_name());
        ctx.commit(mark, result)
    }

    fn materialize_at(&self, ty: Option<&TypeDescriptor>, ctx: &mut MaterializeContext, location: &str) -> Result<Value> {
        match self {
            PreObject::Existing(value) => Ok(value.clone()),
            PreObject::Literal(value) => materialize_literal(value, ty, ctx, location),
            PreObject::Pending { target: Target::Class(class), positional, keyword } => {
                materialize_class(class, positional, keyword, ctx, location)
            }
            PreObject::Pending { target: Target::Container(kind), positional, .. } => {
                materialize_container(*kind, positional, ty, ctx, location)
            }
            PreObject::Pending { target: Target::Pair, positional, .. } => {
                let (k, v) = materialize_pair(positional, ty, ctx, location)?;
                Ok(Value::List(vec![k, v]))
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn from_value_inner(value: &Value, registry: &Registry, on_path: &mut HashSet<ObjectRef>) -> PreObject {
    match value {
        Value::Object(object) => {
            if on_path.contains(object) {
                return PreObject::Existing(value.clone());
            }
            let class = object.class();
            let Ok(params) = introspect::introspect(&class, registry, IntrospectOptions::all()) else {
                return PreObject::Existing(value.clone());
            };
            on_path.insert(object.clone());
            let mut keyword = IndexMap::new();
            for param in &params {
                if let Some(attr) = object.get(&param.mapped_attribute) {
                    keyword.insert(param.name.clone(), from_value_inner(&attr, registry, on_path));
                }
            }
            on_path.remove(object);
            PreObject::Pending { target: Target::Class(class), positional: Vec::new(), keyword }
        }
        Value::List(items) => PreObject::container(
            ContainerKind::List,
            items.iter().map(|x| from_value_inner(x, registry, on_path)).collect(),
        ),
        Value::Set(items) => PreObject::container(
            ContainerKind::Set,
            items.iter().map(|x| from_value_inner(x, registry, on_path)).collect(),
        ),
        Value::Dict(entries) => PreObject::container(
            ContainerKind::Dict,
            entries
                .iter()
                .map(|(k, v)| {
                    PreObject::pair(from_value_inner(k, registry, on_path), from_value_inner(v, registry, on_path))
                })
                .collect(),
        ),
        scalar => PreObject::Literal(scalar.clone()),
    }
}

fn template_inner(class: &ClassName, registry: &Registry, stack: &mut Vec<ClassName>) -> Result<PreObject> {
    let params = introspect::introspect(class, registry, IntrospectOptions::default())?;
    stack.push(class.clone());
    let mut keyword = IndexMap::new();
    for param in &params {
        keyword.insert(param.name.clone(), template_param(param, registry, stack));
    }
    stack.pop();
    Ok(PreObject::Pending { target: Target::Class(class.clone()), positional: Vec::new(), keyword })
}

fn template_param(param: &ConstructorParam, registry: &Registry, stack: &mut Vec<ClassName>) -> PreObject {
    if let Some(default) = &param.default_value {
        return PreObject::from_value(default, registry);
    }
    match &param.ty {
        TypeDescriptor::Class(c) if !stack.contains(c) => {
            let constructible = registry.class(c).is_ok_and(|def| !def.is_abstract());
            match constructible.then(|| template_inner(c, registry, stack)) {
                Some(Ok(nested)) => nested,
                _ => PreObject::Literal(Value::None),
            }
        }
        TypeDescriptor::Container { kind, .. } => PreObject::container(*kind, Vec::new()),
        _ => PreObject::Literal(Value::None),
    }
}

fn materialize_literal(
    literal: &Value,
    ty: Option<&TypeDescriptor>,
    ctx: &mut MaterializeContext,
    location: &str,
) -> Result<Value> {
    let mut value = literal.clone();
    if let Value::Str(text) = literal {
        if placeholder::is_placeholder(text) {
            match ctx.resolve(text) {
                Ok(Some(resolved)) => value = resolved,
                // left for a later pass against real cells
                Ok(None) => return Ok(value),
                Err(error) if error.is_field_level() => {
                    ctx.tolerate(location, error);
                    return Ok(value);
                }
                Err(error) => return Err(error),
            }
        }
    }
    let Some(ty) = ty else {
        return Ok(value);
    };
    if let (TypeDescriptor::TypeOf(bound), Value::Str(name)) = (hint::unwrap_optional(ty), &value) {
        let class = ClassName::new(name.trim());
        if ctx.registry.contains(&class) && hint::is_subtype(&TypeDescriptor::Class(class.clone()), bound, ctx.registry) {
            return Ok(Value::Class(class));
        }
    }
    match typecast_with(value, ty, ctx.registry, &ctx.config.date_formats) {
        Ok(cast) => Ok(cast),
        Err(failure) if ctx.config.strict_typecast => Err(failure.error),
        Err(failure) => {
            ctx.tolerate(location, failure.error);
            Ok(failure.value)
        }
    }
}

fn materialize_class(
    class: &ClassName,
    positional: &[PreObject],
    keyword: &IndexMap<String, PreObject>,
    ctx: &mut MaterializeContext,
    location: &str,
) -> Result<Value> {
    let registry = ctx.registry;
    let constructor = registry.class(class)?;
    let params = introspect::introspect(class, registry, IntrospectOptions::all())?;
    let meta = registry.lookup_metadata(class);

    let mut bound: IndexMap<String, Value> = IndexMap::new();
    for (name, child) in keyword {
        let param = introspect::find_param(&params, name).ok_or_else(|| Error::UnknownParameter {
            class: class.to_string(),
            param: name.clone(),
        })?;
        let value = child.materialize_at(Some(&param.ty), ctx, &format!("{location}.{}", param.name))?;
        bound.insert(param.name.clone(), value);
    }

    let visible: Vec<&ConstructorParam> = params.iter().filter(|p| !meta.is_hidden(&p.name)).collect();
    if positional.len() > visible.len() {
        return Err(Error::UnknownParameter {
            class: class.to_string(),
            param: format!("positional argument #{}", visible.len() + 1),
        });
    }
    for (param, child) in visible.iter().zip(positional) {
        if bound.contains_key(&param.name) {
            tracing::debug!(%class, param = %param.name, "keyword overrides positional argument");
            continue;
        }
        let value = child.materialize_at(Some(&param.ty), ctx, &format!("{location}.{}", param.name))?;
        bound.insert(param.name.clone(), value);
    }

    for (name, value) in &meta.default_params_to_hide {
        if params.iter().any(|p| &p.name == name) && !bound.contains_key(name) {
            bound.insert(name.clone(), value.clone());
        }
    }

    let mut args = BoundArgs::default();
    for param in &params {
        let value = match bound.shift_remove(&param.name) {
            Some(value) => value,
            None => param.default_value.clone().ok_or_else(|| {
                Error::construction(class, format!("missing required parameter `{}`", param.name))
            })?,
        };
        args.push(param.name.clone(), param.mapped_attribute.clone(), value);
    }
    let built = constructor.construct(args)?;
    if let Value::Object(object) = &built {
        for child in object.borrow().attrs.values() {
            ctx.adoptions.push((object.clone(), child.clone()));
        }
    }
    Ok(built)
}

fn materialize_container(
    kind: ContainerKind,
    items: &[PreObject],
    ty: Option<&TypeDescriptor>,
    ctx: &mut MaterializeContext,
    location: &str,
) -> Result<Value> {
    let item_ty = match ty.map(|t| ctx.registry.item_descriptor(t)) {
        Some(Ok(item)) => Some(item),
        // declared as a non-container (e.g. `Any`): items stay uncast
        None | Some(Err(Error::TypeMismatch { .. })) => None,
        Some(Err(error)) => return Err(error),
    };
    match kind {
        ContainerKind::List | ContainerKind::Set => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                let value = item.materialize_at(item_ty.as_ref(), ctx, &format!("{location}[{i}]"))?;
                if kind == ContainerKind::Set {
                    Value::set_insert(&mut out, value);
                } else {
                    out.push(value);
                }
            }
            Ok(match kind {
                ContainerKind::Set => Value::Set(out),
                _ => Value::List(out),
            })
        }
        ContainerKind::Dict => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                let location = format!("{location}[{i}]");
                let entry = match item {
                    PreObject::Pending { target: Target::Pair, positional, .. } => {
                        materialize_pair(positional, item_ty.as_ref(), ctx, &location)?
                    }
                    other => match other.materialize_at(item_ty.as_ref(), ctx, &location)? {
                        Value::List(mut kv) if kv.len() == 2 => {
                            let v = kv.pop().unwrap_or(Value::None);
                            let k = kv.pop().unwrap_or(Value::None);
                            (k, v)
                        }
                        found => return Err(Error::type_mismatch("a key-value pair", &found)),
                    },
                };
                out.push(entry);
            }
            Ok(Value::Dict(out))
        }
    }
}

fn materialize_pair(
    items: &[PreObject],
    ty: Option<&TypeDescriptor>,
    ctx: &mut MaterializeContext,
    location: &str,
) -> Result<(Value, Value)> {
    let [key, value] = items else {
        return Err(Error::AmbiguousArity { descriptor: "Pair".into(), expected: 2, found: items.len() });
    };
    let (kt, vt) = match ty.map(hint::unwrap_optional) {
        Some(TypeDescriptor::Pair(k, v)) => (Some(k.as_ref()), Some(v.as_ref())),
        _ => (None, None),
    };
    let k = key.materialize_at(kt, ctx, &format!("{location}.key"))?;
    let v = value.materialize_at(vt, ctx, &format!("{location}.value"))?;
    Ok((k, v))
}
