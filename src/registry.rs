//! The explicit registration table every introspection call runs against.
//!
//! Domain types opt in by implementing [`Constructible`] (or by being
//! declared as a [`ClassDef`]) and being added to a [`RegistryBuilder`] at
//! startup. Once built, a [`Registry`] is never mutated; it is passed by
//! reference wherever class structure is needed.
pub mod metadata;
pub mod schema;

use std::collections::{HashMap, HashSet};
use std::fmt;

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::hint::{self, ClassHierarchy, ContainerKind, EnumType, TypeDescriptor};
use crate::introspect::{self, IntrospectOptions};
use crate::value::{ClassName, ObjectRef, Value};

pub use metadata::{ClassMetadata, ClassMetadataRegistry};

// ————————————————————————————————————————————————————————————————————————————
// CONSTRUCTIBLE
// ————————————————————————————————————————————————————————————————————————————

/// A constructor parameter as declared by the domain type.
#[derive(Debug, Clone, PartialEq)]
pub struct DeclaredParam {
    pub name: String,
    pub ty: TypeDescriptor,
    pub default: Option<Value>,
}

/// Fully bound constructor arguments, in parameter order.
#[derive(Debug, Clone, Default)]
pub struct BoundArgs {
    entries: Vec<BoundArg>,
}

#[derive(Debug, Clone)]
pub struct BoundArg {
    pub param: String,
    /// Attribute the value is stored under on the constructed object.
    pub attribute: String,
    pub value: Value,
}

impl BoundArgs {
    pub fn push(&mut self, param: impl Into<String>, attribute: impl Into<String>, value: Value) {
        self.entries.push(BoundArg { param: param.into(), attribute: attribute.into(), value });
    }

    pub fn get(&self, param: &str) -> Option<&Value> {
        self.entries.iter().find(|a| a.param == param).map(|a| &a.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoundArg> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for BoundArgs {
    type Item = BoundArg;
    type IntoIter = std::vec::IntoIter<BoundArg>;
    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// The statically declared capability of a user-constructible domain type.
pub trait Constructible {
    fn name(&self) -> &ClassName;

    fn parent(&self) -> Option<&ClassName> {
        None
    }

    /// Abstract classes appear in hierarchies and `TypeOf` bounds but are
    /// never offered as concrete choices.
    fn is_abstract(&self) -> bool {
        false
    }

    /// Constructor parameters in declaration order. Opaque types fail with
    /// [`Error::Introspection`].
    fn signature(&self) -> Result<Vec<DeclaredParam>>;

    /// Builds the value from bound arguments. Back-references of the
    /// arguments are linked by the caller once the whole graph stands.
    fn construct(&self, args: BoundArgs) -> Result<Value>;
}

pub type Validator = Box<dyn Fn(&BoundArgs) -> std::result::Result<(), String>>;

/// Record-like class: stores every bound argument under its attribute name.
pub struct ClassDef {
    name: ClassName,
    parent: Option<ClassName>,
    params: Vec<DeclaredParam>,
    is_abstract: bool,
    opaque: bool,
    validator: Option<Validator>,
}

impl ClassDef {
    pub fn new(name: impl Into<ClassName>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            params: Vec::new(),
            is_abstract: false,
            opaque: false,
            validator: None,
        }
    }

    /// A type whose constructor cannot be described; shown read-only.
    pub fn opaque(name: impl Into<ClassName>) -> Self {
        Self { opaque: true, ..Self::new(name) }
    }

    pub fn extends(mut self, parent: impl Into<ClassName>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn abstract_(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn param(mut self, name: impl Into<String>, ty: TypeDescriptor) -> Self {
        self.params.push(DeclaredParam { name: name.into(), ty, default: None });
        self
    }

    pub fn param_default(mut self, name: impl Into<String>, ty: TypeDescriptor, default: Value) -> Self {
        self.params.push(DeclaredParam { name: name.into(), ty, default: Some(default) });
        self
    }

    pub fn validator(
        mut self,
        f: impl Fn(&BoundArgs) -> std::result::Result<(), String> + 'static,
    ) -> Self {
        self.validator = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for ClassDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDef")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("params", &self.params)
            .field("is_abstract", &self.is_abstract)
            .field("opaque", &self.opaque)
            .finish_non_exhaustive()
    }
}

impl Constructible for ClassDef {
    fn name(&self) -> &ClassName {
        &self.name
    }

    fn parent(&self) -> Option<&ClassName> {
        self.parent.as_ref()
    }

    fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    fn signature(&self) -> Result<Vec<DeclaredParam>> {
        if self.opaque {
            return Err(Error::introspection(&self.name, "opaque type has no constructor signature"));
        }
        Ok(self.params.clone())
    }

    fn construct(&self, args: BoundArgs) -> Result<Value> {
        if self.opaque || self.is_abstract {
            return Err(Error::construction(&self.name, "type cannot be instantiated"));
        }
        if let Some(validate) = &self.validator {
            validate(&args).map_err(|reason| Error::construction(&self.name, reason))?;
        }
        let attrs: IndexMap<String, Value> =
            args.into_iter().map(|a| (a.attribute, a.value)).collect();
        Ok(Value::Object(ObjectRef::new(self.name.clone(), attrs)))
    }
}

// ————————————————————————————————————————————————————————————————————————————
// REGISTRY
// ————————————————————————————————————————————————————————————————————————————

pub struct Registry {
    classes: IndexMap<ClassName, Box<dyn Constructible>>,
    enums: IndexMap<String, EnumType>,
    metadata: ClassMetadataRegistry,
    default_items: HashMap<ContainerKind, TypeDescriptor>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("classes", &self.classes.keys().collect::<Vec<_>>())
            .field("enums", &self.enums.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn class(&self, name: &ClassName) -> Result<&dyn Constructible> {
        self.classes
            .get(name)
            .map(|c| c.as_ref())
            .ok_or_else(|| Error::introspection(name, "type is not registered"))
    }

    pub fn contains(&self, name: &ClassName) -> bool {
        self.classes.contains_key(name)
    }

    pub fn class_names(&self) -> impl Iterator<Item = &ClassName> {
        self.classes.keys()
    }

    pub fn enum_type(&self, name: &str) -> Option<&EnumType> {
        self.enums.get(name)
    }

    pub fn enums(&self) -> &IndexMap<String, EnumType> {
        &self.enums
    }

    pub fn lookup_metadata(&self, class: &ClassName) -> &ClassMetadata {
        self.metadata.lookup(class, self)
    }

    pub fn add_action_label(&self, class: &ClassName) -> String {
        self.lookup_metadata(class)
            .add_action_label
            .clone()
            .unwrap_or_else(|| format!("Add {class}"))
    }

    /// Concrete classes a `TypeOf(bound)` chooser may offer, in registration order.
    pub fn subclasses(&self, bound: &TypeDescriptor) -> Vec<ClassName> {
        self.classes
            .values()
            .filter(|c| !c.is_abstract() && c.signature().is_ok())
            .map(|c| c.name().clone())
            .filter(|name| hint::is_subtype(&TypeDescriptor::Class(name.clone()), bound, self))
            .collect()
    }

    pub fn default_item(&self, kind: ContainerKind) -> Option<&TypeDescriptor> {
        self.default_items.get(&kind)
    }

    /// [`hint::item_descriptor`] with two fallbacks: bare containers use the
    /// registered default item type, and a class with a children attribute
    /// yields the item type of that attribute.
    pub fn item_descriptor(&self, d: &TypeDescriptor) -> Result<TypeDescriptor> {
        match hint::unwrap_optional(d) {
            TypeDescriptor::Container { kind, args } if args.is_empty() => {
                match self.default_items.get(kind) {
                    Some(item) if *kind == ContainerKind::Dict => match item {
                        TypeDescriptor::Pair(..) => Ok(item.clone()),
                        _ => Ok(TypeDescriptor::Pair(Box::new(TypeDescriptor::Any), Box::new(item.clone()))),
                    },
                    Some(item) => Ok(item.clone()),
                    None => hint::item_descriptor(d),
                }
            }
            TypeDescriptor::Class(class) => {
                let children = self.lookup_metadata(class).children_attribute.clone();
                let Some(attribute) = children else {
                    return hint::item_descriptor(d);
                };
                let params = introspect::introspect(class, self, IntrospectOptions::all())?;
                let param = params
                    .into_iter()
                    .find(|p| p.mapped_attribute == attribute)
                    .ok_or_else(|| Error::introspection(class, format!("children attribute `{attribute}` is not a parameter")))?;
                self.item_descriptor(&param.ty)
            }
            _ => hint::item_descriptor(d),
        }
    }

    pub fn parse_descriptor(&self, text: &str) -> Result<TypeDescriptor> {
        hint::parse_descriptor(text, &self.enums)
    }
}

impl ClassHierarchy for Registry {
    fn lineage(&self, class: &ClassName) -> Vec<ClassName> {
        let mut out = vec![class.clone()];
        let mut current = class.clone();
        // `build` rejects cycles, the bound only guards hand-written impls
        while out.len() <= self.classes.len() {
            let Some(parent) = self.classes.get(&current).and_then(|c| c.parent()) else {
                break;
            };
            out.push(parent.clone());
            current = parent.clone();
        }
        out
    }
}

// ————————————————————————————————————————————————————————————————————————————
// BUILDER
// ————————————————————————————————————————————————————————————————————————————

#[derive(Default)]
pub struct RegistryBuilder {
    classes: IndexMap<ClassName, Box<dyn Constructible>>,
    enums: IndexMap<String, EnumType>,
    metadata: Vec<(ClassName, ClassMetadata)>,
    default_items: HashMap<ContainerKind, TypeDescriptor>,
}

impl RegistryBuilder {
    pub fn class(mut self, class: impl Constructible + 'static) -> Self {
        self.classes.insert(class.name().clone(), Box::new(class));
        self
    }

    pub fn enumeration(mut self, name: impl Into<String>, variants: &[&str]) -> Self {
        let name = name.into();
        let variants = variants.iter().map(|v| v.to_string()).collect();
        self.enums.insert(name.clone(), EnumType { name, variants });
        self
    }

    pub fn metadata(mut self, class: impl Into<ClassName>, metadata: ClassMetadata) -> Self {
        self.metadata.push((class.into(), metadata));
        self
    }

    pub fn default_item(mut self, kind: ContainerKind, item: TypeDescriptor) -> Self {
        self.default_items.insert(kind, item);
        self
    }

    /// The enum table so far; class declarations parse their types against it.
    pub fn enums(&self) -> &IndexMap<String, EnumType> {
        &self.enums
    }

    pub fn build(self) -> Result<Registry> {
        for class in self.classes.values() {
            if let Some(parent) = class.parent() {
                if !self.classes.contains_key(parent) {
                    return Err(Error::Registry(format!(
                        "`{}` extends unregistered `{parent}`",
                        class.name()
                    )));
                }
            }
            let mut seen = HashSet::new();
            let mut current = Some(class.name());
            while let Some(name) = current {
                if !seen.insert(name) {
                    return Err(Error::Registry(format!("inheritance cycle through `{name}`")));
                }
                current = self.classes.get(name).and_then(|c| c.parent());
            }
        }
        let mut metadata = ClassMetadataRegistry::default();
        for (class, meta) in self.metadata {
            if !self.classes.contains_key(&class) {
                return Err(Error::Registry(format!("metadata for unregistered `{class}`")));
            }
            metadata.insert(class, meta);
        }
        tracing::debug!(
            classes = self.classes.len(),
            enums = self.enums.len(),
            "registry built"
        );
        Ok(Registry {
            classes: self.classes,
            enums: self.enums,
            metadata,
            default_items: self.default_items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        Registry::builder()
            .class(ClassDef::new("Element").abstract_().param("id_short", TypeDescriptor::string()))
            .class(
                ClassDef::new("Property")
                    .extends("Element")
                    .param("id_short", TypeDescriptor::string())
                    .param_default("value", TypeDescriptor::optional(TypeDescriptor::string()), Value::None),
            )
            .class(
                ClassDef::new("Collection")
                    .extends("Element")
                    .param("id_short", TypeDescriptor::string())
                    .param_default("value_", TypeDescriptor::list_of(TypeDescriptor::class("Element")), Value::List(vec![])),
            )
            .class(ClassDef::opaque("Blob").extends("Element"))
            .metadata("Element", ClassMetadata::default().label("Add element"))
            .metadata("Collection", ClassMetadata::default().attribute("value_", "value").children("value"))
            .default_item(ContainerKind::Set, TypeDescriptor::string())
            .build()
            .unwrap()
    }

    #[test]
    fn lineage_walks_parents() {
        let reg = registry();
        assert_eq!(
            reg.lineage(&"Property".into()),
            vec![ClassName::new("Property"), ClassName::new("Element")]
        );
        assert!(reg.is_subclass(&"Collection".into(), &"Element".into()));
    }

    #[test]
    fn metadata_and_labels_inherit() {
        let reg = registry();
        assert_eq!(reg.add_action_label(&"Property".into()), "Add element");
        assert_eq!(
            reg.lookup_metadata(&"Collection".into()).children_attribute.as_deref(),
            Some("value")
        );
    }

    #[test]
    fn subclasses_skip_abstract_and_opaque_types() {
        let reg = registry();
        let choices = reg.subclasses(&TypeDescriptor::class("Element"));
        assert_eq!(choices, vec![ClassName::new("Property"), ClassName::new("Collection")]);
    }

    #[test]
    fn bare_containers_fall_back_to_registered_item_types() {
        let reg = registry();
        assert_eq!(
            reg.item_descriptor(&TypeDescriptor::bare(ContainerKind::Set)).unwrap(),
            TypeDescriptor::string()
        );
        assert!(matches!(
            reg.item_descriptor(&TypeDescriptor::bare(ContainerKind::List)),
            Err(Error::AmbiguousArity { .. })
        ));
        assert_eq!(
            reg.item_descriptor(&TypeDescriptor::class("Collection")).unwrap(),
            TypeDescriptor::class("Element")
        );
    }

    #[test]
    fn build_rejects_dangling_parents_and_cycles() {
        let dangling = Registry::builder().class(ClassDef::new("A").extends("Missing")).build();
        assert!(matches!(dangling, Err(Error::Registry(_))));

        let cycle = Registry::builder()
            .class(ClassDef::new("A").extends("B"))
            .class(ClassDef::new("B").extends("A"))
            .build();
        assert!(matches!(cycle, Err(Error::Registry(_))));
    }

    #[test]
    fn validators_reject_construction() {
        let def = ClassDef::new("Positive")
            .param("n", TypeDescriptor::int())
            .validator(|args| match args.get("n") {
                Some(Value::Int(n)) if *n > 0 => Ok(()),
                _ => Err("n must be positive".into()),
            });
        let mut args = BoundArgs::default();
        args.push("n", "n", Value::Int(-1));
        assert!(matches!(def.construct(args), Err(Error::Construction { .. })));
    }

    #[test]
    fn construction_leaves_argument_parents_alone() {
        let reg = registry();
        let child = ObjectRef::new("Property".into(), IndexMap::new());
        let mut args = BoundArgs::default();
        args.push("id_short", "id_short", Value::str("c"));
        args.push("value_", "value", Value::List(vec![Value::Object(child.clone())]));
        let built = reg.class(&"Collection".into()).unwrap().construct(args).unwrap();
        assert_eq!(built.as_object().unwrap().get("value"), Some(Value::List(vec![Value::Object(child.clone())])));
        assert!(child.parent().is_none());
    }
}
