//! Ordered constructor parameters per registered class.
use crate::error::Result;
use crate::hint::TypeDescriptor;
use crate::registry::Registry;
use crate::value::{ClassName, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct ConstructorParam {
    pub name: String,
    pub ty: TypeDescriptor,
    pub has_default: bool,
    pub default_value: Option<Value>,
    /// Attribute the constructed object stores this parameter under.
    pub mapped_attribute: String,
}

impl ConstructorParam {
    /// Whether `name` addresses this parameter: the parameter name itself, its
    /// trailing-underscore-stripped form, or the mapped attribute name.
    pub fn answers_to(&self, name: &str) -> bool {
        self.name == name
            || self.name.trim_end_matches('_') == name
            || self.mapped_attribute == name
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntrospectOptions {
    /// Drop parameters that have a default.
    pub required_only: bool,
    /// Keep parameters the class metadata hides.
    pub keep_hidden: bool,
    /// Drop parameters whose type is `Optional`.
    pub strip_optional: bool,
}

impl IntrospectOptions {
    /// Every parameter, hidden ones included.
    pub fn all() -> Self {
        Self { keep_hidden: true, ..Self::default() }
    }

    pub fn required_only() -> Self {
        Self { required_only: true, ..Self::default() }
    }
}

/// Constructor parameters of `class`: required first, then defaulted, each
/// group in declaration order.
pub fn introspect(class: &ClassName, registry: &Registry, options: IntrospectOptions) -> Result<Vec<ConstructorParam>> {
    let declared = registry.class(class)?.signature()?;
    let meta = registry.lookup_metadata(class);

    let mut params: Vec<ConstructorParam> = declared
        .into_iter()
        .filter(|p| options.keep_hidden || !meta.is_hidden(&p.name))
        .map(|p| ConstructorParam {
            mapped_attribute: meta.attribute_for(&p.name).to_string(),
            has_default: p.default.is_some(),
            default_value: p.default,
            ty: p.ty,
            name: p.name,
        })
        .filter(|p| !(options.required_only && p.has_default))
        .filter(|p| !(options.strip_optional && p.ty.is_optional()))
        .collect();
    params.sort_by_key(|p| p.has_default);
    Ok(params)
}

/// The parameter of `params` that `name` resolves to.
pub fn find_param<'a>(params: &'a [ConstructorParam], name: &str) -> Option<&'a ConstructorParam> {
    params
        .iter()
        .find(|p| p.name == name)
        .or_else(|| params.iter().find(|p| p.answers_to(name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::registry::{ClassDef, ClassMetadata};

    fn registry() -> Registry {
        Registry::builder()
            .class(
                ClassDef::new("Foo")
                    .param_default("b", TypeDescriptor::optional(TypeDescriptor::string()), Value::None)
                    .param("a", TypeDescriptor::int()),
            )
            .class(
                ClassDef::new("Entity")
                    .param("id_", TypeDescriptor::string())
                    .param_default("kind", TypeDescriptor::string(), Value::str("Instance"))
                    .param("parent", TypeDescriptor::optional(TypeDescriptor::class("Entity"))),
            )
            .class(ClassDef::opaque("Blob"))
            .metadata(
                "Entity",
                ClassMetadata::default()
                    .hide("parent")
                    .hide_with_default("kind", Value::str("CoManaged"))
                    .attribute("id_", "id"),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn required_only_keeps_params_without_default() {
        let reg = registry();
        let params = introspect(&"Foo".into(), &reg, IntrospectOptions::required_only()).unwrap();
        assert_eq!(
            params,
            vec![ConstructorParam {
                name: "a".into(),
                ty: TypeDescriptor::int(),
                has_default: false,
                default_value: None,
                mapped_attribute: "a".into(),
            }]
        );
    }

    #[test]
    fn required_params_come_first() {
        let reg = registry();
        let names: Vec<_> = introspect(&"Foo".into(), &reg, IntrospectOptions::default())
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn hidden_params_are_stripped_unless_kept() {
        let reg = registry();
        let visible = introspect(&"Entity".into(), &reg, IntrospectOptions::default()).unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].mapped_attribute, "id");

        let all = introspect(&"Entity".into(), &reg, IntrospectOptions::all()).unwrap();
        let names: Vec<_> = all.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["id_", "parent", "kind"]);

        let opts = IntrospectOptions { strip_optional: true, ..IntrospectOptions::all() };
        let stripped = introspect(&"Entity".into(), &reg, opts).unwrap();
        assert!(stripped.iter().all(|p| p.name != "parent"));
    }

    #[test]
    fn aliases_resolve_to_the_canonical_param() {
        let reg = registry();
        let params = introspect(&"Entity".into(), &reg, IntrospectOptions::all()).unwrap();
        assert_eq!(find_param(&params, "id").map(|p| p.name.as_str()), Some("id_"));
        assert_eq!(find_param(&params, "id_").map(|p| p.name.as_str()), Some("id_"));
        assert!(find_param(&params, "nope").is_none());
    }

    #[test]
    fn opaque_and_unknown_types_fail_introspection() {
        let reg = registry();
        for class in ["Blob", "Missing"] {
            assert!(matches!(
                introspect(&class.into(), &reg, IntrospectOptions::default()),
                Err(Error::Introspection { .. })
            ));
        }
    }
}
