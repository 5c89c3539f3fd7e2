//! Parser for the textual form produced by [`TypeDescriptor::display_name`].
//!
//! `Optional[ListOf[Int]]`, `DictOf[Str, Key]`, `TypeOf[SubmodelElement]`.
//! Identifiers that are neither built-in shapes nor registered enums are
//! taken as class names.
use indexmap::IndexMap;

use super::{ContainerKind, EnumType, ScalarKind, TypeDescriptor};
use crate::error::{Error, Result};

pub fn parse_descriptor(input: &str, enums: &IndexMap<String, EnumType>) -> Result<TypeDescriptor> {
    let mut parser = Parser { input, pos: 0, enums };
    let ty = parser.ty()?;
    parser.skip_ws();
    if parser.pos != input.len() {
        return Err(parser.error("trailing input"));
    }
    Ok(ty)
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    enums: &'a IndexMap<String, EnumType>,
}

impl<'a> Parser<'a> {
    fn error(&self, reason: &str) -> Error {
        Error::TypeSyntax {
            input: self.input.to_string(),
            reason: format!("{reason} at offset {}", self.pos),
        }
    }

    fn skip_ws(&mut self) {
        let rest = &self.input[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.input[self.pos..].starts_with(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> Result<&'a str> {
        self.skip_ws();
        let input = self.input;
        let rest = &input[self.pos..];
        let len = rest
            .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '.'))
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(self.error("expected a type name"));
        }
        self.pos += len;
        Ok(&rest[..len])
    }

    fn args(&mut self) -> Result<Vec<TypeDescriptor>> {
        let mut out = Vec::new();
        if !self.eat('[') {
            return Ok(out);
        }
        loop {
            out.push(self.ty()?);
            if self.eat(',') {
                continue;
            }
            if self.eat(']') {
                return Ok(out);
            }
            return Err(self.error("expected `,` or `]`"));
        }
    }

    fn scalar(&self, kind: ScalarKind, args: &[TypeDescriptor]) -> Result<TypeDescriptor> {
        if args.is_empty() {
            Ok(TypeDescriptor::Scalar(kind))
        } else {
            Err(self.error("scalar types take no arguments"))
        }
    }

    fn ty(&mut self) -> Result<TypeDescriptor> {
        let name = self.ident()?;
        let args = self.args()?;
        let ty = match name {
            "Any" => TypeDescriptor::Any,
            "None" | "NoneType" => TypeDescriptor::None,
            "Bool" | "bool" => self.scalar(ScalarKind::Bool, &args)?,
            "Int" | "int" => self.scalar(ScalarKind::Int, &args)?,
            "Float" | "float" => self.scalar(ScalarKind::Float, &args)?,
            "Str" | "str" => self.scalar(ScalarKind::Str, &args)?,
            "Bytes" | "bytes" => self.scalar(ScalarKind::Bytes, &args)?,
            "Date" | "date" => self.scalar(ScalarKind::Date, &args)?,
            "DateTime" | "datetime" => self.scalar(ScalarKind::DateTime, &args)?,
            "Optional" => match <[TypeDescriptor; 1]>::try_from(args) {
                Ok([inner]) => TypeDescriptor::optional(inner),
                Err(_) => return Err(self.error("Optional takes one argument")),
            },
            "Union" => {
                if args.is_empty() {
                    return Err(self.error("Union needs at least one argument"));
                }
                TypeDescriptor::union(args)
            }
            "TypeOf" | "Type" => match <[TypeDescriptor; 1]>::try_from(args) {
                Ok([bound]) => TypeDescriptor::type_of(bound),
                Err(_) => return Err(self.error("TypeOf takes one argument")),
            },
            "Pair" => match <[TypeDescriptor; 2]>::try_from(args) {
                Ok([k, v]) => TypeDescriptor::Pair(Box::new(k), Box::new(v)),
                Err(_) => return Err(self.error("Pair takes two arguments")),
            },
            // arity is checked lazily by `item_descriptor`
            "ListOf" | "List" | "list" => TypeDescriptor::Container { kind: ContainerKind::List, args },
            "SetOf" | "Set" | "set" => TypeDescriptor::Container { kind: ContainerKind::Set, args },
            "DictOf" | "Dict" | "dict" => TypeDescriptor::Container { kind: ContainerKind::Dict, args },
            other => {
                if !args.is_empty() {
                    return Err(self.error("only built-in generics take arguments"));
                }
                match self.enums.get(other) {
                    Some(e) => TypeDescriptor::Enum(e.clone()),
                    None => TypeDescriptor::class(other),
                }
            }
        };
        Ok(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Result<TypeDescriptor> {
        let mut enums = IndexMap::new();
        enums.insert(
            "Kind".to_string(),
            EnumType { name: "Kind".into(), variants: vec!["A".into(), "B".into()] },
        );
        parse_descriptor(s, &enums)
    }

    #[test]
    fn parses_what_display_name_prints() {
        for text in [
            "Optional[ListOf[Int]]",
            "Union[Str, Key, Int]",
            "DictOf[Str, Float]",
            "TypeOf[SubmodelElement]",
            "SetOf",
            "Kind",
        ] {
            assert_eq!(parse(text).unwrap().display_name(), text);
        }
    }

    #[test]
    fn resolves_enums_and_aliases() {
        assert!(matches!(parse("Kind").unwrap(), TypeDescriptor::Enum(_)));
        assert_eq!(parse("list[int]").unwrap(), TypeDescriptor::list_of(TypeDescriptor::int()));
        assert_eq!(
            parse("Union[str, None]").unwrap(),
            TypeDescriptor::optional(TypeDescriptor::string())
        );
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(parse("Optional[Int, Str]").is_err());
        assert!(parse("ListOf[Int").is_err());
        assert!(parse("Int]").is_err());
        assert!(parse("Key[Int]").is_err());
        assert!(parse("").is_err());
    }
}
