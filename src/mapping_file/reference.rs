//! Structural object references and their canonical text form.
//!
//! `ModelReference(type=Property, key=(Key(type=Submodel, value="urn:a"), Key(type=Property, value="t")))`
//!
//! Parsing is a closed grammar: the only symbols recognised are
//! `ModelReference`, `ExternalReference`, `Key` and the keywords `type`, `key`
//! and `value`. Anything else is rejected. Type names that are not plain words
//! are written as quoted strings, like key values.
use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    ModelReference,
    ExternalReference,
}

impl ReferenceKind {
    pub fn name(self) -> &'static str {
        match self {
            ReferenceKind::ModelReference => "ModelReference",
            ReferenceKind::ExternalReference => "ExternalReference",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key {
    pub ty: String,
    pub value: String,
}

impl Key {
    pub fn new(ty: impl Into<String>, value: impl Into<String>) -> Self {
        Self { ty: ty.into(), value: value.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectReference {
    pub kind: ReferenceKind,
    pub referred_type: Option<String>,
    pub keys: Vec<Key>,
}

impl ObjectReference {
    pub fn model(referred_type: impl Into<String>, keys: Vec<Key>) -> Self {
        Self { kind: ReferenceKind::ModelReference, referred_type: Some(referred_type.into()), keys }
    }

    pub fn external(keys: Vec<Key>) -> Self {
        Self { kind: ReferenceKind::ExternalReference, referred_type: None, keys }
    }

    /// The referred type, or the type of the last key when none is given.
    pub fn target_type(&self) -> Option<&str> {
        self.referred_type
            .as_deref()
            .or_else(|| self.keys.last().map(|k| k.ty.as_str()))
    }

    pub fn parse(input: &str) -> Result<Self> {
        let mut parser = Parser { input, pos: 0 };
        let reference = parser.reference()?;
        parser.skip_ws();
        if parser.pos != input.len() {
            return Err(parser.error("trailing input"));
        }
        Ok(reference)
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.'
}

fn write_quoted(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    f.write_str("\"")?;
    for c in text.chars() {
        if matches!(c, '"' | '\\') {
            f.write_str("\\")?;
        }
        write!(f, "{c}")?;
    }
    f.write_str("\"")
}

fn write_name(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    if !name.is_empty() && name.chars().all(is_word_char) {
        f.write_str(name)
    } else {
        write_quoted(f, name)
    }
}

impl fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.kind.name())?;
        if let Some(ty) = &self.referred_type {
            f.write_str("type=")?;
            write_name(f, ty)?;
            f.write_str(", ")?;
        }
        f.write_str("key=(")?;
        for (i, key) in self.keys.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str("Key(type=")?;
            write_name(f, &key.ty)?;
            f.write_str(", value=")?;
            write_quoted(f, &key.value)?;
            f.write_str(")")?;
        }
        f.write_str("))")
    }
}

impl std::str::FromStr for ObjectReference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ObjectReference::parse(s)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// PARSER
// ————————————————————————————————————————————————————————————————————————————

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, reason: &str) -> Error {
        Error::ReferenceSyntax {
            input: self.input.to_string(),
            reason: format!("{reason} at offset {}", self.pos),
        }
    }

    fn skip_ws(&mut self) {
        let rest = &self.input[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.input[self.pos..].chars().next()
    }

    fn expect(&mut self, c: char) -> Result<()> {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            Ok(())
        } else {
            Err(self.error(&format!("expected `{c}`")))
        }
    }

    fn eat(&mut self, c: char) -> bool {
        self.expect(c).is_ok()
    }

    fn word(&mut self) -> Result<&'a str> {
        self.skip_ws();
        let input = self.input;
        let rest = &input[self.pos..];
        let len = rest.find(|c: char| !is_word_char(c)).unwrap_or(rest.len());
        if len == 0 {
            return Err(self.error("expected a name"));
        }
        self.pos += len;
        Ok(&rest[..len])
    }

    /// A keyword from the whitelist, followed by `=`.
    fn keyword(&mut self, allowed: &[&str]) -> Result<&'a str> {
        let start = self.pos;
        let word = self.word()?;
        if !allowed.contains(&word) {
            self.pos = start;
            return Err(self.error(&format!("unexpected symbol `{word}`")));
        }
        self.expect('=')?;
        Ok(word)
    }

    fn string(&mut self) -> Result<String> {
        self.expect('"')?;
        let mut out = String::new();
        let mut chars = self.input[self.pos..].char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos += i + 1;
                    return Ok(out);
                }
                '\\' => match chars.next() {
                    Some((_, escaped)) => out.push(escaped),
                    None => break,
                },
                c => out.push(c),
            }
        }
        self.pos = self.input.len();
        Err(self.error("unterminated string"))
    }

    /// A type name: a bare word or a quoted string.
    fn name(&mut self) -> Result<String> {
        if self.peek() == Some('"') {
            self.string()
        } else {
            self.word().map(str::to_string)
        }
    }

    fn reference(&mut self) -> Result<ObjectReference> {
        let kind = match self.word()? {
            "ModelReference" => ReferenceKind::ModelReference,
            "ExternalReference" => ReferenceKind::ExternalReference,
            other => return Err(self.error(&format!("unexpected symbol `{other}`"))),
        };
        self.expect('(')?;
        let mut referred_type = None;
        let mut keys = None;
        while self.peek() != Some(')') {
            match self.keyword(&["type", "key"])? {
                "type" if referred_type.is_none() => referred_type = Some(self.name()?),
                "key" if keys.is_none() => keys = Some(self.keys()?),
                other => return Err(self.error(&format!("duplicate `{other}`"))),
            }
            if !self.eat(',') {
                break;
            }
        }
        self.expect(')')?;
        let keys = keys.ok_or_else(|| self.error("missing `key`"))?;
        Ok(ObjectReference { kind, referred_type, keys })
    }

    fn keys(&mut self) -> Result<Vec<Key>> {
        self.expect('(')?;
        let mut keys = Vec::new();
        while self.peek() != Some(')') {
            keys.push(self.key()?);
            if !self.eat(',') {
                break;
            }
        }
        self.expect(')')?;
        Ok(keys)
    }

    fn key(&mut self) -> Result<Key> {
        let start = self.pos;
        let word = self.word()?;
        if word != "Key" {
            self.pos = start;
            return Err(self.error(&format!("unexpected symbol `{word}`")));
        }
        self.expect('(')?;
        self.keyword(&["type"])?;
        let ty = self.name()?;
        self.expect(',')?;
        self.keyword(&["value"])?;
        let value = self.string()?;
        self.eat(',');
        self.expect(')')?;
        Ok(Key { ty, value })
    }
}
