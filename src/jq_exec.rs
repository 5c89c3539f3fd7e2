//! jq reshaping of rows documents, via `jaq`.
use jaq_core::{compile::Undefined, load, Compiler, Ctx, RcIter};
use jaq_json::Val;
use serde_json::Value;

use crate::error::{Error, Result};

/// Runs `filter_src` over `input`; every output becomes one JSON document.
pub fn run_jaq(filter_src: &str, input: &Value) -> Result<Vec<Value>> {
    let loader = load::Loader::new(jaq_std::defs().chain(jaq_json::defs()));
    let arena = load::Arena::default();
    let program = load::File { code: filter_src, path: () };

    let modules = loader
        .load(&arena, program)
        .map_err(format_parse_errors)?;

    let filter = Compiler::default()
        .with_funs(jaq_std::funs().chain(jaq_json::funs()))
        .compile(modules)
        .map_err(format_undefined_errors)?;

    let inputs = RcIter::new(core::iter::empty());
    let mut it = filter.run((Ctx::new([], &inputs), Val::from(input.clone())));

    let mut out = Vec::new();
    while let Some(item) = it.next() {
        let v = item.map_err(|e| Error::Jq(format!("{e:?}")))?;
        // Val renders as JSON text
        out.push(serde_json::from_str(&v.to_string())?);
    }
    tracing::debug!(filter = filter_src, outputs = out.len(), "ran jq filter");
    Ok(out)
}

fn format_parse_errors(errs: Vec<(load::File<&str, ()>, load::Error<&str>)>) -> Error {
    let mut s = String::new();
    for (file, err) in errs {
        s.push_str(&format!("parse error: {err:?} in `{}`\n", file.code));
    }
    Error::Jq(s.trim_end().to_string())
}

fn format_undefined_errors(errs: Vec<(load::File<&str, ()>, Vec<(&str, Undefined)>)>) -> Error {
    let mut s = String::new();
    for (file, list) in errs {
        for (name, undef) in list {
            s.push_str(&format!("undefined `{name}`: {undef:?} in `{}`\n", file.code));
        }
    }
    Error::Jq(s.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn each_output_is_a_document() {
        let input = json!({"data": [{"A": "1"}, {"A": "2"}]});
        let out = run_jaq(".data[]", &input).unwrap();
        assert_eq!(out, vec![json!({"A": "1"}), json!({"A": "2"})]);
    }

    #[test]
    fn broken_filters_are_errors() {
        assert!(matches!(run_jaq(".[", &json!(null)), Err(Error::Jq(_))));
    }
}
