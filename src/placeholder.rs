//! Spreadsheet references inside string fields.
//!
//! A token is `$` + one or two upper-case column letters + `$`. A string that
//! is exactly one token is a *pure* reference and resolves to the cell value
//! as is. Tokens embedded in other text make a *composite* reference; each is
//! replaced by the cell's text and the result stays a string.
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};
use crate::value::Value;

static TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$([A-Z]{1,2})\$").expect("token pattern is valid"));

/// One spreadsheet row, keyed by column letter.
pub type Row = IndexMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder<'a> {
    None,
    /// The whole string is this column's token.
    Pure(&'a str),
    Composite,
}

pub fn is_placeholder(s: &str) -> bool {
    TOKEN.is_match(s)
}

pub fn classify(s: &str) -> Placeholder<'_> {
    let mut tokens = TOKEN.captures_iter(s);
    let Some(first) = tokens.next() else {
        return Placeholder::None;
    };
    let whole = first.get(0).is_some_and(|m| m.start() == 0 && m.end() == s.len());
    match first.get(1) {
        Some(column) if whole => Placeholder::Pure(column.as_str()),
        _ => Placeholder::Composite,
    }
}

/// Column letters referenced by `s`, in order of appearance.
pub fn columns(s: &str) -> Vec<&str> {
    TOKEN
        .captures_iter(s)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

/// Column name → token text, the inverse of [`classify`] for pure references.
pub fn token(column: &str) -> String {
    format!("${column}$")
}

/// Spreadsheet column letters for a 0-based index: `A`..`Z`, then `AA`..`ZZ`.
/// `None` past the two-letter range tokens can address.
pub fn column_name(index: usize) -> Option<String> {
    let letter = |i: usize| char::from(b'A' + (i % 26) as u8);
    match index {
        0..26 => Some(letter(index).to_string()),
        26..702 => {
            let rest = index - 26;
            Some([letter(rest / 26), letter(rest)].iter().collect())
        }
        _ => None,
    }
}

// ————————————————————————————————————————————————————————————————————————————
// RESOLUTION
// ————————————————————————————————————————————————————————————————————————————

fn resolve_with(s: &str, cell: impl Fn(&str) -> Option<Value>) -> Result<Value> {
    let missing = |column: &str| Error::ColumnNotFound { column: column.to_string() };
    match classify(s) {
        Placeholder::None => Ok(Value::str(s)),
        Placeholder::Pure(column) => cell(column).ok_or_else(|| missing(column)),
        Placeholder::Composite => {
            let mut out = String::with_capacity(s.len());
            let mut last = 0;
            for caps in TOKEN.captures_iter(s) {
                let (Some(whole), Some(column)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                let value = cell(column.as_str()).ok_or_else(|| missing(column.as_str()))?;
                out.push_str(&s[last..whole.start()]);
                out.push_str(&value.to_cell_text());
                last = whole.end();
            }
            out.push_str(&s[last..]);
            Ok(Value::Str(out))
        }
    }
}

/// Resolves `s` against one row. Non-placeholder strings come back unchanged.
pub fn resolve_against_row(s: &str, row: &Row) -> Result<Value> {
    resolve_with(s, |column| row.get(column).cloned())
}

/// Resolves `s` against row `row_number` (1-based, first data row is 1) of
/// `sheet` in `workbook`.
pub fn resolve_against_workbook(
    s: &str,
    workbook: &dyn Workbook,
    sheet: &str,
    row_number: usize,
) -> Result<Value> {
    resolve_with(s, |column| workbook.cell(sheet, row_number, column))
}

// ————————————————————————————————————————————————————————————————————————————
// WORKBOOKS
// ————————————————————————————————————————————————————————————————————————————

/// Read access to tabular data with named sheets.
pub trait Workbook {
    fn sheet_names(&self) -> Vec<String>;

    fn row_count(&self, sheet: &str) -> usize;

    fn cell(&self, sheet: &str, row_number: usize, column: &str) -> Option<Value>;
}

/// Sheets of rows held in memory, usually parsed from a JSON rows file.
#[derive(Debug, Clone, Default)]
pub struct MemoryWorkbook {
    sheets: IndexMap<String, Vec<Row>>,
}

pub const DEFAULT_SHEET: &str = "Sheet1";

impl MemoryWorkbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_sheet(&mut self, name: impl Into<String>, rows: Vec<Row>) {
        self.sheets.insert(name.into(), rows);
    }

    pub fn rows(&self, sheet: &str) -> Option<&[Row]> {
        self.sheets.get(sheet).map(Vec::as_slice)
    }

    /// Accepts either an array of row objects (stored as [`DEFAULT_SHEET`]) or
    /// an object of sheet name → array of row objects.
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        let mut book = Self::new();
        match json {
            serde_json::Value::Array(_) => book.insert_sheet(DEFAULT_SHEET, rows_from_json(DEFAULT_SHEET, json)?),
            serde_json::Value::Object(sheets) => {
                for (name, rows) in sheets {
                    book.insert_sheet(name.clone(), rows_from_json(name, rows)?);
                }
            }
            other => {
                return Err(Error::type_mismatch("array of rows or object of sheets", &Value::from_json(other)));
            }
        }
        Ok(book)
    }
}

/// Rows from a JSON array of objects keyed by column letter.
pub fn rows_from_json(sheet: &str, json: &serde_json::Value) -> Result<Vec<Row>> {
    let serde_json::Value::Array(items) = json else {
        return Err(Error::type_mismatch(format!("array of rows for sheet `{sheet}`"), &Value::from_json(json)));
    };
    items
        .iter()
        .map(|item| match item {
            serde_json::Value::Object(cells) => Ok(cells
                .iter()
                .map(|(column, cell)| (column.clone(), Value::from_json(cell)))
                .collect()),
            other => Err(Error::type_mismatch("row object", &Value::from_json(other))),
        })
        .collect()
}

impl Workbook for MemoryWorkbook {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.keys().cloned().collect()
    }

    fn row_count(&self, sheet: &str) -> usize {
        self.sheets.get(sheet).map_or(0, Vec::len)
    }

    fn cell(&self, sheet: &str, row_number: usize, column: &str) -> Option<Value> {
        let rows = self.sheets.get(sheet)?;
        let row = rows.get(row_number.checked_sub(1)?)?;
        row.get(column).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[(&str, Value)]) -> Row {
        cells.iter().map(|(c, v)| (c.to_string(), v.clone())).collect()
    }

    #[test]
    fn column_names_cover_two_letters() {
        assert_eq!(column_name(0).as_deref(), Some("A"));
        assert_eq!(column_name(25).as_deref(), Some("Z"));
        assert_eq!(column_name(26).as_deref(), Some("AA"));
        assert_eq!(column_name(701).as_deref(), Some("ZZ"));
        assert_eq!(column_name(702), None);
        assert!(is_placeholder(&token(&column_name(27).unwrap())));
    }

    #[test]
    fn classifies_pure_and_composite_references() {
        assert_eq!(classify("$A$"), Placeholder::Pure("A"));
        assert_eq!(classify("$AB$"), Placeholder::Pure("AB"));
        assert_eq!(classify("x$A$"), Placeholder::Composite);
        assert_eq!(classify("$A$$B$"), Placeholder::Composite);
        assert_eq!(classify("$ABC$"), Placeholder::None);
        assert_eq!(classify("$a$"), Placeholder::None);
        assert_eq!(classify("plain"), Placeholder::None);
        assert!(!is_placeholder("$$"));
        assert_eq!(columns("val=$A$,$B$"), ["A", "B"]);
    }

    #[test]
    fn pure_reference_keeps_cell_type() {
        let r = row(&[("A", Value::str("5")), ("B", Value::Int(7))]);
        assert_eq!(resolve_against_row("$A$", &r).unwrap(), Value::str("5"));
        assert_eq!(resolve_against_row("$B$", &r).unwrap(), Value::Int(7));
    }

    #[test]
    fn composite_reference_splices_cell_text() {
        let r = row(&[("A", Value::str("1")), ("B", Value::str("2")), ("C", Value::None)]);
        assert_eq!(resolve_against_row("val=$A$,$B$", &r).unwrap(), Value::str("val=1,2"));
        assert_eq!(resolve_against_row("[$C$]", &r).unwrap(), Value::str("[]"));
        assert_eq!(resolve_against_row("no refs", &r).unwrap(), Value::str("no refs"));
    }

    #[test]
    fn missing_column_is_reported() {
        let r = row(&[("A", Value::str("1"))]);
        assert!(matches!(
            resolve_against_row("$A$-$Z$", &r),
            Err(Error::ColumnNotFound { column }) if column == "Z"
        ));
    }

    #[test]
    fn workbook_rows_are_one_based() {
        let json = serde_json::json!({"Parts": [{"A": "first"}, {"A": "second"}]});
        let book = MemoryWorkbook::from_json(&json).unwrap();
        assert_eq!(book.sheet_names(), ["Parts"]);
        assert_eq!(book.row_count("Parts"), 2);
        assert_eq!(resolve_against_workbook("$A$", &book, "Parts", 2).unwrap(), Value::str("second"));
        assert!(resolve_against_workbook("$A$", &book, "Parts", 0).is_err());
        assert!(resolve_against_workbook("$A$", &book, "Other", 1).is_err());
    }
}
