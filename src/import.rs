//! Batch import: one template per mapping-file entry, materialized once per
//! spreadsheet row.
//!
//! Problems are collected instead of aborting the batch. A row that fails to
//! materialize records its error; tolerated field problems (missing columns,
//! failed casts) ride along with the successful value.
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::mapping_file::{MappingFile, ObjectReference};
use crate::placeholder::{MemoryWorkbook, Row, Workbook};
use crate::preobject::{FieldProblem, MaterializeContext, PreObject};
use crate::registry::Registry;
use crate::value::{ClassName, Value};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// A mapping-file entry turned into a fillable pre-object.
#[derive(Debug, Clone)]
pub struct PreparedTemplate {
    pub reference: ObjectReference,
    pub class: ClassName,
    pub template: PreObject,
}

#[derive(Debug)]
pub struct RowOutcome {
    pub reference: ObjectReference,
    pub sheet: String,
    /// 1-based.
    pub row_number: usize,
    pub result: Result<Value>,
    pub problems: Vec<FieldProblem>,
}

impl RowOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Default)]
pub struct ImportReport {
    pub rows: Vec<RowOutcome>,
}

impl ImportReport {
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.rows.iter().filter_map(|r| r.result.as_ref().ok())
    }

    pub fn succeeded(&self) -> usize {
        self.rows.iter().filter(|r| r.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.rows.len() - self.succeeded()
    }

    pub fn problem_count(&self) -> usize {
        self.rows.iter().map(|r| r.problems.len()).sum()
    }

    /// No failed rows and no tolerated problems.
    pub fn is_clean(&self) -> bool {
        self.failed() == 0 && self.problem_count() == 0
    }

    pub fn extend(&mut self, other: ImportReport) {
        self.rows.extend(other.rows);
    }
}

pub struct Importer<'a> {
    registry: &'a Registry,
    config: &'a EngineConfig,
    templates: Vec<PreparedTemplate>,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

/// Builds the template for `reference` and applies its column mapping.
pub fn prepare_template(
    reference: &ObjectReference,
    mapping: &serde_json::Value,
    registry: &Registry,
) -> Result<PreparedTemplate> {
    let class = reference.target_type().ok_or_else(|| Error::ReferenceSyntax {
        input: reference.to_string(),
        reason: "reference names no type".into(),
    })?;
    let class = ClassName::new(class);
    let mut template = PreObject::template(&class, registry)?;
    template.apply_mapping(mapping, registry)?;
    Ok(PreparedTemplate { reference: reference.clone(), class, template })
}

impl<'a> Importer<'a> {
    /// Prepares every entry of `mapping`. Setup problems are fatal: nothing
    /// gets imported against a broken mapping file.
    pub fn new(registry: &'a Registry, config: &'a EngineConfig, mapping: &MappingFile) -> Result<Self> {
        let templates = mapping
            .iter()
            .map(|(reference, entry)| prepare_template(reference, entry, registry))
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(templates = templates.len(), "prepared import templates");
        Ok(Self { registry, config, templates })
    }

    pub fn templates(&self) -> &[PreparedTemplate] {
        &self.templates
    }

    /// Materializes every template against every row of `sheet`.
    pub fn import_sheet(&self, book: &dyn Workbook, sheet: &str) -> ImportReport {
        let mut report = ImportReport::default();
        for row_number in 1..=book.row_count(sheet) {
            for prepared in &self.templates {
                let mut ctx = MaterializeContext::new(self.registry, self.config).with_workbook(book, sheet, row_number);
                let result = prepared.template.materialize(&mut ctx);
                if let Err(error) = &result {
                    tracing::warn!(sheet, row_number, class = %prepared.class, %error, "row failed to import");
                }
                report.rows.push(RowOutcome {
                    reference: prepared.reference.clone(),
                    sheet: sheet.to_string(),
                    row_number,
                    result,
                    problems: ctx.take_problems(),
                });
            }
        }
        tracing::debug!(sheet, rows = report.rows.len(), failed = report.failed(), "imported sheet");
        report
    }

    /// Imports `sheet` if given, otherwise every sheet of `book` in order.
    pub fn import_workbook(&self, book: &dyn Workbook, sheet: Option<&str>) -> Result<ImportReport> {
        let Some(sheet) = sheet else {
            let mut report = ImportReport::default();
            for name in book.sheet_names() {
                report.extend(self.import_sheet(book, &name));
            }
            return Ok(report);
        };
        if !book.sheet_names().iter().any(|name| name == sheet) {
            return Err(Error::InvalidPath { path: format!("sheet `{sheet}`") });
        }
        Ok(self.import_sheet(book, sheet))
    }

    /// Imports loose rows as one unnamed sheet.
    pub fn import_rows(&self, rows: Vec<Row>) -> ImportReport {
        let mut book = MemoryWorkbook::new();
        book.insert_sheet(crate::placeholder::DEFAULT_SHEET, rows);
        self.import_sheet(&book, crate::placeholder::DEFAULT_SHEET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hint::TypeDescriptor;
    use crate::mapping_file::Key;
    use crate::registry::ClassDef;
    use serde_json::json;

    fn registry() -> Registry {
        Registry::builder()
            .class(
                ClassDef::new("Reading")
                    .param("sensor", TypeDescriptor::string())
                    .param("value", TypeDescriptor::float())
                    .param_default("unit", TypeDescriptor::string(), Value::str("C")),
            )
            .build()
            .unwrap()
    }

    fn mapping() -> MappingFile {
        let mut file = MappingFile::new();
        file.insert(
            ObjectReference::model("Reading", vec![Key::new("Sensor", "s1")]),
            json!({"sensor": "$A$", "value": "$B$"}),
        );
        file
    }

    #[test]
    fn each_row_materializes_the_template() {
        let reg = registry();
        let config = EngineConfig::default();
        let importer = Importer::new(&reg, &config, &mapping()).unwrap();
        let book = MemoryWorkbook::from_json(&json!([
            {"A": "north", "B": "21.5"},
            {"A": "south", "B": 19},
        ]))
        .unwrap();

        let report = importer.import_workbook(&book, None).unwrap();
        assert_eq!(report.rows.len(), 2);
        assert!(report.is_clean());
        let second = report.rows[1].result.as_ref().unwrap().as_object().unwrap().clone();
        assert_eq!(report.rows[1].row_number, 2);
        assert_eq!(second.get("sensor"), Some(Value::str("south")));
        assert_eq!(second.get("value"), Some(Value::float(19.0)));
        assert_eq!(second.get("unit"), Some(Value::str("C")));
    }

    #[test]
    fn field_problems_do_not_stop_the_batch() {
        let reg = registry();
        let config = EngineConfig::default();
        let importer = Importer::new(&reg, &config, &mapping()).unwrap();
        let report = importer.import_rows(vec![
            [("A".to_string(), Value::str("east"))].into_iter().collect(),
            [("A".to_string(), Value::str("west")), ("B".to_string(), Value::str("1.5"))].into_iter().collect(),
        ]);
        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[0].problems.len(), 1);
        assert!(matches!(report.rows[0].problems[0].error, Error::ColumnNotFound { .. }));
        assert!(report.rows[1].problems.is_empty());
        assert!(report.rows[1].is_ok());
    }

    #[test]
    fn strict_typecast_fails_the_row() {
        let reg = registry();
        let config = EngineConfig { strict_typecast: true, ..EngineConfig::default() };
        let importer = Importer::new(&reg, &config, &mapping()).unwrap();
        let report = importer.import_rows(vec![
            [("A".to_string(), Value::str("x")), ("B".to_string(), Value::str("warm"))].into_iter().collect(),
        ]);
        assert_eq!(report.failed(), 1);
    }

    #[test]
    fn broken_mappings_fail_setup() {
        let reg = registry();
        let config = EngineConfig::default();
        let mut file = MappingFile::new();
        file.insert(ObjectReference::model("Reading", vec![]), json!({"nope": {"deeper": "$A$"}}));
        assert!(matches!(Importer::new(&reg, &config, &file), Err(Error::UnknownParameter { .. })));

        let mut file = MappingFile::new();
        file.insert(ObjectReference::model("Missing", vec![]), json!({}));
        assert!(Importer::new(&reg, &config, &file).is_err());
    }

    #[test]
    fn unknown_sheet_is_rejected() {
        let reg = registry();
        let config = EngineConfig::default();
        let importer = Importer::new(&reg, &config, &mapping()).unwrap();
        let book = MemoryWorkbook::from_json(&json!({"Data": []})).unwrap();
        assert!(importer.import_workbook(&book, Some("Other")).is_err());
        assert!(importer.import_workbook(&book, Some("Data")).unwrap().rows.is_empty());
    }
}
