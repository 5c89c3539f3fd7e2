use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use preforge::config::EngineConfig;
use preforge::hint::TypeDescriptor;
use preforge::import::Importer;
use preforge::mapping_file::MappingFile;
use preforge::placeholder::MemoryWorkbook;
use preforge::registry::schema::load_registry;
use preforge::tree::TreeModel;
use preforge::value::{EnumValue, Slot, Value};
use preforge::worker;

const REGISTRY: &str = r#"{
    "enums": { "Status": ["Draft", "Released"] },
    "classes": [
        { "name": "Part", "params": [
            { "name": "name", "type": "Str" },
            { "name": "weight", "type": "Float" },
            { "name": "released", "type": "Optional[Date]", "default": null },
            { "name": "status", "type": "Status", "default": "Draft" },
            { "name": "tags", "type": "ListOf[Str]", "default": [] }
        ] }
    ]
}"#;

const MAPPING: &str = r#"{
    "ModelReference(type=Part, key=(Key(type=Catalog, value=\"parts\")))": {
        "name": "$A$",
        "weight": "$B$",
        "released": "$C$",
        "status": "$D$"
    }
}"#;

const ROWS: &str = r#"{
    "Parts": [
        { "A": "bolt", "B": "0.25", "C": "2021-01-01", "D": "released" },
        { "A": "nut", "B": 1, "C": "", "D": "Draft" },
        { "A": "washer", "B": "heavy", "C": "2022-03-04", "D": "Draft" }
    ]
}"#;

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn fixture_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("preforge-e2e-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn rows_file_to_objects_to_edits() {
    let dir = fixture_dir();
    let registry = load_registry(write(&dir, "registry.json", REGISTRY)).unwrap();
    let mapping = MappingFile::load(write(&dir, "mapping.json", MAPPING)).unwrap();
    let rows = write(&dir, "rows.json", ROWS);

    let documents = worker::spawn_rows_loader(vec![rows], None).unwrap().wait().unwrap();
    assert_eq!(documents.len(), 1);
    let book = MemoryWorkbook::from_json(&documents[0].json).unwrap();

    let config = EngineConfig::default();
    let importer = Importer::new(&registry, &config, &mapping).unwrap();
    let report = importer.import_workbook(&book, Some("Parts")).unwrap();

    assert_eq!(report.rows.len(), 3);
    assert_eq!(report.failed(), 0);
    // "heavy" is not a float: tolerated, kept raw
    assert_eq!(report.rows[2].problems.len(), 1);
    assert!(report.rows[0].problems.is_empty());
    assert!(report.rows[1].problems.is_empty());

    let bolt = report.rows[0].result.as_ref().unwrap().as_object().unwrap().clone();
    assert_eq!(bolt.get("name"), Some(Value::str("bolt")));
    assert_eq!(bolt.get("weight"), Some(Value::float(0.25)));
    assert_eq!(bolt.get("released"), Some(Value::from(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap())));
    assert_eq!(bolt.get("status"), Some(Value::Enum(EnumValue::new("Status", "Released"))));
    assert_eq!(bolt.get("tags"), Some(Value::List(vec![])));

    let nut = report.rows[1].result.as_ref().unwrap().as_object().unwrap().clone();
    assert_eq!(nut.get("weight"), Some(Value::float(1.0)));
    assert_eq!(nut.get("released"), Some(Value::None));

    // edit the imported object through the tree model
    let mut tree = TreeModel::new(Value::Object(bolt.clone()), TypeDescriptor::class("Part"), &registry, &config);
    tree.expand(tree.root()).unwrap();
    let tags = tree.find(&[Slot::Attr("tags".into())]).unwrap();
    tree.add_child(tags, Value::str("metric")).unwrap();
    let weight = tree.find(&[Slot::Attr("weight".into())]).unwrap();
    tree.set_value(weight, Value::float(0.3)).unwrap();
    assert!(tree.set_value(weight, Value::str("light")).is_err());

    assert_eq!(bolt.get("tags"), Some(Value::List(vec![Value::str("metric")])));
    assert!(tree.undo().unwrap());
    assert!(tree.undo().unwrap());
    assert!(!tree.undo().unwrap());
    assert_eq!(bolt.get("weight"), Some(Value::float(0.25)));
    assert_eq!(bolt.get("tags"), Some(Value::List(vec![])));
}

#[test]
fn jq_reshapes_rows_before_import() {
    let dir = fixture_dir();
    let registry = load_registry(write(&dir, "registry-jq.json", REGISTRY)).unwrap();
    let mapping = MappingFile::load(write(&dir, "mapping-jq.json", MAPPING)).unwrap();
    let rows = write(
        &dir,
        "wrapped.json",
        r#"{"export": {"items": [{"A": "pin", "B": "2", "D": "Draft"}]}}"#,
    );

    let documents = worker::spawn_rows_loader(vec![rows], Some(".export.items".into()))
        .unwrap()
        .wait()
        .unwrap();
    let book = MemoryWorkbook::from_json(&documents[0].json).unwrap();
    let config = EngineConfig::default();
    let report = Importer::new(&registry, &config, &mapping)
        .unwrap()
        .import_workbook(&book, None)
        .unwrap();

    assert_eq!(report.rows.len(), 1);
    assert!(report.rows[0].is_ok());
    // column C is absent: reported, not fatal
    assert_eq!(report.rows[0].problems.len(), 1);
}
