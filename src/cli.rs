//! Command line: inspect → template → import
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;

use preforge::config::EngineConfig;
use preforge::import::{ImportReport, Importer};
use preforge::introspect::{self, IntrospectOptions};
use preforge::mapping_file::{MappingFile, ObjectReference};
use preforge::placeholder::{self, MemoryWorkbook};
use preforge::preobject::PreObject;
use preforge::registry::{Registry, schema::load_registry};
use preforge::value::ClassName;
use preforge::worker;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// build typed objects from spreadsheet rows through a declared class registry
#[derive(Parser, Debug)]
pub struct CommandLineInterface {
    /// log at debug level (RUST_LOG takes precedence when set)
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// print the constructor parameters of registered classes
    Inspect(InspectOut),
    /// print the mapping skeleton for a class
    Template(TemplateOut),
    /// materialize mapped objects for every row of the input files
    Import(ImportOut),
}

#[derive(Args, Debug, Clone)]
struct RegistrySettings {
    /// JSON registry file declaring classes, enums and metadata
    #[arg(long, short)]
    registry: PathBuf,
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// JQ pre-process filter for each rows document.
    #[arg(long)]
    jq_expr: Option<String>,

    /// One or more rows files. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,

    /// only import this sheet (default: every sheet)
    #[arg(long)]
    sheet: Option<String>,
}

#[derive(clap::Parser, Debug)]
struct InspectOut {
    #[command(flatten)]
    registry_settings: RegistrySettings,

    /// only this class (default: every registered class)
    #[arg(long, short)]
    class: Option<String>,

    /// drop parameters that have a default
    #[arg(long, default_value_t = false)]
    required_only: bool,
}

#[derive(clap::Parser, Debug)]
struct TemplateOut {
    #[command(flatten)]
    registry_settings: RegistrySettings,

    #[arg(long, short)]
    class: String,

    /// output mapping .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct ImportOut {
    #[command(flatten)]
    registry_settings: RegistrySettings,

    #[command(flatten)]
    input_settings: InputSettings,

    /// column-mapping .json file
    #[arg(long, short)]
    mapping: PathBuf,

    /// engine config .json file
    #[arg(long)]
    config: Option<PathBuf>,

    /// fail rows on typecast problems instead of keeping the raw value
    #[arg(long, default_value_t = false)]
    strict: bool,

    /// extra chrono date format, tried before the built-in ones
    #[arg(long = "date-format")]
    date_formats: Vec<String>,

    /// output .json file for the materialized objects (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl RegistrySettings {
    fn load(&self) -> anyhow::Result<Registry> {
        load_registry(&self.registry)
            .with_context(|| format!("failed to load registry {}", self.registry.display()))
    }
}

impl InputSettings {
    /// Parses every input on a background task and hands back one workbook
    /// per rows document.
    fn load_workbooks(&self) -> anyhow::Result<Vec<(PathBuf, MemoryWorkbook)>> {
        let source_paths = resolve_file_path_patterns(&self.input)?;
        let task = worker::spawn_rows_loader(source_paths, self.jq_expr.clone())?;
        let documents = task.wait().context("failed to load rows files")?;
        documents
            .into_iter()
            .map(|doc| {
                let book = MemoryWorkbook::from_json(&doc.json)
                    .with_context(|| format!("malformed rows document in {}", doc.source.display()))?;
                Ok((doc.source, book))
            })
            .collect()
    }
}

impl ImportOut {
    fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => EngineConfig::default(),
        };
        if self.strict {
            config.strict_typecast = true;
        }
        if !self.date_formats.is_empty() {
            let mut formats = self.date_formats.clone();
            formats.append(&mut config.date_formats);
            config.date_formats = formats;
        }
        Ok(config)
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn run(&self) -> anyhow::Result<()> {
        match &self.cmd {
            Command::Inspect(target) => {
                let registry = target.registry_settings.load()?;
                let classes: Vec<ClassName> = match &target.class {
                    Some(class) => vec![ClassName::new(class.as_str())],
                    None => registry.class_names().cloned().collect(),
                };
                let options = IntrospectOptions { required_only: target.required_only, ..IntrospectOptions::default() };
                for class in classes {
                    match introspect::introspect(&class, &registry, options) {
                        Ok(params) => {
                            println!("{}", class.as_str().bold());
                            for param in params {
                                let default = match &param.default_value {
                                    Some(value) => format!(" = {value}"),
                                    None => String::new(),
                                };
                                println!("  {}: {}{}", param.name, param.ty.display_name().cyan(), default.dimmed());
                            }
                        }
                        Err(error) if target.class.is_none() => {
                            println!("{} {}", class.as_str().bold(), format!("(read-only: {error})").dimmed());
                        }
                        Err(error) => return Err(error.into()),
                    }
                }
                Ok(())
            }
            Command::Template(target) => {
                let registry = target.registry_settings.load()?;
                let class = ClassName::new(target.class.as_str());
                let template = placeholder_skeleton(&class, &registry)?;
                let mut file = MappingFile::new();
                file.insert(ObjectReference::model(target.class.as_str(), Vec::new()), template.extract_mapping());
                match target.out.as_ref() {
                    Some(out) => file.save(out)?,
                    None => println!("{}", serde_json::to_string_pretty(&file.to_json())?),
                }
                Ok(())
            }
            Command::Import(target) => {
                let registry = target.registry_settings.load()?;
                let config = target.engine_config()?;
                let mapping = MappingFile::load(&target.mapping)
                    .with_context(|| format!("failed to load mapping {}", target.mapping.display()))?;
                let importer = Importer::new(&registry, &config, &mapping)?;

                let mut report = ImportReport::default();
                for (source, book) in target.input_settings.load_workbooks()? {
                    let sheet = target.input_settings.sheet.as_deref();
                    let part = importer
                        .import_workbook(&book, sheet)
                        .with_context(|| format!("cannot import {}", source.display()))?;
                    report.extend(part);
                }

                let values: Vec<serde_json::Value> = report.values().map(|v| v.to_json()).collect();
                let output = serde_json::to_string_pretty(&values)?;
                match target.out.as_ref() {
                    Some(out) => write_file(out, &output)?,
                    None => println!("{output}"),
                }
                print_report(&report);
                if report.failed() > 0 {
                    bail!("{} of {} rows failed to import", report.failed(), report.rows.len());
                }
                Ok(())
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

/// The class template with one column token per scalar parameter, assigned
/// left to right.
fn placeholder_skeleton(class: &ClassName, registry: &Registry) -> anyhow::Result<PreObject> {
    let mut template = PreObject::template(class, registry)?;
    let params = introspect::introspect(class, registry, IntrospectOptions::default())?;
    let mut columns = (0..).map_while(placeholder::column_name);
    for param in params {
        if template.param(&param.name).is_some_and(PreObject::is_pending) {
            continue;
        }
        let Some(column) = columns.next() else {
            bail!("`{class}` has more parameters than addressable columns");
        };
        template.set_param(param.name, PreObject::literal(placeholder::token(&column)));
    }
    Ok(template)
}

fn write_file(out: &Path, contents: &str) -> anyhow::Result<()> {
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(out, contents)?;
    Ok(())
}

fn print_report(report: &ImportReport) {
    for row in &report.rows {
        let label = format!("{}:{} {}", row.sheet, row.row_number, row.reference);
        match &row.result {
            Ok(_) if row.problems.is_empty() => eprintln!("{} {label}", "✔".green()),
            Ok(_) => eprintln!("{} {label}", "⚠".yellow()),
            Err(error) => eprintln!("{} {label}: {}", "✘".red(), error.to_string().red()),
        }
        for problem in &row.problems {
            eprintln!("    {} {}", problem.location.dimmed(), problem.error.to_string().yellow());
        }
    }
    eprintln!(
        "{} rows: {} ok, {} failed, {} field problems",
        report.rows.len(),
        report.succeeded().to_string().green(),
        report.failed().to_string().red(),
        report.problem_count().to_string().yellow(),
    );
}

fn resolve_file_path_patterns<I>(patterns: I) -> anyhow::Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{'))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let mut matched_any = false;
            for entry in glob::glob(pattern)? {
                out.push(entry?);
                matched_any = true;
            }
            if !matched_any {
                bail!("glob pattern matched no files: {pattern}");
            }
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}
