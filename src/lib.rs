//! Type-descriptor driven object construction.
//!
//! Classes are declared once in a [`registry::Registry`]; from there the
//! engine introspects constructor parameters, builds deferred
//! [`preobject::PreObject`]s, fills them from spreadsheet rows, and mirrors
//! live object graphs in an editable [`tree::TreeModel`] with undo/redo.
pub mod config;
pub mod error;
pub mod hint;
pub mod import;
pub mod introspect;
pub mod jq_exec;
pub mod mapping_file;
pub mod path_de;
pub mod placeholder;
pub mod preobject;
pub mod registry;
pub mod tree;
pub mod value;
pub mod worker;

pub use error::{Error, Result};
