//! docforge - template inference and mass generation for structured documents.
//!
//! Upload one XML, JSON or CSV document and docforge infers a reusable
//! template from it: a generic node tree, the repeating groups it contains,
//! one typed setting per scalar field and the value relations between
//! fields. Each field gets a generation rule (same, fixed, increment,
//! random or list) and the engine re-expands the template into any number
//! of synthetic documents, optionally packed into a zip archive.
//!
//! # Architecture
//!
//! ```text
//!   bytes ──> parser ──> ParsedDocument ──> DocumentSession ──> generate
//!             (xml/          (tree,            (edits,           (engine,
//!              json/          fields,           presets,          archive)
//!              csv)           loops,            templates)
//!                             relations)
//!                                                  │
//!                                              Registry
//!                                          (templates, presets)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use docforge::pipeline::DocumentSession;
//!
//! # fn main() -> Result<(), docforge::error::DocforgeError> {
//! let mut session = DocumentSession::from_text(
//!     "orders.xml",
//!     "<orders><order><id>1</id></order><order><id>2</id></order></orders>",
//! )?;
//! let files = session.generate(10)?;
//! assert_eq!(files.len(), 10);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod generate;
pub mod model;
pub mod parser;
pub mod path;
pub mod pipeline;
pub mod registry;
pub mod relations;
pub mod tree;

// =============================================================================
// Re-exports
// =============================================================================

// Errors
pub use error::{DocforgeError, DocforgeResult, GenerateError, ParseError, RegistryError};

// Core model
pub use model::{
    DataFormat, FieldKind, FieldMode, FieldSetting, ListScope, LoopSetting, Node, ParsedDocument,
    Relation, TemplatePayload,
};

// Pipeline
pub use generate::{GenerateOptions, GeneratedFile};
pub use pipeline::DocumentSession;
pub use registry::{Preset, Registry, TemplateSummary};
