//! Error types for the docforge template and generation pipeline.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`ParseError`] - malformed XML/JSON/CSV input
//! - [`GenerateError`] - generation failures (uniqueness exhaustion, bad tree shape)
//! - [`RegistryError`] - template/preset store errors
//! - [`DocforgeError`] - top-level orchestration errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// Parse Errors
// =============================================================================

/// Errors while parsing an uploaded document.
///
/// XML and JSON variants carry a best-effort position string
/// (`"line 3, col 17"`) where the underlying parser reports one.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    /// Malformed XML.
    #[error("XML parse error: {0}")]
    XmlParse(String),

    /// Malformed JSON.
    #[error("JSON parse error: {0}")]
    JsonParse(String),

    /// Malformed CSV (empty document, unreadable header, bad quoting).
    #[error("CSV parse error: {0}")]
    CsvParse(String),

    /// Input bytes could not be decoded to text.
    #[error("Failed to decode input: {0}")]
    Encoding(String),
}

impl ParseError {
    /// Build a position-carrying detail string shared by XML and JSON parsers.
    pub fn at(line: usize, col: usize) -> String {
        format!("line {}, col {}", line, col)
    }
}

// =============================================================================
// Generation Errors
// =============================================================================

/// Errors raised by the generation engine.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// A random-mode field exhausted its distinct-value space or retry budget.
    ///
    /// Aborts the whole run; no partial archive is produced.
    #[error("Cannot produce unique values for field '{field}'")]
    UniqueValuesExhausted { field: String },

    /// No parsed document is loaded.
    #[error("No document loaded")]
    MissingRoot,

    /// CSV generation requires a single repeating row group at the root.
    #[error("Invalid CSV structure: {0}")]
    CsvShape(String),

    /// Serializing a CSV row failed.
    #[error("CSV write error: {0}")]
    CsvWrite(#[from] csv::Error),

    /// Writing the output archive failed.
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// IO error while materializing output.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Registry Errors
// =============================================================================

/// Errors from the template/preset registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Template not found.
    #[error("Template not found: {0}")]
    NotFound(String),

    /// Preset not found.
    #[error("Preset not found: {0}")]
    PresetNotFound(String),

    /// Registry IO error.
    #[error("Registry IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Registry JSON error.
    #[error("Registry JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Top-level Errors
// =============================================================================

/// Top-level error for session orchestration and the CLI.
#[derive(Debug, Error)]
pub enum DocforgeError {
    /// Parse error.
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Generation error.
    #[error("Generation error: {0}")]
    Generate(#[from] GenerateError),

    /// Registry error.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid caller input (bad format tag, bad settings file).
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for parse operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Result type for generation operations.
pub type GenerateResult<T> = Result<T, GenerateError>;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Result type for top-level operations.
pub type DocforgeResult<T> = Result<T, DocforgeError>;
