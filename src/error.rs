use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("Resource not found in any container: {name}")]
    NotFound { name: String },
    #[error("Resource {name} is offered by {count} containers")]
    Ambiguous { name: String, count: usize },
    #[error("Malformed record in {source_name}: {message}")]
    MalformedRecord { source_name: String, message: String },
    #[error("Failed writing {}: {message}", .path.display())]
    WriteFailed { path: PathBuf, message: String },
    #[error("Cannot map {} into the repository layout", .path.display())]
    UnresolvablePath { path: PathBuf },
    #[error("Schema repository {} already extracted", .path.display())]
    AlreadyExtracted { path: PathBuf },
    #[error("Schema extraction failed: {0}")]
    ExtractionFailed(Box<DirectoryError>),
    #[error("Schema load failed: {}", describe_load_errors(.errors))]
    SchemaLoadFailed { errors: Vec<String> },
    #[error("Directory service failed to start: {0}")]
    StartupFailed(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Container error: {0}")]
    Container(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {message}")]
    Parse { message: String, line: Option<usize>, col: Option<usize> },
    #[error("Internal invariant violated: {0}")]
    Invariant(String),
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

fn describe_load_errors(errors: &[String]) -> String {
    if errors.is_empty() { "no schema loaded".to_string() } else { errors.join("; ") }
}

pub type Result<T> = std::result::Result<T, DirectoryError>;

// Helper conversions
impl From<rusqlite::Error> for DirectoryError {
    fn from(e: rusqlite::Error) -> Self { Self::Persistence(e.to_string()) }
}
impl From<config::ConfigError> for DirectoryError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
impl From<zip::result::ZipError> for DirectoryError {
    fn from(e: zip::result::ZipError) -> Self { Self::Container(e.to_string()) }
}
impl<T> From<std::sync::PoisonError<T>> for DirectoryError {
    fn from(e: std::sync::PoisonError<T>) -> Self { Self::Lock(e.to_string()) }
}
