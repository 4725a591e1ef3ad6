use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClaimsError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Intake error: {0}")]
    Intake(#[from] IntakeError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] SpreadsheetError),

    #[error("Model error: {0}")]
    Llm(#[from] crate::llm::LlmError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job {id} is still {status}")]
    JobNotTerminal {
        id: String,
        status: crate::job::JobStatus,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Invalid value '{value}' for environment variable {name}")]
    InvalidEnvOverride { name: String, value: String },

    #[error("API key could not be resolved: {0}")]
    Secret(#[from] crate::secrets::SecretError),
}

/// Rejections at upload time. None of these leave a job or a stored file behind.
#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("No file was provided")]
    MissingFile,

    #[error("Uploaded file has no filename")]
    MissingFilename,

    #[error("Unsupported file type '{extension}'. Allowed types: {allowed}")]
    UnsupportedExtension { extension: String, allowed: String },

    #[error("File is {size} bytes, which exceeds the {limit} byte upload limit")]
    TooLarge { size: u64, limit: u64 },

    #[error("Uploaded file is empty")]
    Empty,
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to delete file '{path}': {source}")]
    DeleteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File already exists: {0}")]
    FileExists(PathBuf),

    #[error("Invalid file reference: {0}")]
    InvalidReference(String),

    #[error("Stored file not found: {0}")]
    NotFound(String),
}

#[derive(Error, Debug)]
pub enum SpreadsheetError {
    #[error("Unsupported spreadsheet format: {0}")]
    UnsupportedFormat(String),

    #[error("File encoding not supported. Please save the file as UTF-8")]
    Encoding,

    #[error("Failed to parse CSV: {0}")]
    Csv(String),

    #[error("Failed to parse XLSX: {0}")]
    Xlsx(String),

    #[error("The spreadsheet contains no data rows")]
    Empty,
}

pub type Result<T> = std::result::Result<T, ClaimsError>;
