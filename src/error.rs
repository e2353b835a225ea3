use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::domain::Stage;

#[derive(Debug, Error, Diagnostic)]
pub enum CatalogError {
    #[error("remote root folder id is not configured")]
    #[diagnostic(help("set it with `moth-cat settings set-root <FOLDER_ID>`"))]
    MissingRootFolder,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("no accepted rows found in {0}")]
    NoValidRows(String),

    #[error("taxon not found in index: {0}")]
    TaxonNotFound(String),

    #[error("catalog entry not found: {0}")]
    EntryNotFound(String),

    #[error("photo set not found: {0}")]
    PhotoSetNotFound(String),

    #[error("photo not found: {0}")]
    PhotoNotFound(String),

    #[error("invalid entry code: {0}")]
    InvalidEntryCode(String),

    #[error("invalid life stage: {0}")]
    InvalidStage(String),

    #[error("invalid gender: {0}")]
    InvalidGender(String),

    #[error("gender only applies to adult photos, not {0}")]
    GenderNotApplicable(Stage),

    #[error("drive request failed: {0}")]
    DriveHttp(String),

    #[error("drive returned status {status}: {message}")]
    DriveStatus { status: u16, message: String },

    #[error("failed to read photo {path}: {message}")]
    PhotoRead { path: String, message: String },

    #[error("stored {key} is unreadable: {message}")]
    StoreCorrupt { key: String, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("export failed: {0}")]
    Export(String),
}
