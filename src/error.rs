use thiserror::Error;

#[derive(Error, Debug)]
pub enum LayoutError {
    #[error("Sheet '{0}' was listed for extraction but the workbook has no grid for it")]
    MissingSheet(String),

    #[error("Invalid target column {column} for sheet '{sheet}': columns are 1-based")]
    InvalidTargetColumn { sheet: String, column: usize },

    #[error("Hierarchy invariant violated in sheet '{sheet}' at row {row}: {details}")]
    HierarchyInvariant {
        sheet: String,
        row: usize,
        details: String,
    },

    #[error("Invalid pattern '{pattern}' in keyword group '{group}': {source}")]
    InvalidPattern {
        group: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LayoutError>;
