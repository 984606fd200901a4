// Per-file failure classification

use thiserror::Error;

use crate::lang::Language;

/// Why a single file could not be extracted. The run keeps going; the
/// message is what the run report groups failures by.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("no grammar available for {0}")]
    UnsupportedLanguage(Language),

    #[error("failed to load {language} grammar: {message}")]
    Grammar { language: Language, message: String },

    #[error("{language} parser produced no syntax tree")]
    Parse { language: Language },

    #[error("failed to read file: {0}")]
    Read(#[from] std::io::Error),
}
