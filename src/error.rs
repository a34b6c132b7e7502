use crate::base::Token;

/// Every way a tokenizer operation can fail.
///
/// `train`/`encode`/`decode`/`save`/`load` never panic on caller-reachable
/// input; they return one of these instead.
#[derive(Debug, thiserror::Error)]
pub enum TokenizerError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("bad model file magic: {0}")]
    BadMagic(String),

    #[error("malformed model file: {0}")]
    BadFormat(String),

    #[error("vocab conflict: {0}")]
    VocabConflict(String),

    #[error("unknown token id: {0}")]
    UnknownId(Token),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
