use std::path::PathBuf;

use thiserror::Error;

use crate::types::{TopicId, WordId};

/// Everything that can stop a load or an inference call.
///
/// Sampling invariant violations are not represented here: they panic.
#[derive(Error, Debug)]
pub enum InferError {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}:{line_no}: invalid line {line:?}: {reason}", path.display())]
    MalformedLine {
        path: PathBuf,
        line_no: usize,
        line: String,
        reason: String,
    },

    #[error("{}:{line_no}: duplicate word id {word_id}", path.display())]
    DuplicateWordId {
        path: PathBuf,
        line_no: usize,
        word_id: WordId,
    },

    #[error("{}:{line_no}: duplicate word {word:?}", path.display())]
    DuplicateWord {
        path: PathBuf,
        line_no: usize,
        word: String,
    },

    #[error("{}:{line_no}: word id {word_id} outside [0, {num_vocabs})", path.display())]
    WordIdOutOfRange {
        path: PathBuf,
        line_no: usize,
        word_id: WordId,
        num_vocabs: usize,
    },

    #[error("{}:{line_no}: topic id {topic} outside [0, {num_topics})", path.display())]
    TopicOutOfRange {
        path: PathBuf,
        line_no: usize,
        topic: TopicId,
        num_topics: usize,
    },

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("corrupt block data: {0}")]
    CorruptBlock(String),

    #[error("block {requested} requested while block {resident} is still resident")]
    BlockResident { requested: usize, resident: usize },

    #[error("block {0} is not resident")]
    BlockNotResident(usize),
}

pub type Result<T> = std::result::Result<T, InferError>;

impl InferError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        InferError::Io { path: path.into(), source }
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, line_no: usize, line: &str, reason: impl Into<String>) -> Self {
        InferError::MalformedLine {
            path: path.into(),
            line_no,
            line: line.to_string(),
            reason: reason.into(),
        }
    }
}
