pub mod types;
pub mod error;
pub mod prng;
pub mod text;
pub mod binary;
pub mod encoder;
pub mod meta;
pub mod block;
pub mod stream;
pub mod model;
pub mod alias;
pub mod inferer;
pub mod infer;

pub use error::{InferError, Result};
pub use encoder::CorpusEncoder;
pub use infer::{InferOptions, InferenceSession, Phase};
pub use stream::DocumentStore;
pub use text::{line_tokens, parse_documents, read_file, write_doc_topics};
pub use types::{DocTopics, TopicId, WordId};
