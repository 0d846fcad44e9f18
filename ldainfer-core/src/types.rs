pub type WordId = i32;
pub type TopicId = i32;

pub const MAX_DOC_LENGTH: usize = 8192;

pub const DEFAULT_NUM_TOPICS: usize = 100;
pub const DEFAULT_NUM_ITERATIONS: usize = 100;
pub const DEFAULT_MH_STEPS: usize = 2;
pub const DEFAULT_SLICE_TOKEN_BUDGET: usize = 1 << 20;

pub const DEFAULT_ALPHA: f64 = 0.01;
pub const DEFAULT_BETA: f64 = 0.01;

pub const DICT_FILE: &str = "word_id.dict";
pub const MODEL_FILE: &str = "server_0_table_0.model";

/// One token of an encoded document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TokenTopic {
    pub word: WordId,
    pub topic: TopicId,
}

/// A `(topic, count)` cell of a sparse row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TopicCount {
    pub topic: TopicId,
    pub count: i32,
}

/// Final per-document histogram, ascending by topic.
pub type DocTopics = Vec<(TopicId, i32)>;

#[inline]
pub fn block_file_name(block: usize) -> String {
    format!("block.{block}")
}

#[inline]
pub fn vocab_file_name(block: usize) -> String {
    format!("vocab.{block}")
}
