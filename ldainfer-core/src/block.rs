use hashbrown::HashMap;

use crate::error::{InferError, Result};
use crate::types::*;

/// Sparse topic histogram of one document.
#[derive(Clone, Debug, Default)]
pub struct DocTopicCounter {
    counts: HashMap<TopicId, i32>,
}

impl DocTopicCounter {
    pub fn clear(&mut self) {
        self.counts.clear();
    }

    #[inline]
    pub fn get(&self, topic: TopicId) -> i32 {
        self.counts.get(&topic).copied().unwrap_or(0)
    }

    #[inline]
    pub fn inc(&mut self, topic: TopicId) {
        *self.counts.entry(topic).or_insert(0) += 1;
    }

    #[inline]
    pub fn dec(&mut self, topic: TopicId) {
        match self.counts.get_mut(&topic) {
            Some(c) if *c > 1 => *c -= 1,
            Some(_) => {
                self.counts.remove(&topic);
            }
            None => panic!("topic {topic} has no count to remove"),
        }
    }

    pub fn total(&self) -> i32 {
        self.counts.values().sum()
    }

    /// Non-zero cells, ascending by topic.
    pub fn to_sorted(&self) -> DocTopics {
        let mut out: DocTopics = self.counts.iter().map(|(&t, &c)| (t, c)).collect();
        out.sort_unstable_by_key(|&(t, _)| t);
        out
    }
}

/// Tokens of one document, ascending by word id, plus the slice cursor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Document {
    cursor: usize,
    tokens: Vec<TokenTopic>,
}

impl Document {
    pub fn new(tokens: Vec<TokenTopic>) -> Self {
        Document { cursor: 0, tokens }
    }

    /// Parses `[cursor, w0, t0, w1, t1, ...]`.
    pub fn decode(buf: &[i32]) -> Result<Self> {
        let (&cursor, pairs) = buf
            .split_first()
            .ok_or_else(|| InferError::CorruptBlock("document without cursor slot".into()))?;
        if pairs.len() % 2 != 0 {
            return Err(InferError::CorruptBlock(format!(
                "document body has odd length {}",
                pairs.len()
            )));
        }
        let tokens: Vec<TokenTopic> = pairs
            .chunks_exact(2)
            .map(|p| TokenTopic { word: p[0], topic: p[1] })
            .collect();
        if cursor < 0 || cursor as usize > tokens.len() {
            return Err(InferError::CorruptBlock(format!(
                "cursor {cursor} outside document of {} tokens",
                tokens.len()
            )));
        }
        if tokens.windows(2).any(|t| t[0].word > t[1].word) {
            return Err(InferError::CorruptBlock("document tokens are not sorted by word id".into()));
        }
        Ok(Document { cursor: cursor as usize, tokens })
    }

    pub fn encode_into(&self, out: &mut Vec<i32>) {
        out.push(self.cursor as i32);
        for t in &self.tokens {
            out.push(t.word);
            out.push(t.topic);
        }
    }

    pub fn size(&self) -> usize {
        self.tokens.len()
    }

    #[inline]
    pub fn word(&self, idx: usize) -> WordId {
        self.tokens[idx].word
    }

    #[inline]
    pub fn topic(&self, idx: usize) -> TopicId {
        self.tokens[idx].topic
    }

    #[inline]
    pub fn set_topic(&mut self, idx: usize, topic: TopicId) {
        self.tokens[idx].topic = topic;
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn cursor_mut(&mut self) -> &mut usize {
        &mut self.cursor
    }

    pub fn tokens(&self) -> &[TokenTopic] {
        &self.tokens
    }

    pub fn doc_topic_vector(&self, counter: &mut DocTopicCounter) {
        for t in &self.tokens {
            counter.inc(t.topic);
        }
    }
}

/// Documents materialised together; at most one block is resident at a time.
#[derive(Debug)]
pub struct DataBlock {
    index: usize,
    documents: Vec<Document>,
}

impl DataBlock {
    pub fn new(index: usize, documents: Vec<Document>) -> Self {
        DataBlock { index, documents }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn size(&self) -> usize {
        self.documents.len()
    }

    pub fn get_one_doc(&self, idx: usize) -> &Document {
        &self.documents[idx]
    }

    pub fn get_one_doc_mut(&mut self, idx: usize) -> &mut Document {
        &mut self.documents[idx]
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn documents_mut(&mut self) -> &mut [Document] {
        &mut self.documents
    }

    /// Deals documents round-robin into `n` shards, each tagged with the
    /// documents' positions in the block.
    pub fn into_shards(self, n: usize) -> Vec<Vec<(usize, Document)>> {
        let mut shards: Vec<Vec<(usize, Document)>> = (0..n).map(|_| Vec::new()).collect();
        for (i, doc) in self.documents.into_iter().enumerate() {
            shards[i % n].push((i, doc));
        }
        shards
    }

    /// Inverse of [`DataBlock::into_shards`].
    pub fn from_shards(index: usize, shards: Vec<Vec<(usize, Document)>>) -> Self {
        let mut docs: Vec<(usize, Document)> = shards.into_iter().flatten().collect();
        docs.sort_unstable_by_key(|(i, _)| *i);
        DataBlock { index, documents: docs.into_iter().map(|(_, d)| d).collect() }
    }
}

/// Serialized form of a block: per-document offsets into one flat buffer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockBuffer {
    offsets: Vec<i64>,
    buf: Vec<i32>,
}

impl BlockBuffer {
    pub fn new() -> Self {
        BlockBuffer { offsets: vec![0], buf: Vec::new() }
    }

    pub fn from_parts(offsets: Vec<i64>, buf: Vec<i32>) -> Result<Self> {
        if offsets.first() != Some(&0) {
            return Err(InferError::CorruptBlock("offsets must start at 0".into()));
        }
        if offsets.windows(2).any(|o| o[1] < o[0]) {
            return Err(InferError::CorruptBlock("offsets decrease".into()));
        }
        if offsets.last().copied() != Some(buf.len() as i64) {
            return Err(InferError::CorruptBlock(format!(
                "last offset {:?} does not match buffer length {}",
                offsets.last(),
                buf.len()
            )));
        }
        Ok(BlockBuffer { offsets, buf })
    }

    /// Appends one encoded `[cursor, w0, t0, ...]` document.
    pub fn push_doc(&mut self, doc_buf: &[i32]) {
        self.buf.extend_from_slice(doc_buf);
        self.offsets.push(self.buf.len() as i64);
    }

    pub fn num_docs(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    pub fn offsets(&self) -> &[i64] {
        &self.offsets
    }

    pub fn buf(&self) -> &[i32] {
        &self.buf
    }

    pub fn decode(&self, index: usize) -> Result<DataBlock> {
        let documents = self
            .offsets
            .windows(2)
            .map(|o| Document::decode(&self.buf[o[0] as usize..o[1] as usize]))
            .collect::<Result<Vec<_>>>()?;
        Ok(DataBlock::new(index, documents))
    }

    pub fn encode(block: &DataBlock) -> Self {
        let mut out = BlockBuffer::new();
        let mut doc_buf = Vec::new();
        for doc in block.documents() {
            doc_buf.clear();
            doc.encode_into(&mut doc_buf);
            out.push_doc(&doc_buf);
        }
        out
    }
}
