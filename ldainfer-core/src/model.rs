use hashbrown::HashMap;
use tracing::debug;

use crate::encoder::CorpusEncoder;
use crate::meta::Meta;
use crate::types::*;

/// Frozen word-topic counts and global topic totals.
///
/// The summary lives as long as the session. Rows are copied in by
/// [`TopicModel::init`] for the words of the current request only and dropped
/// again by [`TopicModel::clear_table`]. Nothing here is written while workers
/// run, so it is shared between them by plain reference.
#[derive(Debug)]
pub struct TopicModel {
    num_topics: usize,
    num_vocabs: usize,
    summary: Vec<i64>,
    table: HashMap<WordId, Vec<TopicCount>>,
}

impl TopicModel {
    pub fn from_encoder(encoder: &CorpusEncoder) -> Self {
        TopicModel {
            num_topics: encoder.num_topics(),
            num_vocabs: encoder.num_vocabs(),
            summary: encoder.summary().to_vec(),
            table: HashMap::new(),
        }
    }

    pub fn init(&mut self, encoder: &CorpusEncoder, meta: &Meta) {
        self.table.clear();
        for word in meta.words() {
            let mut row = encoder.topics(word).to_vec();
            row.sort_by_key(|tc| tc.topic);
            // fold repeated topics of one row
            row.dedup_by(|next, kept| {
                if next.topic == kept.topic {
                    kept.count += next.count;
                    true
                } else {
                    false
                }
            });
            self.table.insert(word, row);
        }
        debug!(words = self.table.len(), "word-topic table initialised");
    }

    pub fn clear_table(&mut self) {
        self.table.clear();
    }

    pub fn num_topics(&self) -> usize {
        self.num_topics
    }

    pub fn num_vocabs(&self) -> usize {
        self.num_vocabs
    }

    pub fn contains(&self, word: WordId) -> bool {
        self.table.contains_key(&word)
    }

    pub fn words(&self) -> impl Iterator<Item = WordId> + '_ {
        self.table.keys().copied()
    }

    /// Sparse row of `word`, ascending by topic.
    ///
    /// Panics if `word` is not part of the current request.
    pub fn topics_of(&self, word: WordId) -> &[TopicCount] {
        match self.table.get(&word) {
            Some(row) => row,
            None => panic!("word {word} is not in the local word-topic table"),
        }
    }

    #[inline]
    pub fn word_topic_count(&self, word: WordId, topic: TopicId) -> i32 {
        let row = self.topics_of(word);
        match row.binary_search_by_key(&topic, |tc| tc.topic) {
            Ok(i) => row[i].count,
            Err(_) => 0,
        }
    }

    #[inline]
    pub fn global_topic_total(&self, topic: TopicId) -> i64 {
        self.summary[topic as usize]
    }

    pub fn summary(&self) -> &[i64] {
        &self.summary
    }
}
