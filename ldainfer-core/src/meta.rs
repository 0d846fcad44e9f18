//! Per-block local vocabularies and their slice watermarks.

use tracing::debug;

use crate::error::{InferError, Result};
use crate::types::WordId;

/// Distinct words of a block (ascending), their frequencies, and the slice
/// watermarks computed by [`Meta::init`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocalVocab {
    words: Vec<WordId>,
    global_tf: Vec<i32>,
    local_tf: Vec<i32>,
    last_words: Vec<WordId>,
}

impl LocalVocab {
    pub fn from_parts(words: Vec<WordId>, global_tf: Vec<i32>, local_tf: Vec<i32>) -> Result<Self> {
        if words.len() != global_tf.len() || words.len() != local_tf.len() {
            return Err(InferError::CorruptBlock(format!(
                "vocabulary arrays differ in length: {} words, {} global tf, {} local tf",
                words.len(),
                global_tf.len(),
                local_tf.len()
            )));
        }
        if words.windows(2).any(|w| w[0] >= w[1]) {
            return Err(InferError::CorruptBlock("vocabulary words are not strictly ascending".into()));
        }
        Ok(LocalVocab { words, global_tf, local_tf, last_words: Vec::new() })
    }

    /// Union of several vocabularies, local frequencies summed.
    pub fn merge<'a>(vocabs: impl IntoIterator<Item = &'a LocalVocab>) -> LocalVocab {
        let mut entries: Vec<(WordId, i32, i32)> = vocabs
            .into_iter()
            .flat_map(|v| (0..v.len()).map(move |i| (v.words[i], v.global_tf[i], v.local_tf[i])))
            .collect();
        entries.sort_by_key(|e| e.0);
        let mut merged = LocalVocab::default();
        for (word, global, local) in entries {
            if merged.words.last() == Some(&word) {
                if let Some(tf) = merged.local_tf.last_mut() {
                    *tf += local;
                }
            } else {
                merged.push(word, global, local);
            }
        }
        merged
    }

    pub(crate) fn push(&mut self, word: WordId, global_tf: i32, local_tf: i32) {
        self.words.push(word);
        self.global_tf.push(global_tf);
        self.local_tf.push(local_tf);
    }

    pub(crate) fn bump_last_local_tf(&mut self) {
        if let Some(tf) = self.local_tf.last_mut() {
            *tf += 1;
        }
    }

    pub(crate) fn clear(&mut self) {
        self.words.clear();
        self.global_tf.clear();
        self.local_tf.clear();
        self.last_words.clear();
    }

    /// Cuts the vocabulary into slices whose summed local frequency stays
    /// within `token_budget`. A single word heavier than the budget gets a
    /// slice of its own.
    pub fn partition(&mut self, token_budget: usize) {
        self.last_words.clear();
        let mut volume = 0usize;
        for i in 0..self.words.len() {
            let tf = self.local_tf[i].max(0) as usize;
            if volume > 0 && volume + tf > token_budget {
                self.last_words.push(self.words[i - 1]);
                volume = 0;
            }
            volume += tf;
        }
        if let Some(&last) = self.words.last() {
            self.last_words.push(last);
        }
    }

    pub fn words(&self) -> &[WordId] {
        &self.words
    }

    pub fn global_tf(&self) -> &[i32] {
        &self.global_tf
    }

    pub fn local_tf(&self) -> &[i32] {
        &self.local_tf
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn num_slice(&self) -> usize {
        self.last_words.len()
    }

    /// Highest word id processed in `slice`.
    pub fn last_word(&self, slice: usize) -> WordId {
        self.last_words[slice]
    }
}

/// Slice layout of every block of one inference request.
#[derive(Debug, Default)]
pub struct Meta {
    local_vocabs: Vec<LocalVocab>,
}

impl Meta {
    pub fn init(&mut self, vocabs: Vec<LocalVocab>, token_budget: usize) {
        self.local_vocabs = vocabs;
        for (block, vocab) in self.local_vocabs.iter_mut().enumerate() {
            vocab.partition(token_budget);
            debug!(block, words = vocab.len(), slices = vocab.num_slice(), "vocabulary partitioned");
        }
    }

    pub fn clear(&mut self) {
        self.local_vocabs.clear();
    }

    pub fn num_blocks(&self) -> usize {
        self.local_vocabs.len()
    }

    pub fn local_vocab(&self, block: usize) -> &LocalVocab {
        &self.local_vocabs[block]
    }

    pub fn slice_count(&self, block: usize) -> usize {
        self.local_vocabs[block].num_slice()
    }

    pub fn last_word_of_slice(&self, block: usize, slice: usize) -> WordId {
        self.local_vocabs[block].last_word(slice)
    }

    /// Every word used by any block, ascending and deduplicated.
    pub fn words(&self) -> Vec<WordId> {
        let mut words: Vec<WordId> = self
            .local_vocabs
            .iter()
            .flat_map(|v| v.words().iter().copied())
            .collect();
        words.sort_unstable();
        words.dedup();
        words
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab(words: &[WordId], local: &[i32]) -> LocalVocab {
        LocalVocab::from_parts(words.to_vec(), vec![1; words.len()], local.to_vec()).unwrap()
    }

    #[test]
    fn whole_vocabulary_fits_one_slice() {
        let mut v = vocab(&[1, 4, 9], &[2, 3, 1]);
        v.partition(100);
        assert_eq!(v.num_slice(), 1);
        assert_eq!(v.last_word(0), 9);
    }

    #[test]
    fn slices_respect_budget_and_cover_all_words() {
        let mut v = vocab(&[0, 2, 3, 5, 8], &[2, 2, 1, 4, 1]);
        v.partition(4);
        let marks: Vec<WordId> = (0..v.num_slice()).map(|s| v.last_word(s)).collect();
        assert_eq!(marks, vec![2, 3, 5, 8]);
        assert!(marks.windows(2).all(|w| w[0] < w[1]));
        assert!(*marks.last().unwrap() >= *v.words().last().unwrap());
    }

    #[test]
    fn heavy_word_gets_its_own_slice() {
        let mut v = vocab(&[1, 2, 3], &[1, 10, 1]);
        v.partition(3);
        let marks: Vec<WordId> = (0..v.num_slice()).map(|s| v.last_word(s)).collect();
        assert_eq!(marks, vec![1, 2, 3]);
    }

    #[test]
    fn empty_vocabulary_has_no_slices() {
        let mut v = LocalVocab::default();
        v.partition(10);
        assert_eq!(v.num_slice(), 0);
    }

    #[test]
    fn merge_sums_local_frequencies() {
        let a = LocalVocab::from_parts(vec![0, 3], vec![5, 7], vec![2, 1]).unwrap();
        let b = LocalVocab::from_parts(vec![1, 3], vec![4, 7], vec![1, 4]).unwrap();
        let m = LocalVocab::merge([&a, &b]);
        assert_eq!(m.words(), &[0, 1, 3]);
        assert_eq!(m.global_tf(), &[5, 4, 7]);
        assert_eq!(m.local_tf(), &[2, 1, 5]);
    }

    #[test]
    fn from_parts_rejects_unsorted_words() {
        assert!(LocalVocab::from_parts(vec![3, 1], vec![0, 0], vec![1, 1]).is_err());
        assert!(LocalVocab::from_parts(vec![1], vec![0, 0], vec![1]).is_err());
    }

    #[test]
    fn meta_exposes_slices_per_block() {
        let mut meta = Meta::default();
        meta.init(vec![vocab(&[0, 1], &[1, 1]), vocab(&[1, 6], &[3, 3])], 3);
        assert_eq!(meta.num_blocks(), 2);
        assert_eq!(meta.slice_count(0), 1);
        assert_eq!(meta.slice_count(1), 2);
        assert_eq!(meta.last_word_of_slice(1, 0), 1);
        assert_eq!(meta.last_word_of_slice(1, 1), 6);
        assert_eq!(meta.words(), vec![0, 1, 6]);
    }
}
