//! Dictionary/model bootstrap and per-document encoding.
//!
//! A [`CorpusEncoder`] is loaded once per session from two text files:
//!
//! - `word_id.dict`: `word_id \t word \t global_term_frequency`
//! - `server_0_table_0.model`: `word_id topic:freq topic:freq ...`
//!
//! After that, [`CorpusEncoder::encode`] turns one token list at a time into
//! the flat buffer `[cursor, w0, t0, w1, t1, ...]` (sorted by word id) and the
//! document's local vocabulary. Encoding reuses internal scratch buffers, so an
//! encoder serves one document at a time.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use hashbrown::HashMap;
use tracing::info;

use crate::binary;
use crate::error::{InferError, Result};
use crate::meta::LocalVocab;
use crate::text::{read_file, split_fields};
use crate::types::*;

#[derive(Debug)]
pub struct CorpusEncoder {
    num_vocabs: usize,
    num_topics: usize,
    max_doc_length: usize,

    word_ids: HashMap<String, WordId>,
    global_tf: Vec<i32>,
    in_dict: Vec<bool>,

    word_topic_table: Vec<Vec<TopicCount>>,
    dominant_topic: Vec<TopicId>,
    in_model: Vec<bool>,
    topic_summary: Vec<i64>,

    // scratch, overwritten by every encode()
    tokens: Vec<TokenTopic>,
    doc_buf: Vec<i32>,
    vocab: LocalVocab,
}

impl CorpusEncoder {
    pub fn new(num_vocabs: usize, num_topics: usize, max_doc_length: usize) -> Self {
        CorpusEncoder {
            num_vocabs,
            num_topics,
            max_doc_length,
            word_ids: HashMap::new(),
            global_tf: vec![0; num_vocabs],
            in_dict: vec![false; num_vocabs],
            word_topic_table: vec![Vec::new(); num_vocabs],
            dominant_topic: vec![0; num_vocabs],
            in_model: vec![false; num_vocabs],
            topic_summary: vec![0; num_topics],
            tokens: Vec::new(),
            doc_buf: vec![0],
            vocab: LocalVocab::default(),
        }
    }

    /// Loads `word_id.dict` and `server_0_table_0.model` from `input_dir`.
    pub fn from_dir(
        input_dir: &Path,
        num_vocabs: usize,
        num_topics: usize,
        max_doc_length: usize,
    ) -> Result<Self> {
        let mut enc = CorpusEncoder::new(num_vocabs, num_topics, max_doc_length);
        enc.load_dictionary(&input_dir.join(DICT_FILE))?;
        enc.load_pretrained_model(&input_dir.join(MODEL_FILE))?;
        Ok(enc)
    }

    pub fn load_dictionary(&mut self, path: &Path) -> Result<()> {
        let s = read_file(path)?;
        self.parse_dictionary(&s, &path.display().to_string())
    }

    /// Parses dictionary records. Never overwrites an existing id or word.
    pub fn parse_dictionary(&mut self, s: &str, source: &str) -> Result<()> {
        let mut n_words = 0usize;
        for (i, line) in s.lines().enumerate() {
            let line_no = i + 1;
            let fields = split_fields(line, '\t');
            if fields.is_empty() {
                continue;
            }
            if fields.len() != 3 {
                return Err(InferError::malformed(
                    source,
                    line_no,
                    line,
                    format!("expected 3 tab-separated fields, got {}", fields.len()),
                ));
            }
            let word_id: WordId = fields[0]
                .parse()
                .map_err(|_| InferError::malformed(source, line_no, line, "bad word id"))?;
            let word = fields[1];
            let tf: i32 = fields[2]
                .parse()
                .ok()
                .filter(|tf| *tf >= 0)
                .ok_or_else(|| InferError::malformed(source, line_no, line, "bad term frequency"))?;
            let idx = self.check_word_id(word_id, source, line_no)?;

            if self.in_dict[idx] {
                return Err(InferError::DuplicateWordId {
                    path: source.into(),
                    line_no,
                    word_id,
                });
            }
            if self.word_ids.contains_key(word) {
                return Err(InferError::DuplicateWord {
                    path: source.into(),
                    line_no,
                    word: word.to_string(),
                });
            }
            self.in_dict[idx] = true;
            self.global_tf[idx] = tf;
            self.word_ids.insert(word.to_string(), word_id);
            n_words += 1;
        }
        info!(source, words = n_words, "dictionary loaded");
        Ok(())
    }

    pub fn load_pretrained_model(&mut self, path: &Path) -> Result<()> {
        let s = read_file(path)?;
        self.parse_pretrained_model(&s, &path.display().to_string())
    }

    /// Parses word-topic rows, recording each word's dominant topic and the
    /// global per-topic totals.
    pub fn parse_pretrained_model(&mut self, s: &str, source: &str) -> Result<()> {
        let mut n_rows = 0usize;
        for (i, line) in s.lines().enumerate() {
            let line_no = i + 1;
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.is_empty() {
                continue;
            }
            if fields.len() < 2 {
                return Err(InferError::malformed(source, line_no, line, "word has no topics"));
            }
            let word_id: WordId = fields[0]
                .parse()
                .map_err(|_| InferError::malformed(source, line_no, line, "bad word id"))?;
            let idx = self.check_word_id(word_id, source, line_no)?;

            let mut row = Vec::with_capacity(fields.len() - 1);
            let mut best_topic: TopicId = 0;
            let mut best_freq = 0;
            for pair in &fields[1..] {
                let (t, f) = pair.split_once(':').ok_or_else(|| {
                    InferError::malformed(source, line_no, line, format!("bad topic:freq pair {pair:?}"))
                })?;
                let topic: TopicId = t
                    .parse()
                    .map_err(|_| InferError::malformed(source, line_no, line, "bad topic id"))?;
                let count: i32 = f
                    .parse()
                    .ok()
                    .filter(|c| *c >= 0)
                    .ok_or_else(|| InferError::malformed(source, line_no, line, "bad frequency"))?;
                if topic < 0 || topic as usize >= self.num_topics {
                    return Err(InferError::TopicOutOfRange {
                        path: source.into(),
                        line_no,
                        topic,
                        num_topics: self.num_topics,
                    });
                }
                // first topic to reach the max wins ties
                if count > best_freq {
                    best_freq = count;
                    best_topic = topic;
                }
                row.push(TopicCount { topic, count });
            }

            if self.in_model[idx] {
                return Err(InferError::DuplicateWordId {
                    path: source.into(),
                    line_no,
                    word_id,
                });
            }
            for tc in &row {
                self.topic_summary[tc.topic as usize] += tc.count as i64;
            }
            self.in_model[idx] = true;
            self.dominant_topic[idx] = best_topic;
            self.word_topic_table[idx] = row;
            n_rows += 1;
        }
        info!(source, rows = n_rows, topics = self.num_topics, "pretrained model loaded");
        Ok(())
    }

    fn check_word_id(&self, word_id: WordId, source: &str, line_no: usize) -> Result<usize> {
        if word_id < 0 || word_id as usize >= self.num_vocabs {
            return Err(InferError::WordIdOutOfRange {
                path: source.into(),
                line_no,
                word_id,
                num_vocabs: self.num_vocabs,
            });
        }
        Ok(word_id as usize)
    }

    /// Encodes one document into the scratch buffers and returns the number
    /// of tokens kept. Unknown tokens are dropped; at most `max_doc_length`
    /// tokens are kept.
    pub fn encode<S: AsRef<str>>(&mut self, tokens: &[S]) -> usize {
        self.tokens.clear();
        for tok in tokens {
            if self.tokens.len() >= self.max_doc_length {
                break;
            }
            if let Some(&word) = self.word_ids.get(tok.as_ref()) {
                self.tokens.push(TokenTopic { word, topic: 0 });
            }
        }
        // stable: equal ids keep input order
        self.tokens.sort_by_key(|t| t.word);

        self.doc_buf.clear();
        self.doc_buf.push(0); // cursor
        self.vocab.clear();
        let mut prev: Option<WordId> = None;
        for t in &self.tokens {
            self.doc_buf.push(t.word);
            self.doc_buf.push(t.topic);
            if prev != Some(t.word) {
                self.vocab.push(t.word, self.global_tf[t.word as usize], 0);
                prev = Some(t.word);
            }
            self.vocab.bump_last_local_tf();
        }
        self.tokens.len()
    }

    /// `[cursor, w0, t0, w1, t1, ...]` of the last encoded document.
    pub fn doc_buf(&self) -> &[i32] {
        &self.doc_buf
    }

    pub fn doc_tokens(&self) -> &[TokenTopic] {
        &self.tokens
    }

    pub fn vocab(&self) -> &LocalVocab {
        &self.vocab
    }

    pub fn local_words(&self) -> &[WordId] {
        self.vocab.words()
    }

    /// Writes `block.0` and `vocab.0` for the last encoded document.
    pub fn generate_files(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).map_err(|e| InferError::io(dir, e))?;
        let block_path = dir.join(block_file_name(0));
        let vocab_path = dir.join(vocab_file_name(0));
        let offsets = [0i64, self.doc_buf.len() as i64];

        let f = File::create(&block_path).map_err(|e| InferError::io(&block_path, e))?;
        binary::write_block(&mut BufWriter::new(f), &offsets, &self.doc_buf)
            .map_err(|e| InferError::io(&block_path, e))?;
        let f = File::create(&vocab_path).map_err(|e| InferError::io(&vocab_path, e))?;
        binary::write_vocab(&mut BufWriter::new(f), &self.vocab)
            .map_err(|e| InferError::io(&vocab_path, e))?;
        Ok(())
    }

    pub fn word_id(&self, word: &str) -> Option<WordId> {
        self.word_ids.get(word).copied()
    }

    pub fn global_tf(&self, word: WordId) -> i32 {
        self.global_tf[word as usize]
    }

    /// Pretrained topic row of `word`, in file order.
    pub fn topics(&self, word: WordId) -> &[TopicCount] {
        &self.word_topic_table[word as usize]
    }

    pub fn dominant_topic(&self, word: WordId) -> TopicId {
        self.dominant_topic[word as usize]
    }

    pub fn summary(&self) -> &[i64] {
        &self.topic_summary
    }

    pub fn num_vocabs(&self) -> usize {
        self.num_vocabs
    }

    pub fn num_topics(&self) -> usize {
        self.num_topics
    }

    pub fn max_doc_length(&self) -> usize {
        self.max_doc_length
    }

    pub fn dictionary_len(&self) -> usize {
        self.word_ids.len()
    }
}
