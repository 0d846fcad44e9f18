//! One inference session: a loaded dictionary and model, reused by every
//! `predict` call until the session is cleared.

use std::panic;
use std::path::Path;
use std::process;
use std::sync::{mpsc, Barrier};
use std::thread;
use std::time::Instant;

use tracing::{debug, error, info};

use crate::alias::AliasTable;
use crate::block::{BlockBuffer, DataBlock, DocTopicCounter};
use crate::encoder::CorpusEncoder;
use crate::error::{InferError, Result};
use crate::inferer::{Inferer, SamplerParams, Shard, WorkerTask};
use crate::meta::{LocalVocab, Meta};
use crate::model::TopicModel;
use crate::prng::Pcg32;
use crate::stream::DocumentStore;
use crate::types::*;

#[derive(Clone, Debug)]
pub struct InferOptions {
    pub num_vocabs: usize,
    pub num_topics: usize,
    pub num_iterations: usize,
    pub num_local_workers: usize,
    pub num_blocks: usize,
    pub max_doc_length: usize,
    pub mh_steps: usize,
    pub alpha: f64,
    pub beta: f64,
    pub slice_token_budget: usize,
    pub warm_start: bool,
    pub seed: u64,
}

impl Default for InferOptions {
    fn default() -> Self {
        InferOptions {
            num_vocabs: 0, // must be set by the caller
            num_topics: DEFAULT_NUM_TOPICS,
            num_iterations: DEFAULT_NUM_ITERATIONS,
            num_local_workers: 1,
            num_blocks: 1,
            max_doc_length: MAX_DOC_LENGTH,
            mh_steps: DEFAULT_MH_STEPS,
            alpha: DEFAULT_ALPHA,
            beta: DEFAULT_BETA,
            slice_token_budget: DEFAULT_SLICE_TOKEN_BUDGET,
            warm_start: false,
            seed: 1,
        }
    }
}

impl InferOptions {
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("num_vocabs", self.num_vocabs),
            ("num_topics", self.num_topics),
            ("num_local_workers", self.num_local_workers),
            ("num_blocks", self.num_blocks),
            ("max_doc_length", self.max_doc_length),
            ("slice_token_budget", self.slice_token_budget),
        ];
        for (name, v) in positive {
            if v == 0 {
                return Err(InferError::InvalidOptions(format!("{name} must be positive")));
            }
        }
        if self.num_vocabs > i32::MAX as usize || self.num_topics > i32::MAX as usize {
            return Err(InferError::InvalidOptions("num_vocabs and num_topics must fit in i32".into()));
        }
        for (name, v) in [("alpha", self.alpha), ("beta", self.beta)] {
            if !(v.is_finite() && v > 0.0) {
                return Err(InferError::InvalidOptions(format!("{name} must be a positive number, got {v}")));
            }
        }
        Ok(())
    }

    fn sampler_params(&self) -> SamplerParams {
        SamplerParams {
            num_topics: self.num_topics,
            num_vocabs: self.num_vocabs,
            mh_steps: self.mh_steps,
            alpha: self.alpha,
            beta: self.beta,
        }
    }
}

/// Where the session is within a `predict` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Encoded,
    DocumentsInitialized,
    Running,
    Aggregated,
    Done,
}

pub struct InferenceSession {
    opts: InferOptions,
    encoder: CorpusEncoder,
    model: TopicModel,
    meta: Meta,
    rng: Pcg32,
    phase: Phase,
}

impl InferenceSession {
    /// Loads `word_id.dict` and `server_0_table_0.model` from `input_dir`.
    pub fn init(input_dir: &Path, opts: InferOptions) -> Result<Self> {
        opts.validate()?;
        let encoder =
            CorpusEncoder::from_dir(input_dir, opts.num_vocabs, opts.num_topics, opts.max_doc_length)?;
        Self::with_encoder(encoder, opts)
    }

    pub fn with_encoder(encoder: CorpusEncoder, opts: InferOptions) -> Result<Self> {
        opts.validate()?;
        if encoder.num_vocabs() != opts.num_vocabs
            || encoder.num_topics() != opts.num_topics
            || encoder.max_doc_length() != opts.max_doc_length
        {
            return Err(InferError::InvalidOptions(format!(
                "encoder built for {} words / {} topics / {} tokens, options say {} / {} / {}",
                encoder.num_vocabs(),
                encoder.num_topics(),
                encoder.max_doc_length(),
                opts.num_vocabs,
                opts.num_topics,
                opts.max_doc_length
            )));
        }
        let model = TopicModel::from_encoder(&encoder);
        Ok(InferenceSession {
            rng: Pcg32::new(opts.seed, 54),
            opts,
            encoder,
            model,
            meta: Meta::default(),
            phase: Phase::Uninitialized,
        })
    }

    pub fn options(&self) -> &InferOptions {
        &self.opts
    }

    pub fn encoder(&self) -> &CorpusEncoder {
        &self.encoder
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn enter(&mut self, phase: Phase) {
        debug!(from = ?self.phase, to = ?phase, "phase transition");
        self.phase = phase;
    }

    /// Topic histogram of one document as `(topic, count)` pairs, ascending
    /// by topic.
    pub fn predict<S: AsRef<str>>(&mut self, tokens: &[S]) -> Result<Vec<(TopicId, i32)>> {
        let docs = self.predict_batch(std::slice::from_ref(&tokens))?;
        Ok(docs.into_iter().flatten().collect())
    }

    /// One histogram per input document, in input order.
    pub fn predict_batch<D, S>(&mut self, docs: &[D]) -> Result<Vec<DocTopics>>
    where
        D: AsRef<[S]>,
        S: AsRef<str>,
    {
        let start = Instant::now();
        let mut store = self.encode_batch(docs)?;
        self.enter(Phase::Encoded);

        self.meta.init(store.vocabs().to_vec(), self.opts.slice_token_budget);
        self.model.init(&self.encoder, &self.meta);

        let mut init_rng = self.rng.split();
        let worker_rngs: Vec<Pcg32> = (0..self.opts.num_local_workers).map(|_| self.rng.split()).collect();

        let result = self.run(&mut store, &mut init_rng, worker_rngs);

        self.model.clear_table();
        self.meta.clear();
        let topics = result?;
        self.enter(Phase::Done);
        debug!(docs = docs.len(), elapsed_ms = start.elapsed().as_millis() as u64, "predict finished");
        Ok(topics)
    }

    fn run(&mut self, store: &mut DocumentStore, init_rng: &mut Pcg32, worker_rngs: Vec<Pcg32>) -> Result<Vec<DocTopics>> {
        self.init_documents(store, init_rng)?;
        self.enter(Phase::DocumentsInitialized);

        let alias = AliasTable::build(&self.model, self.opts.beta);
        self.enter(Phase::Running);
        self.inference(store, &alias, worker_rngs)?;
        drop(alias);

        let topics = self.dump_doc_topic(store)?;
        self.enter(Phase::Aggregated);
        Ok(topics)
    }

    /// Encodes `docs` into `num_blocks` contiguous blocks, each with the
    /// merged vocabulary of its documents.
    pub fn encode_batch<D, S>(&mut self, docs: &[D]) -> Result<DocumentStore>
    where
        D: AsRef<[S]>,
        S: AsRef<str>,
    {
        let num_blocks = self.opts.num_blocks;
        let per_block = docs.len().div_ceil(num_blocks).max(1);
        let mut blocks = Vec::with_capacity(num_blocks);
        let mut vocabs = Vec::with_capacity(num_blocks);
        let mut doc_vocabs: Vec<LocalVocab> = Vec::new();
        for b in 0..num_blocks {
            let lo = (b * per_block).min(docs.len());
            let hi = ((b + 1) * per_block).min(docs.len());
            let mut buf = BlockBuffer::new();
            doc_vocabs.clear();
            for doc in &docs[lo..hi] {
                self.encoder.encode(doc.as_ref());
                buf.push_doc(self.encoder.doc_buf());
                doc_vocabs.push(self.encoder.vocab().clone());
            }
            vocabs.push(LocalVocab::merge(&doc_vocabs));
            blocks.push(buf);
        }
        DocumentStore::new(blocks, vocabs)
    }

    /// Assigns an initial topic to every token, slice by slice.
    fn init_documents(&self, store: &mut DocumentStore, rng: &mut Pcg32) -> Result<()> {
        for block in 0..store.num_blocks() {
            let mut data = store.load(block)?;
            let vocab = self.meta.local_vocab(block);
            for slice in 0..vocab.num_slice() {
                let last_word = vocab.last_word(slice);
                for doc in data.documents_mut() {
                    if slice == 0 {
                        *doc.cursor_mut() = 0;
                    }
                    let mut cursor = doc.cursor();
                    while cursor < doc.size() && doc.word(cursor) <= last_word {
                        let topic = if self.opts.warm_start {
                            self.encoder.dominant_topic(doc.word(cursor))
                        } else {
                            rng.rand_k(self.opts.num_topics) as TopicId
                        };
                        doc.set_topic(cursor, topic);
                        cursor += 1;
                    }
                    *doc.cursor_mut() = cursor;
                }
            }
            store.unload(data)?;
        }
        Ok(())
    }

    /// Runs `num_local_workers` threads over every block. Each block is dealt
    /// round-robin to the workers, swept `num_iterations` times in lockstep,
    /// and collected back before the next block is loaded.
    fn inference(&self, store: &mut DocumentStore, alias: &AliasTable, worker_rngs: Vec<Pcg32>) -> Result<()> {
        let n = self.opts.num_local_workers;
        let num_iterations = self.opts.num_iterations;
        let params = self.opts.sampler_params();
        let barrier = Barrier::new(n);

        thread::scope(|scope| {
            let (done_tx, done_rx) = mpsc::channel::<Shard>();
            let mut senders = Vec::with_capacity(n);
            for (id, rng) in worker_rngs.into_iter().enumerate() {
                let (tx, rx) = mpsc::channel::<Shard>();
                senders.push(tx);
                let done_tx = done_tx.clone();
                let task = WorkerTask {
                    id,
                    alias,
                    model: &self.model,
                    meta: &self.meta,
                    barrier: &barrier,
                    rng,
                    params,
                };
                scope.spawn(move || {
                    let work = panic::AssertUnwindSafe(move || {
                        let mut inferer = Inferer::new(task);
                        for shard in rx {
                            let shard = inferer.run_block(shard, num_iterations);
                            if done_tx.send(shard).is_err() {
                                break;
                            }
                        }
                    });
                    // siblings would wait on the barrier forever
                    if panic::catch_unwind(work).is_err() {
                        error!(worker = id, "sampling invariant violated, aborting");
                        process::abort();
                    }
                });
            }
            drop(done_tx);

            for block in 0..store.num_blocks() {
                let data = store.load(block)?;
                for (tx, docs) in senders.iter().zip(data.into_shards(n)) {
                    if tx.send(Shard { block, docs }).is_err() {
                        panic!("inference worker exited before block {block}");
                    }
                }
                let shards: Vec<_> = (0..n)
                    .map(|_| match done_rx.recv() {
                        Ok(shard) => shard.docs,
                        Err(_) => panic!("inference worker died while holding block {block}"),
                    })
                    .collect();
                store.unload(DataBlock::from_shards(block, shards))?;
                debug!(block, iterations = num_iterations, workers = n, "block inferred");
            }
            Ok(())
        })
    }

    /// Per-document histograms, block order then document order.
    fn dump_doc_topic(&self, store: &mut DocumentStore) -> Result<Vec<DocTopics>> {
        let mut out = Vec::new();
        let mut counter = DocTopicCounter::default();
        for block in 0..store.num_blocks() {
            let data = store.load(block)?;
            for doc in data.documents() {
                counter.clear();
                doc.doc_topic_vector(&mut counter);
                out.push(counter.to_sorted());
            }
            store.unload(data)?;
        }
        Ok(out)
    }

    /// Releases the dictionary and model.
    pub fn clear(self) {
        info!(words = self.encoder.dictionary_len(), "inference session cleared");
    }
}
