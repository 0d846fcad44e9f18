//! Gibbs sweeps over one worker's shard of a block.
//!
//! Each token runs `mh_steps` rounds of two Metropolis-Hastings proposals
//! against the collapsed posterior
//!
//! ```text
//! p(t) ∝ (n_td + alpha) * (n_tw + beta) / (n_t + V * beta)
//! ```
//!
//! where `n_td` excludes the token being resampled. The word-proposal comes
//! from the word's alias entry, the doc-proposal picks the topic of another
//! token of the document (or a uniform topic with weight `K * alpha`), which
//! is proportional to `n_td + alpha`. Word-topic counts are frozen; only the
//! document histograms move.

use std::sync::Barrier;

use tracing::trace;

use crate::alias::AliasTable;
use crate::block::{DocTopicCounter, Document};
use crate::meta::Meta;
use crate::model::TopicModel;
use crate::prng::Pcg32;
use crate::types::*;

#[derive(Clone, Copy, Debug)]
pub struct SamplerParams {
    pub num_topics: usize,
    pub num_vocabs: usize,
    pub mh_steps: usize,
    pub alpha: f64,
    pub beta: f64,
}

/// Documents of one block owned by one worker, tagged with their position in
/// the block.
#[derive(Debug)]
pub struct Shard {
    pub block: usize,
    pub docs: Vec<(usize, Document)>,
}

/// Everything a worker thread needs, moved into it at spawn time.
pub struct WorkerTask<'a> {
    pub id: usize,
    pub alias: &'a AliasTable,
    pub model: &'a TopicModel,
    pub meta: &'a Meta,
    pub barrier: &'a Barrier,
    pub rng: Pcg32,
    pub params: SamplerParams,
}

struct LightDocSampler<'a> {
    alias: &'a AliasTable,
    model: &'a TopicModel,
    rng: Pcg32,
    num_topics: usize,
    num_vocabs: usize,
    mh_steps: usize,
    alpha: f64,
    alpha_sum: f64,
    beta: f64,
    beta_sum: f64,
}

impl<'a> LightDocSampler<'a> {
    #[inline]
    fn check_topic(&self, topic: TopicId) {
        assert!(
            topic >= 0 && (topic as usize) < self.num_topics,
            "topic {topic} outside [0, {})",
            self.num_topics
        );
    }

    #[inline]
    fn word_term(&self, word: WordId, topic: TopicId) -> f64 {
        (self.model.word_topic_count(word, topic) as f64 + self.beta)
            / (self.model.global_topic_total(topic) as f64 + self.beta_sum)
    }

    /// New topic for token `idx` of `doc`; `counter` is the document's
    /// current histogram including the token.
    fn sample_token(&mut self, doc: &Document, counter: &DocTopicCounter, idx: usize) -> TopicId {
        let word = doc.word(idx);
        let old = doc.topic(idx);
        assert!(
            word >= 0 && (word as usize) < self.num_vocabs,
            "word {word} outside [0, {})",
            self.num_vocabs
        );
        self.check_topic(old);

        let doc_term = |t: TopicId| (counter.get(t) - (t == old) as i32) as f64 + self.alpha;
        let others = doc.size() - 1;

        let mut s = old;
        for _ in 0..self.mh_steps {
            // word proposal
            let t = self.alias.propose(word, &mut self.rng);
            self.check_topic(t);
            if t != s {
                let pi = (doc_term(t) * self.word_term(word, t) * self.alias.probability(word, s))
                    / (doc_term(s) * self.word_term(word, s) * self.alias.probability(word, t));
                if self.rng.next_f64() <= pi {
                    s = t;
                }
            }

            // doc proposal
            let u = self.rng.next_f64() * (others as f64 + self.alpha_sum);
            let t = if u < others as f64 {
                let mut j = u as usize;
                if j >= idx {
                    j += 1;
                }
                doc.topic(j)
            } else {
                self.rng.rand_k(self.num_topics) as TopicId
            };
            self.check_topic(t);
            if t != s {
                // the doc terms of target and proposal cancel
                let pi = self.word_term(word, t) / self.word_term(word, s);
                if self.rng.next_f64() <= pi {
                    s = t;
                }
            }
        }
        s
    }
}

pub struct Inferer<'a> {
    id: usize,
    meta: &'a Meta,
    barrier: &'a Barrier,
    sampler: LightDocSampler<'a>,
    block: usize,
    docs: Vec<(usize, Document)>,
    counters: Vec<DocTopicCounter>,
}

impl<'a> Inferer<'a> {
    pub fn new(task: WorkerTask<'a>) -> Self {
        let p = task.params;
        Inferer {
            id: task.id,
            meta: task.meta,
            barrier: task.barrier,
            sampler: LightDocSampler {
                alias: task.alias,
                model: task.model,
                rng: task.rng,
                num_topics: p.num_topics,
                num_vocabs: p.num_vocabs,
                mh_steps: p.mh_steps,
                alpha: p.alpha,
                alpha_sum: p.alpha * p.num_topics as f64,
                beta: p.beta,
                beta_sum: p.beta * p.num_vocabs as f64,
            },
            block: 0,
            docs: Vec::new(),
            counters: Vec::new(),
        }
    }

    /// Takes ownership of this worker's documents of a block and derives
    /// their histograms.
    pub fn before_iteration(&mut self, shard: Shard) {
        self.block = shard.block;
        self.docs = shard.docs;
        self.counters.clear();
        for (_, doc) in &self.docs {
            let mut counter = DocTopicCounter::default();
            doc.doc_topic_vector(&mut counter);
            self.counters.push(counter);
        }
        self.barrier.wait();
    }

    /// One sweep over the shard, slice by slice. Returns after every worker
    /// finished the same sweep.
    pub fn do_iteration(&mut self, iter: usize) {
        let vocab = self.meta.local_vocab(self.block);
        let mut n_changed = 0usize;
        for slice in 0..vocab.num_slice() {
            let last_word = vocab.last_word(slice);
            for ((_, doc), counter) in self.docs.iter_mut().zip(self.counters.iter_mut()) {
                if slice == 0 {
                    *doc.cursor_mut() = 0;
                }
                let mut cursor = doc.cursor();
                while cursor < doc.size() && doc.word(cursor) <= last_word {
                    let old = doc.topic(cursor);
                    let new = self.sampler.sample_token(doc, counter, cursor);
                    if new != old {
                        counter.dec(old);
                        counter.inc(new);
                        doc.set_topic(cursor, new);
                        n_changed += 1;
                    }
                    cursor += 1;
                }
                *doc.cursor_mut() = cursor;
            }
        }
        trace!(worker = self.id, block = self.block, iter, n_changed, "sweep done");
        self.barrier.wait();
    }

    /// Hands the documents back; the model is frozen so nothing is flushed.
    pub fn end_iteration(&mut self) -> Shard {
        self.counters.clear();
        Shard { block: self.block, docs: std::mem::take(&mut self.docs) }
    }

    pub fn run_block(&mut self, shard: Shard, num_iterations: usize) -> Shard {
        self.before_iteration(shard);
        for i in 0..num_iterations {
            self.do_iteration(i);
        }
        self.end_iteration()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::CorpusEncoder;

    // Two topics, word 0 strongly tied to topic 1, word 1 to topic 0.
    fn fixture() -> (CorpusEncoder, Meta, TopicModel) {
        let mut enc = CorpusEncoder::new(2, 2, MAX_DOC_LENGTH);
        enc.parse_dictionary("0\tx\t100\n1\ty\t100\n", "dict").unwrap();
        enc.parse_pretrained_model("0 1:100000 0:1\n1 0:100000 1:1\n", "model").unwrap();
        enc.encode(&["x", "x", "x", "y"]);
        let mut meta = Meta::default();
        meta.init(vec![enc.vocab().clone()], 2);
        let mut model = TopicModel::from_encoder(&enc);
        model.init(&enc, &meta);
        (enc, meta, model)
    }

    fn params(mh_steps: usize) -> SamplerParams {
        SamplerParams { num_topics: 2, num_vocabs: 2, mh_steps, alpha: 1.0, beta: 0.01 }
    }

    fn shard(enc: &CorpusEncoder, topics: &[TopicId]) -> Shard {
        let mut doc = Document::decode(enc.doc_buf()).unwrap();
        for (i, &t) in topics.iter().enumerate() {
            doc.set_topic(i, t);
        }
        Shard { block: 0, docs: vec![(0, doc)] }
    }

    #[test]
    fn sweeps_pull_tokens_toward_their_word_topics() {
        let (enc, meta, model) = fixture();
        let alias = AliasTable::build(&model, 0.01);
        let barrier = Barrier::new(1);
        let mut inferer = Inferer::new(WorkerTask {
            id: 0,
            alias: &alias,
            model: &model,
            meta: &meta,
            barrier: &barrier,
            rng: Pcg32::new(9, 54),
            params: params(2),
        });
        let out = inferer.run_block(shard(&enc, &[0, 0, 0, 1]), 20);
        let doc = &out.docs[0].1;
        let topics: Vec<TopicId> = doc.tokens().iter().map(|t| t.topic).collect();
        assert_eq!(topics, vec![1, 1, 1, 0]);
        assert_eq!(doc.cursor(), doc.size());
    }

    #[test]
    fn zero_iterations_leave_topics_untouched() {
        let (enc, meta, model) = fixture();
        let alias = AliasTable::build(&model, 0.01);
        let barrier = Barrier::new(1);
        let mut inferer = Inferer::new(WorkerTask {
            id: 0,
            alias: &alias,
            model: &model,
            meta: &meta,
            barrier: &barrier,
            rng: Pcg32::new(9, 54),
            params: params(2),
        });
        let out = inferer.run_block(shard(&enc, &[0, 1, 0, 1]), 0);
        let topics: Vec<TopicId> = out.docs[0].1.tokens().iter().map(|t| t.topic).collect();
        assert_eq!(topics, vec![0, 1, 0, 1]);
    }

    #[test]
    fn histogram_stays_consistent_with_assignments() {
        let (enc, meta, model) = fixture();
        let alias = AliasTable::build(&model, 0.01);
        let barrier = Barrier::new(1);
        let mut inferer = Inferer::new(WorkerTask {
            id: 0,
            alias: &alias,
            model: &model,
            meta: &meta,
            barrier: &barrier,
            rng: Pcg32::new(4, 54),
            params: params(1),
        });
        inferer.before_iteration(shard(&enc, &[0, 1, 0, 1]));
        for i in 0..5 {
            inferer.do_iteration(i);
            let mut fresh = DocTopicCounter::default();
            inferer.docs[0].1.doc_topic_vector(&mut fresh);
            assert_eq!(fresh.to_sorted(), inferer.counters[0].to_sorted());
            assert_eq!(inferer.counters[0].total(), 4);
        }
        let out = inferer.end_iteration();
        assert_eq!(out.docs.len(), 1);
        assert!(inferer.counters.is_empty());
    }

    #[test]
    #[should_panic]
    fn out_of_range_topic_aborts() {
        let (enc, meta, model) = fixture();
        let alias = AliasTable::build(&model, 0.01);
        let barrier = Barrier::new(1);
        let mut inferer = Inferer::new(WorkerTask {
            id: 0,
            alias: &alias,
            model: &model,
            meta: &meta,
            barrier: &barrier,
            rng: Pcg32::new(1, 54),
            params: params(1),
        });
        inferer.run_block(shard(&enc, &[0, 7, 0, 0]), 1);
    }
}
