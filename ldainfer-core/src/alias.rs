//! Per-word alias tables for the word-proposal of the sampler.
//!
//! For word `w` the proposal over topics is
//!
//! ```text
//! q_w(t) ∝ (n_tw + beta) / (n_t + V * beta)
//! ```
//!
//! built with Vose's alias method: one uniform cell index plus one biased coin
//! gives an exact sample in O(1), whatever the number of topics.

use hashbrown::HashMap;
use tracing::debug;

use crate::model::TopicModel;
use crate::prng::Pcg32;
use crate::types::*;

#[derive(Clone, Debug)]
pub struct AliasEntry {
    prob: Vec<f64>,
    alias: Vec<TopicId>,
    mass: Vec<f64>,
}

impl AliasEntry {
    /// `weights` must be non-negative with a positive sum.
    pub fn build(weights: &[f64]) -> Self {
        let n = weights.len();
        let sum: f64 = weights.iter().sum();
        assert!(n > 0 && sum > 0.0 && sum.is_finite(), "alias weights must have a positive finite sum");

        let mass: Vec<f64> = weights.iter().map(|w| w / sum).collect();
        let mut scaled: Vec<f64> = mass.iter().map(|m| m * n as f64).collect();
        let mut prob = vec![1.0; n];
        let mut alias: Vec<TopicId> = (0..n as TopicId).collect();

        let mut small = Vec::with_capacity(n);
        let mut large = Vec::with_capacity(n);
        for (i, &s) in scaled.iter().enumerate() {
            if s < 1.0 {
                small.push(i);
            } else {
                large.push(i);
            }
        }
        while let (Some(&s), Some(&l)) = (small.last(), large.last()) {
            small.pop();
            prob[s] = scaled[s];
            alias[s] = l as TopicId;
            scaled[l] = (scaled[l] + scaled[s]) - 1.0;
            if scaled[l] < 1.0 {
                large.pop();
                small.push(l);
            }
        }
        // leftovers are full cells up to rounding
        for i in small.into_iter().chain(large) {
            prob[i] = 1.0;
            alias[i] = i as TopicId;
        }
        AliasEntry { prob, alias, mass }
    }

    #[inline]
    pub fn sample(&self, rng: &mut Pcg32) -> TopicId {
        let k = rng.rand_k(self.prob.len());
        if rng.next_f64() < self.prob[k] {
            k as TopicId
        } else {
            self.alias[k]
        }
    }

    /// Normalised proposal probability of `topic`.
    #[inline]
    pub fn probability(&self, topic: TopicId) -> f64 {
        self.mass[topic as usize]
    }

    pub fn len(&self) -> usize {
        self.prob.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prob.is_empty()
    }
}

/// Alias entries of every word in the current request. Built once per
/// request, then only read.
#[derive(Debug, Default)]
pub struct AliasTable {
    entries: HashMap<WordId, AliasEntry>,
}

impl AliasTable {
    pub fn build(model: &TopicModel, beta: f64) -> Self {
        let num_topics = model.num_topics();
        let beta_sum = beta * model.num_vocabs() as f64;
        let mut entries = HashMap::new();
        let mut weights = vec![0.0; num_topics];
        for word in model.words() {
            for (t, w) in weights.iter_mut().enumerate() {
                *w = beta / (model.global_topic_total(t as TopicId) as f64 + beta_sum);
            }
            for tc in model.topics_of(word) {
                let t = tc.topic as usize;
                weights[t] = (tc.count as f64 + beta) / (model.global_topic_total(tc.topic) as f64 + beta_sum);
            }
            entries.insert(word, AliasEntry::build(&weights));
        }
        debug!(words = entries.len(), topics = num_topics, "alias table built");
        AliasTable { entries }
    }

    fn entry(&self, word: WordId) -> &AliasEntry {
        match self.entries.get(&word) {
            Some(e) => e,
            None => panic!("word {word} has no alias entry"),
        }
    }

    #[inline]
    pub fn propose(&self, word: WordId, rng: &mut Pcg32) -> TopicId {
        self.entry(word).sample(rng)
    }

    #[inline]
    pub fn probability(&self, word: WordId, topic: TopicId) -> f64 {
        self.entry(word).probability(topic)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::tests::small_encoder;
    use crate::meta::Meta;

    fn empirical(entry: &AliasEntry, draws: usize, seed: u64) -> Vec<f64> {
        let mut rng = Pcg32::new(seed, 54);
        let mut counts = vec![0usize; entry.len()];
        for _ in 0..draws {
            counts[entry.sample(&mut rng) as usize] += 1;
        }
        counts.iter().map(|&c| c as f64 / draws as f64).collect()
    }

    #[test]
    fn sampling_converges_to_normalised_weights() {
        let weights = [5.0, 0.5, 3.0, 0.0, 1.5];
        let entry = AliasEntry::build(&weights);
        let freq = empirical(&entry, 200_000, 11);
        for (t, w) in weights.iter().enumerate() {
            let p = w / 10.0;
            assert!((entry.probability(t as TopicId) - p).abs() < 1e-12);
            assert!((freq[t] - p).abs() < 0.01, "topic {t}: {} vs {p}", freq[t]);
        }
        assert_eq!(freq[3], 0.0);
    }

    #[test]
    fn cells_reproduce_the_distribution_exactly() {
        // mass carried by cell i: prob[i] for i itself, 1 - prob[i] for alias[i]
        let weights = [0.1, 0.2, 0.3, 0.4];
        let entry = AliasEntry::build(&weights);
        let n = weights.len() as f64;
        let mut recovered = vec![0.0; weights.len()];
        for i in 0..weights.len() {
            recovered[i] += entry.prob[i] / n;
            recovered[entry.alias[i] as usize] += (1.0 - entry.prob[i]) / n;
        }
        for (r, w) in recovered.iter().zip(weights) {
            assert!((r - w).abs() < 1e-12);
        }
    }

    #[test]
    fn uniform_weights_need_no_aliases() {
        let entry = AliasEntry::build(&[1.0; 4]);
        assert!(entry.prob.iter().all(|&p| p == 1.0));
    }

    #[test]
    #[should_panic]
    fn zero_weights_are_rejected() {
        AliasEntry::build(&[0.0, 0.0]);
    }

    #[test]
    fn table_follows_word_topic_counts() {
        let mut enc = small_encoder(MAX_DOC_LENGTH);
        enc.encode(&["a", "b"]);
        let mut meta = Meta::default();
        meta.init(vec![enc.vocab().clone()], 16);
        let mut model = TopicModel::from_encoder(&enc);
        model.init(&enc, &meta);

        let beta = 0.01;
        let table = AliasTable::build(&model, beta);
        assert_eq!(table.len(), 2);

        // word 0: counts {1: 1, 2: 4}, summary [2, 1, 4], V = 4
        let bs = beta * 4.0;
        let w = [beta / (2.0 + bs), (1.0 + beta) / (1.0 + bs), (4.0 + beta) / (4.0 + bs)];
        let sum: f64 = w.iter().sum();
        for t in 0..3 {
            assert!((table.probability(0, t as TopicId) - w[t] / sum).abs() < 1e-12);
        }

        let mut rng = Pcg32::new(5, 54);
        let mut hits = [0usize; 3];
        for _ in 0..60_000 {
            hits[table.propose(0, &mut rng) as usize] += 1;
        }
        for t in 0..3 {
            let f = hits[t] as f64 / 60_000.0;
            assert!((f - w[t] / sum).abs() < 0.01);
        }
    }
}
