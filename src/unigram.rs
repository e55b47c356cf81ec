use crate::config::files_handling::{read_input, save_output};
use crate::dictionary::Dictionary;
use crate::error::{EmbeddingError, Result};
use crate::shards::Shard;

use ndarray::{Array1, Array2};
use std::ops::Add;
use std::path::Path;


/// Unigram data for one shard: `unx` is a column over the shard rows,
/// `unxt` a row over the shard columns (possibly smoothed), `un` the total.
#[derive(Clone, Debug, PartialEq)]
pub struct UnigramShard {
    pub unx: Array2<f64>,
    pub unxt: Array2<f64>,
    pub un: f64,
}

/// Single-token occurrence counts, aligned with its own dictionary.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Unigram {
    dictionary: Dictionary,
    counts: Vec<u64>,
}

impl Unigram {

    pub fn new() -> Unigram {
        Self::default()
    }

    pub fn from_counts(dictionary: Dictionary, counts: Vec<u64>) -> Result<Unigram> {
        if dictionary.len() != counts.len() {
            return Err(EmbeddingError::dimension_mismatch(dictionary.len(), counts.len()));
        }
        Ok(Self { dictionary, counts })
    }

    pub fn add(&mut self, token: &str) {
        self.add_count(token, 1);
    }

    pub fn add_count(&mut self, token: &str, count: u64) {
        let id = self.dictionary.get_id(token);
        if id == self.counts.len() {
            self.counts.push(0);
        }
        self.counts[id] += count;
    }

    pub fn count(&self, token: &str) -> u64 {
        self.dictionary.get_id_opt(token).map_or(0, |id| self.counts[id])
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Total number of token occurrences, `uN`.
    pub fn n(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Order ids by descending count, ties keep their current order.
    pub fn sort(&mut self) {
        let mut order: Vec<usize> = (0..self.counts.len()).collect();
        order.sort_by(|a, b| self.counts[*b].cmp(&self.counts[*a]));
        self.reorder(&order);
    }

    pub fn truncate(&mut self, k: usize) {
        self.sort();
        let keep: Vec<usize> = (0..k.min(self.counts.len())).collect();
        self.reorder(&keep);
    }

    /// Drop every token seen fewer than `min_count` times.
    pub fn prune(&mut self, min_count: u64) {
        self.sort();
        let keep: Vec<usize> = (0..self.counts.len()).filter(|i| self.counts[*i] >= min_count).collect();
        self.reorder(&keep);
    }

    /// Counts re-indexed to `dictionary`'s ids; tokens this unigram never
    /// saw get a zero count.
    pub fn aligned_to(&self, dictionary: &Dictionary) -> Unigram {
        let counts = dictionary.tokens().iter().map(|t| self.count(t)).collect();
        Self { dictionary: dictionary.clone(), counts }
    }

    fn reorder(&mut self, order: &[usize]) {
        self.counts = order.iter().map(|old| self.counts[*old]).collect();
        self.dictionary.reorder(order);
    }

    /// Context distribution used by word2vec: counts raised to `alpha` and
    /// rescaled so they still add up to `uN`.
    pub fn smoothed_counts(&self, alpha: f64) -> Array1<f64> {
        let raised = Array1::from_iter(self.counts.iter().map(|c| (*c as f64).powf(alpha)));
        let total = raised.sum();
        raised * (self.n() as f64 / total)
    }

    /// Probability of keeping each token under word2vec's clean
    /// undersampling with threshold `t`: `min(1, sqrt(t / f))`.
    pub fn clean_undersample(&self, t: f64) -> Array1<f64> {
        let n = self.n() as f64;
        Array1::from_iter(self.counts.iter().map(|c| {
            let freq = *c as f64 / n;
            (t / freq).sqrt().min(1.0)
        }))
    }

    pub fn load_shard(&self, shard: &Shard, alpha: Option<f64>) -> UnigramShard {
        let n = self.counts.len();
        let rows = shard.rows(n);
        let cols = shard.cols(n);
        let context = match alpha {
            Some(alpha) => self.smoothed_counts(alpha),
            None => Array1::from_iter(self.counts.iter().map(|c| *c as f64)),
        };

        let unx = Array2::from_shape_fn((rows.len(), 1), |(r, _)| self.counts[rows[r]] as f64);
        let unxt = Array2::from_shape_fn((1, cols.len()), |(_, c)| context[cols[c]]);
        UnigramShard { unx, unxt, un: self.n() as f64 }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        save_output(path, "unigram_dictionary", &self.dictionary)?;
        save_output(path, "unigram", &self.counts)
    }

    pub fn load(path: &Path) -> Result<Unigram> {
        let dictionary: Dictionary = read_input(&path.join("unigram_dictionary"))?;
        let counts: Vec<u64> = read_input(&path.join("unigram"))?;
        Unigram::from_counts(dictionary, counts)
    }
}

impl<'a> Add<&'a Unigram> for &'a Unigram {
    type Output = Unigram;

    fn add(self, other: &'a Unigram) -> Unigram {
        let mut sum = self.clone();
        for (token, count) in other.dictionary.tokens().iter().zip(&other.counts) {
            sum.add_count(token, *count);
        }
        sum
    }
}
