use crate::config::files_handling::{read_input, save_output, WrapperCounts};
use crate::dictionary::Dictionary;
use crate::error::{EmbeddingError, Result};
use crate::shards::Shard;
use crate::sparse::CsrMatrix;

use ndarray::{Array1, Array2};
use std::collections::HashMap;
use std::fs;
use std::ops::Add;
use std::path::{Path, PathBuf};
use tracing::debug;


/// Below this a transformed cell counts as empty in `density`.
const NEGLIGIBLE: f64 = 1e-12;

pub type Counts = HashMap<(usize, usize), u64>;

/// Co-occurrence data for one shard. `nx` is a column over the shard rows,
/// `nxt` a row over the shard columns.
#[derive(Clone, Debug, PartialEq)]
pub struct CoocShard {
    pub nxx: Array2<f64>,
    pub nx: Array2<f64>,
    pub nxt: Array2<f64>,
    pub n: f64,
}

// exactly one representation is live at a time; mutations go through counts
#[derive(Clone, Debug, PartialEq)]
enum Basis {
    Counts(Counts),
    Matrix { nxx: CsrMatrix, nx: Array1<f64>, n: f64 },
}

#[derive(Clone, Debug, PartialEq)]
pub struct CoocStats {
    dictionary: Dictionary,
    basis: Basis,
}

impl Default for CoocStats {
    fn default() -> Self {
        CoocStats::new()
    }
}

impl CoocStats {

    pub fn new() -> CoocStats {
        Self { dictionary: Dictionary::new(), basis: Basis::Counts(HashMap::new()) }
    }

    /// Build from a dictionary and at most one of `counts` / `nxx`.
    pub fn from_parts(
        dictionary: Option<Dictionary>,
        counts: Option<Counts>,
        nxx: Option<CsrMatrix>) -> Result<CoocStats> {

            let dictionary = match (dictionary, &counts, &nxx) {
                (_, Some(_), Some(_)) => return Err(EmbeddingError::AmbiguousBasis),
                (None, Some(_), None) | (None, None, Some(_)) => return Err(EmbeddingError::MissingDictionary),
                (dictionary, _, _) => dictionary.unwrap_or_default(),
            };
            let vocab = dictionary.len();

            let basis = match (counts, nxx) {
                (Some(counts), None) => {
                    let max_id = counts.keys().map(|(i, j)| 1 + *i.max(j)).max().unwrap_or(0);
                    if max_id > vocab {
                        return Err(EmbeddingError::dimension_mismatch(vocab, max_id));
                    }
                    Basis::Counts(counts)
                },
                (None, Some(nxx)) => {
                    if nxx.shape() != (vocab, vocab) {
                        return Err(EmbeddingError::dimension_mismatch(vocab, nxx.shape().0));
                    }
                    let nx = nxx.row_sums();
                    let n = nxx.sum();
                    Basis::Matrix { nxx, nx, n }
                },
                _ => Basis::Counts(HashMap::new()),
            };

            Ok(Self { dictionary, basis })
    }

    pub fn from_counts(dictionary: Dictionary, counts: Counts) -> Result<CoocStats> {
        CoocStats::from_parts(Some(dictionary), Some(counts), None)
    }

    pub fn from_nxx(dictionary: Dictionary, nxx: CsrMatrix) -> Result<CoocStats> {
        CoocStats::from_parts(Some(dictionary), None, Some(nxx))
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    pub fn vocab_len(&self) -> usize {
        self.dictionary.len()
    }

    pub fn is_compiled(&self) -> bool {
        matches!(self.basis, Basis::Matrix { .. })
    }

    /// Count one more co-occurrence of `(token_a, token_b)`.
    pub fn add(&mut self, token_a: &str, token_b: &str) {
        self.add_count(token_a, token_b, 1);
    }

    pub fn add_count(&mut self, token_a: &str, token_b: &str, count: u64) {
        let i = self.dictionary.get_id(token_a);
        let j = self.dictionary.get_id(token_b);
        *self.counts_mut().entry((i, j)).or_insert(0) += count;
    }

    fn counts_mut(&mut self) -> &mut Counts {
        self.decompile();
        match &mut self.basis {
            Basis::Counts(counts) => counts,
            Basis::Matrix { .. } => unreachable!("decompile leaves the counts basis"),
        }
    }

    /// Switch to the matrix basis. No-op when already compiled.
    pub fn compile(&mut self) {
        if let Basis::Counts(counts) = &self.basis {
            let vocab = self.dictionary.len();
            let nxx = CsrMatrix::from_triplets(
                (vocab, vocab),
                counts.iter().map(|((i, j), c)| (*i, *j, *c as f64)),
            );
            let nx = nxx.row_sums();
            let n = nxx.sum();
            debug!("compiled {} counts into a {}x{} matrix", counts.len(), vocab, vocab);
            self.basis = Basis::Matrix { nxx, nx, n };
        }
    }

    /// Switch to the counts basis. No-op when counts are already live.
    pub fn decompile(&mut self) {
        if let Basis::Matrix { nxx, .. } = &self.basis {
            let counts: Counts = nxx.iter().map(|(i, j, v)| ((i, j), v.round() as u64)).collect();
            self.basis = Basis::Counts(counts);
        }
    }

    fn compiled(&mut self) -> (&CsrMatrix, &Array1<f64>, f64) {
        self.compile();
        match &self.basis {
            Basis::Matrix { nxx, nx, n } => (nxx, nx, *n),
            Basis::Counts(_) => unreachable!("compile leaves the matrix basis"),
        }
    }

    pub fn nxx(&mut self) -> &CsrMatrix {
        self.compiled().0
    }

    pub fn nx(&mut self) -> &Array1<f64> {
        self.compiled().1
    }

    pub fn n(&mut self) -> f64 {
        self.compiled().2
    }

    pub fn counts(&mut self) -> &Counts {
        self.counts_mut()
    }

    // nonzero cells from whichever basis is live, without switching
    fn cells(&self) -> Vec<(usize, usize, u64)> {
        match &self.basis {
            Basis::Counts(counts) => counts.iter().map(|((i, j), c)| (*i, *j, *c)).collect(),
            Basis::Matrix { nxx, .. } => nxx.iter().map(|(i, j, v)| (i, j, v.round() as u64)).collect(),
        }
    }

    fn marginals(&self) -> Array1<f64> {
        match &self.basis {
            Basis::Matrix { nx, .. } => nx.clone(),
            Basis::Counts(counts) => {
                let mut nx = Array1::zeros(self.dictionary.len());
                for ((i, _), c) in counts {
                    nx[*i] += *c as f64;
                }
                nx
            }
        }
    }

    /// Relabel ids by descending `Nx`, ties keeping their current order.
    pub fn sort(&mut self) {
        let nx = self.marginals();
        let mut order: Vec<usize> = (0..nx.len()).collect();
        order.sort_by(|a, b| nx[*b].total_cmp(&nx[*a]));
        self.reorder(&order);
    }

    /// Keep only the `k` most frequent words.
    pub fn truncate(&mut self, k: usize) {
        self.sort();
        let keep: Vec<usize> = (0..k.min(self.dictionary.len())).collect();
        self.reorder(&keep);
    }

    // new id i takes the old id order[i]; ids absent from order are dropped
    fn reorder(&mut self, order: &[usize]) {
        let mut new_id = vec![None; self.dictionary.len()];
        for (new, old) in order.iter().enumerate() {
            new_id[*old] = Some(new);
        }

        self.basis = match &self.basis {
            Basis::Counts(counts) => Basis::Counts(
                counts
                    .iter()
                    .filter_map(|((i, j), c)| match (new_id[*i], new_id[*j]) {
                        (Some(a), Some(b)) => Some(((a, b), *c)),
                        _ => None,
                    })
                    .collect(),
            ),
            Basis::Matrix { nxx, .. } => {
                let nxx = nxx.permute(order);
                let nx = nxx.row_sums();
                let n = nxx.sum();
                Basis::Matrix { nxx, nx, n }
            }
        };
        self.dictionary.reorder(order);
    }

    /// Fraction of cells of `Nxx` that are nonzero. For `power != 1` every
    /// cell, empty ones included, is first raised to `power` and anything
    /// negligible counts as empty, so `power <= 0` counts the empty cells.
    pub fn density(&mut self, power: f64) -> f64 {
        let vocab = self.dictionary.len();
        if vocab == 0 {
            return 0.0;
        }
        let cells = vocab * vocab;
        let nxx = self.nxx();
        let nonzero = if power == 1.0 {
            nxx.nnz()
        } else {
            let stored = nxx.values().iter().filter(|v| v.powf(power) > NEGLIGIBLE).count();
            let empty = match 0f64.powf(power) > NEGLIGIBLE {
                true => cells - nxx.nnz(),
                false => 0,
            };
            stored + empty
        };
        nonzero as f64 / cells as f64
    }

    /// Fraction of cells whose count exceeds `threshold`.
    pub fn density_above(&mut self, threshold: f64) -> f64 {
        let vocab = self.dictionary.len();
        if vocab == 0 {
            return 0.0;
        }
        let above = self.nxx().values().iter().filter(|v| **v > threshold).count();
        above as f64 / (vocab * vocab) as f64
    }

    /// Union of both vocabularies with counts summed per token pair. Ids
    /// follow `self`'s tokens, then `other`'s new tokens, then a sort.
    pub fn merge(&self, other: &CoocStats) -> CoocStats {
        let mut dictionary = self.dictionary.clone();
        let remap: Vec<usize> = other.dictionary.tokens().iter().map(|t| dictionary.get_id(t)).collect();

        let mut counts: Counts = self.cells().into_iter().map(|(i, j, c)| ((i, j), c)).collect();
        for (i, j, c) in other.cells() {
            *counts.entry((remap[i], remap[j])).or_insert(0) += c;
        }

        let mut merged = Self { dictionary, basis: Basis::Counts(counts) };
        merged.sort();
        merged
    }

    pub fn load_shard(&mut self, shard: &Shard) -> CoocShard {
        let vocab = self.dictionary.len();
        let (rows, cols) = (shard.rows(vocab), shard.cols(vocab));
        let (nxx, nx, n) = self.compiled();
        let col_sums = nxx.col_sums();
        CoocShard {
            nxx: nxx.select(&rows, &cols),
            nx: Array2::from_shape_fn((rows.len(), 1), |(r, _)| nx[rows[r]]),
            nxt: Array2::from_shape_fn((1, cols.len()), |(_, c)| col_sums[cols[c]]),
            n,
        }
    }

    /// Shard of the expected counts after each occurrence of word `i` is
    /// kept with probability `keep[i]`; marginals are recomputed from the
    /// thinned counts.
    pub fn load_shard_undersampled(&mut self, shard: &Shard, keep: &Array1<f64>) -> CoocShard {
        let vocab = self.dictionary.len();
        let (rows, cols) = (shard.rows(vocab), shard.cols(vocab));
        let nxx = self.nxx();
        let thinned = CsrMatrix::from_triplets(
            nxx.shape(),
            nxx.iter().map(|(i, j, v)| (i, j, v * keep[i] * keep[j])),
        );
        let nx = thinned.row_sums();
        let nxt = thinned.col_sums();
        CoocShard {
            nxx: thinned.select(&rows, &cols),
            nx: Array2::from_shape_fn((rows.len(), 1), |(r, _)| nx[rows[r]]),
            nxt: Array2::from_shape_fn((1, cols.len()), |(_, c)| nxt[cols[c]]),
            n: thinned.sum(),
        }
    }

    /// Write the dictionary and whichever basis is live under `path`. The
    /// bundle is staged next to `path` and renamed into place. An existing
    /// bundle is moved aside first and only deleted after the swap.
    pub fn save(&self, path: &Path) -> Result<()> {
        let staging = sibling_path(path, "staging");
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        save_output(&staging, "dictionary", &self.dictionary)?;
        match &self.basis {
            Basis::Counts(counts) => {
                save_output(&staging, "counts", &WrapperCounts { counts: counts.clone() })?
            },
            Basis::Matrix { nxx, .. } => save_output(&staging, "nxx", nxx)?,
        }
        let retired = sibling_path(path, "old");
        if retired.exists() {
            fs::remove_dir_all(&retired)?;
        }
        if path.exists() {
            fs::rename(path, &retired)?;
        }
        fs::rename(&staging, path)?;
        if retired.exists() {
            fs::remove_dir_all(&retired)?;
        }
        debug!("saved cooccurrence stats to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<CoocStats> {
        if !path.is_dir() {
            return Err(EmbeddingError::NotFound(path.to_path_buf()));
        }
        let dictionary: Dictionary = read_input(&path.join("dictionary"))?;
        match read_input::<WrapperCounts>(&path.join("counts")) {
            Ok(wrapped) => CoocStats::from_counts(dictionary, wrapped.counts),
            Err(EmbeddingError::NotFound(_)) => {
                let nxx: CsrMatrix = read_input(&path.join("nxx"))?;
                CoocStats::from_nxx(dictionary, nxx)
            },
            Err(e) => Err(e),
        }
    }
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

impl<'a> Add<&'a CoocStats> for &'a CoocStats {
    type Output = CoocStats;

    fn add(self, other: &'a CoocStats) -> CoocStats {
        self.merge(other)
    }
}


#[cfg(test)]
mod tests {

    use super::{CoocStats, Counts};
    use crate::dictionary::Dictionary;
    use crate::error::EmbeddingError;
    use crate::shards::{Shard, Shards};
    use crate::sparse::CsrMatrix;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array1, Array2};
    use std::collections::HashMap;

    fn fixture() -> (Dictionary, Counts, Array2<f64>) {
        let dictionary = Dictionary::from_tokens(["banana", "socks", "car", "field"]);
        let counts: Counts = HashMap::from([
            ((0, 1), 3), ((1, 0), 3),
            ((0, 3), 1), ((3, 0), 1),
            ((2, 1), 1), ((1, 2), 1),
            ((0, 2), 1), ((2, 0), 1),
        ]);
        let array = array![
            [0., 3., 1., 1.],
            [3., 0., 1., 0.],
            [1., 1., 0., 0.],
            [1., 0., 0., 0.]
        ];
        (dictionary, counts, array)
    }

    fn with_rice(array: &Array2<f64>) -> Array2<f64> {
        let mut expected = Array2::zeros((5, 5));
        expected.slice_mut(ndarray::s![..4, ..4]).assign(array);
        expected[[0, 4]] = 1.0;
        expected[[4, 0]] = 1.0;
        expected
    }

    // expected counts after converting to token keys, independent of id order
    fn by_token(stats: &mut CoocStats) -> HashMap<(String, String), u64> {
        let dictionary = stats.dictionary().clone();
        stats.counts().iter().map(|((i, j), c)| {
            let a = dictionary.get_token(*i).unwrap().to_owned();
            let b = dictionary.get_token(*j).unwrap().to_owned();
            ((a, b), *c)
        }).collect()
    }

    #[test]
    fn invalid_arguments() {
        let (dictionary, counts, array) = fixture();
        let nxx = CsrMatrix::from_dense(&array);

        assert!(CoocStats::from_parts(None, None, None).is_ok());
        assert!(CoocStats::from_parts(Some(dictionary.clone()), Some(counts.clone()), None).is_ok());
        assert!(CoocStats::from_parts(Some(dictionary.clone()), None, Some(nxx.clone())).is_ok());

        assert!(matches!(
            CoocStats::from_parts(None, Some(counts.clone()), None),
            Err(EmbeddingError::MissingDictionary)));
        assert!(matches!(
            CoocStats::from_parts(None, None, Some(nxx.clone())),
            Err(EmbeddingError::MissingDictionary)));
        assert!(matches!(
            CoocStats::from_parts(Some(dictionary), Some(counts), Some(nxx)),
            Err(EmbeddingError::AmbiguousBasis)));

        let short = Dictionary::from_tokens(["banana"]);
        assert!(matches!(
            CoocStats::from_nxx(short, CsrMatrix::from_dense(&array)),
            Err(EmbeddingError::DimensionMismatch { .. })));
    }

    #[test]
    fn add_when_basis_is_counts() {
        let (dictionary, counts, _) = fixture();
        let mut stats = CoocStats::from_counts(dictionary, counts.clone()).unwrap();
        stats.add("banana", "rice");
        assert_eq!(stats.dictionary().get_id_opt("rice"), Some(4));
        let mut expected = counts;
        expected.insert((0, 4), 1);
        assert_eq!(stats.counts(), &expected);
    }

    #[test]
    fn add_when_basis_is_nxx() {
        let (dictionary, counts, array) = fixture();
        let mut stats = CoocStats::from_nxx(dictionary, CsrMatrix::from_dense(&array)).unwrap();
        assert!(stats.is_compiled());
        assert_eq!(stats.nxx().to_dense(), array);
        assert_eq!(stats.nx(), &array.sum_axis(ndarray::Axis(1)));

        // adding forces the counts basis, the stale matrix is gone
        stats.add("banana", "rice");
        stats.add("rice", "banana");
        assert!(!stats.is_compiled());
        let mut expected = counts;
        expected.insert((0, 4), 1);
        expected.insert((4, 0), 1);
        assert_eq!(stats.counts(), &expected);

        let expected_nxx = with_rice(&array);
        assert_eq!(stats.nxx().to_dense(), expected_nxx);
        assert_eq!(stats.nx(), &expected_nxx.sum_axis(ndarray::Axis(1)));
        assert_eq!(stats.n(), 14.0);
    }

    #[test]
    fn decompile_restores_counts() {
        let (dictionary, counts, array) = fixture();
        let mut stats = CoocStats::from_nxx(dictionary, CsrMatrix::from_dense(&array)).unwrap();
        stats.decompile();
        assert!(!stats.is_compiled());
        assert_eq!(stats.counts(), &counts);
    }

    #[test]
    fn compile_round_trip() {
        let (dictionary, counts, array) = fixture();
        let mut stats = CoocStats::from_counts(dictionary, counts.clone()).unwrap();
        assert!(!stats.is_compiled());
        assert_eq!(stats.nxx().to_dense(), array);
        assert_eq!(stats.nx(), &Array1::from(vec![5., 4., 2., 1.]));
        assert_eq!(stats.n(), 12.0);

        let compiled = stats.nxx().clone();
        stats.decompile();
        assert_eq!(stats.counts(), &counts);
        stats.compile();
        assert_eq!(stats.nxx(), &compiled);

        stats.add("banana", "rice");
        stats.add("rice", "banana");
        stats.add("banana", "field");
        stats.add("field", "banana");
        let mut expected = with_rice(&array);
        expected[[0, 3]] += 1.0;
        expected[[3, 0]] += 1.0;
        assert_eq!(stats.nxx().to_dense(), expected);
        assert_eq!(stats.nx(), &expected.sum_axis(ndarray::Axis(1)));
    }

    #[test]
    fn sort_orders_by_frequency() {
        let unsorted_dictionary = Dictionary::from_tokens(["field", "car", "socks", "banana"]);
        let unsorted_counts: Counts = HashMap::from([
            ((0, 3), 1), ((3, 0), 1),
            ((1, 2), 1), ((2, 1), 1),
            ((1, 3), 1), ((3, 1), 1),
            ((2, 3), 3), ((3, 2), 3),
        ]);
        let (sorted_dictionary, sorted_counts, sorted_array) = fixture();

        // once from the counts basis, once from the matrix basis
        let mut stats = CoocStats::from_counts(unsorted_dictionary.clone(), unsorted_counts.clone()).unwrap();
        stats.sort();
        assert_eq!(stats.dictionary(), &sorted_dictionary);
        assert_eq!(stats.counts(), &sorted_counts);
        assert_eq!(stats.nxx().to_dense(), sorted_array);

        let mut stats = CoocStats::from_counts(unsorted_dictionary, unsorted_counts).unwrap();
        stats.compile();
        stats.sort();
        assert!(stats.is_compiled());
        assert_eq!(stats.nxx().to_dense(), sorted_array);
        assert_eq!(stats.n(), 12.0);

        // idempotent
        let before = stats.clone();
        stats.sort();
        assert_eq!(stats, before);
    }

    #[test]
    fn sort_is_stable_on_ties() {
        let mut stats = CoocStats::new();
        for (a, b) in [("x", "y"), ("y", "x"), ("z", "w"), ("w", "z")] {
            stats.add(a, b);
        }
        stats.sort();
        assert_eq!(stats.dictionary().tokens(), &["x", "y", "z", "w"]);
    }

    #[test]
    fn truncate_drops_rare_words() {
        let (dictionary, counts, _) = fixture();
        let mut stats = CoocStats::from_counts(dictionary, counts).unwrap();
        stats.truncate(3);
        assert_eq!(stats.nxx().to_dense(), array![
            [0., 3., 1.],
            [3., 0., 1.],
            [1., 1., 0.]
        ]);
        assert_eq!(stats.dictionary().tokens(), &["banana", "socks", "car"]);
        assert_eq!(stats.n(), 10.0);
    }

    #[test]
    fn density() {
        let (dictionary, counts, _) = fixture();
        let mut stats = CoocStats::from_counts(dictionary, counts).unwrap();
        assert_eq!(stats.density(1.0), 0.5);
        assert_eq!(stats.density(0.75), 0.5);
        assert_eq!(stats.density_above(2.0), 0.125);
        assert_eq!(CoocStats::new().density(1.0), 0.0);
    }

    #[test]
    fn density_counts_empty_cells_at_nonpositive_power() {
        let dictionary = Dictionary::from_tokens(["a", "b"]);
        let counts: Counts = HashMap::from([((0, 1), 1), ((1, 0), 1)]);
        let mut stats = CoocStats::from_counts(dictionary, counts).unwrap();
        assert_eq!(stats.density(1.0), 0.5);
        assert_eq!(stats.density(2.0), 0.5);
        assert_eq!(stats.density(0.0), 1.0);
        assert_eq!(stats.density(-0.5), 1.0);
    }

    #[test]
    fn merge_unions_vocabularies() {
        let (dictionary, counts, array) = fixture();
        let stats1 = CoocStats::from_counts(dictionary.clone(), counts.clone()).unwrap();

        let mut stats2 = CoocStats::new();
        for (a, b) in [
            ("banana", "banana"), ("banana", "car"), ("banana", "car"),
            ("banana", "socks"), ("cave", "car"), ("cave", "socks"),
        ] {
            stats2.add(a, b);
            stats2.add(b, a);
        }
        let array2 = array![
            [2., 2., 1., 0.],
            [2., 0., 0., 1.],
            [1., 0., 0., 1.],
            [0., 1., 1., 0.]
        ];

        let mut sum = &stats2 + &stats1;

        // inputs are untouched
        let mut stats1 = stats1;
        assert_eq!(stats1.counts(), &counts);
        assert_eq!(stats1.nxx().to_dense(), array);
        assert_eq!(stats1.dictionary(), &dictionary);
        assert_eq!(stats2.nxx().to_dense(), array2);
        assert_eq!(stats2.dictionary().tokens(), &["banana", "car", "socks", "cave"]);

        assert_eq!(sum.dictionary().tokens(), &["banana", "socks", "car", "cave", "field"]);
        let array_sum = array![
            [2., 4., 3., 0., 1.],
            [4., 0., 1., 1., 0.],
            [3., 1., 0., 1., 0.],
            [0., 1., 1., 0., 0.],
            [1., 0., 0., 0., 0.]
        ];
        assert_eq!(sum.nxx().to_dense(), array_sum);
        assert_eq!(sum.n(), stats1.n() + stats2.n());
    }

    #[test]
    fn merge_is_commutative_and_associative() {
        let mut a = CoocStats::new();
        let mut b = CoocStats::new();
        let mut c = CoocStats::new();
        for (x, y) in [("the", "cat"), ("cat", "sat"), ("sat", "the")] {
            a.add(x, y);
            a.add(y, x);
        }
        for (x, y) in [("dog", "the"), ("the", "cat"), ("dog", "dog")] {
            b.add(x, y);
            b.add(y, x);
        }
        for (x, y) in [("mat", "sat"), ("bird", "dog")] {
            c.add(x, y);
            c.add(y, x);
        }

        let mut ab = &a + &b;
        let mut ba = &b + &a;
        assert_eq!(by_token(&mut ab), by_token(&mut ba));
        assert_eq!(ab.n(), ba.n());

        let mut ab_c = &(&a + &b) + &c;
        let mut a_bc = &a + &(&b + &c);
        assert_eq!(by_token(&mut ab_c), by_token(&mut a_bc));
        assert_eq!(ab_c.n(), a_bc.n());
    }

    #[test]
    fn shards_cover_the_matrix() {
        let (dictionary, counts, array) = fixture();
        let mut stats = CoocStats::from_counts(dictionary, counts).unwrap();

        let whole = stats.load_shard(&Shard::whole());
        assert_eq!(whole.nxx, array);
        assert_eq!(whole.nx, array![[5.], [4.], [2.], [1.]]);
        assert_eq!(whole.nxt, array![[5., 4., 2., 1.]]);
        assert_eq!(whole.n, 12.0);

        let mut total = 0.0;
        for shard in Shards::new(2) {
            total += stats.load_shard(&shard).nxx.sum();
        }
        assert_eq!(total, 12.0);

        let corner = stats.load_shard(&Shard::new(0, 1, 2));
        assert_eq!(corner.nxx, array![[3., 1.], [1., 0.]]);
        assert_eq!(corner.nx, array![[5.], [2.]]);
        assert_eq!(corner.nxt, array![[4., 1.]]);
    }

    #[test]
    fn undersampling_thins_counts() {
        let (dictionary, counts, _) = fixture();
        let mut stats = CoocStats::from_counts(dictionary, counts).unwrap();
        let keep = Array1::from(vec![0.5, 1.0, 1.0, 1.0]);
        let shard = stats.load_shard_undersampled(&Shard::whole(), &keep);
        assert_abs_diff_eq!(shard.nxx[[0, 1]], 1.5);
        assert_abs_diff_eq!(shard.nxx[[2, 1]], 1.0);
        assert_abs_diff_eq!(shard.n, 12.0 - 10.0 * 0.5);
        assert_abs_diff_eq!(shard.nx[[0, 0]], 2.5);
    }

    #[test]
    fn save_load_counts_basis() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats");
        let (dictionary, counts, _) = fixture();
        let mut stats = CoocStats::from_counts(dictionary, counts).unwrap();
        stats.save(&path).unwrap();
        let mut loaded = CoocStats::load(&path).unwrap();
        assert!(!loaded.is_compiled());
        assert_eq!(loaded.dictionary(), stats.dictionary());
        assert_eq!(loaded.counts(), stats.counts());
        assert_eq!(loaded.nxx(), stats.nxx());
        assert_eq!(loaded.nx(), stats.nx());
    }

    #[test]
    fn save_load_matrix_basis_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats");
        let (dictionary, counts, array) = fixture();
        CoocStats::new().save(&path).unwrap();

        let mut stats = CoocStats::from_counts(dictionary, counts).unwrap();
        stats.compile();
        stats.save(&path).unwrap();
        let mut loaded = CoocStats::load(&path).unwrap();
        assert!(loaded.is_compiled());
        assert_eq!(loaded.nxx().to_dense(), array);
        assert_eq!(loaded.dictionary().tokens(), stats.dictionary().tokens());
        assert!(!dir.path().join("stats.staging").exists());
        assert!(!dir.path().join("stats.old").exists());
    }

    #[test]
    fn save_replaces_stale_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats");
        let (dictionary, counts, _) = fixture();
        CoocStats::new().save(&path).unwrap();
        // debris of an interrupted earlier save
        std::fs::create_dir_all(dir.path().join("stats.old")).unwrap();
        std::fs::create_dir_all(dir.path().join("stats.staging")).unwrap();

        let mut stats = CoocStats::from_counts(dictionary, counts).unwrap();
        stats.save(&path).unwrap();
        let mut loaded = CoocStats::load(&path).unwrap();
        assert_eq!(loaded.counts(), stats.counts());
        assert!(!dir.path().join("stats.old").exists());
        assert!(!dir.path().join("stats.staging").exists());
    }

    #[test]
    fn load_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = CoocStats::load(&dir.path().join("nothing"));
        assert!(matches!(result, Err(EmbeddingError::NotFound(_))));
    }
}
