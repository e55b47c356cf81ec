// shard descriptors.
// a shard is the strided sub-block rows row_start, row_start + step, ...
// by cols col_start, col_start + step, ... of a square matrix.
// `Shard::whole()` (step 1, offsets 0) addresses the full matrix.


#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Shard {
    pub row_start: usize,
    pub col_start: usize,
    pub step: usize,
}

impl Shard {

    pub fn new(row_start: usize, col_start: usize, step: usize) -> Shard {
        assert!(step > 0, "shard step must be positive");
        Self { row_start, col_start, step }
    }

    pub fn whole() -> Shard {
        Self::new(0, 0, 1)
    }

    /// Whether the shard holds cells of the main diagonal. Only such shards
    /// are touched by the diagonal effect, and the diagonal of the block is
    /// exactly the part of the main diagonal it contains.
    pub fn on_diag(&self) -> bool {
        self.row_start == self.col_start
    }

    pub fn rows(&self, n: usize) -> Vec<usize> {
        (self.row_start..n).step_by(self.step).collect()
    }

    pub fn cols(&self, n: usize) -> Vec<usize> {
        (self.col_start..n).step_by(self.step).collect()
    }
}

impl Default for Shard {
    fn default() -> Self {
        Shard::whole()
    }
}


/// Iterates the `factor * factor` shards that tile a matrix.
pub struct Shards {
    factor: usize,
    next: usize,
}

impl Shards {
    pub fn new(factor: usize) -> Shards {
        assert!(factor > 0, "shard factor must be positive");
        Self { factor, next: 0 }
    }
}

impl Iterator for Shards {
    type Item = Shard;

    fn next(&mut self) -> Option<Shard> {
        if self.next >= self.factor * self.factor {
            return None;
        }
        let shard = Shard::new(self.next / self.factor, self.next % self.factor, self.factor);
        self.next += 1;
        Some(shard)
    }
}
