use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};


/// Compressed sparse row matrix holding co-occurrence counts.
///
/// Column indices within a row are kept sorted and unique, so two matrices
/// built from the same cells compare equal regardless of insertion order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CsrMatrix {
    shape: (usize, usize),
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<f64>,
}

impl CsrMatrix {

    pub fn zeros(shape: (usize, usize)) -> CsrMatrix {
        Self {
            shape,
            indptr: vec![0; shape.0 + 1],
            indices: Vec::new(),
            data: Vec::new(),
        }
    }

    /// Build from `(row, col, value)` cells. Repeated cells are summed and
    /// explicit zeros are dropped.
    pub fn from_triplets<I>(shape: (usize, usize), triplets: I) -> CsrMatrix
    where
        I: IntoIterator<Item = (usize, usize, f64)> {

        let mut cells: Vec<(usize, usize, f64)> = triplets.into_iter().collect();
        cells.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let mut indptr = vec![0; shape.0 + 1];
        let mut indices: Vec<usize> = Vec::with_capacity(cells.len());
        let mut data: Vec<f64> = Vec::with_capacity(cells.len());
        let mut last: Option<(usize, usize)> = None;

        for (i, j, v) in cells {
            assert!(i < shape.0 && j < shape.1, "cell ({}, {}) outside shape {:?}", i, j, shape);
            if last == Some((i, j)) {
                if let Some(acc) = data.last_mut() {
                    *acc += v;
                }
                continue;
            }
            indices.push(j);
            data.push(v);
            indptr[i + 1] += 1;
            last = Some((i, j));
        }

        for i in 0..shape.0 {
            indptr[i + 1] += indptr[i];
        }

        let mut matrix = Self { shape, indptr, indices, data };
        matrix.eliminate_zeros();
        matrix
    }

    pub fn from_dense(dense: &Array2<f64>) -> CsrMatrix {
        let shape = dense.dim();
        let cells = dense
            .indexed_iter()
            .filter(|(_, v)| **v != 0.0)
            .map(|((i, j), v)| (i, j, *v));
        CsrMatrix::from_triplets(shape, cells)
    }

    fn eliminate_zeros(&mut self) {
        if !self.data.iter().any(|v| *v == 0.0) {
            return;
        }
        let cells: Vec<(usize, usize, f64)> = self.iter().filter(|c| c.2 != 0.0).collect();
        *self = CsrMatrix::from_triplets(self.shape, cells);
    }

    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        let (start, end) = (self.indptr[i], self.indptr[i + 1]);
        match self.indices[start..end].binary_search(&j) {
            Ok(k) => self.data[start + k],
            Err(_) => 0.0,
        }
    }

    /// Nonzero cells in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        (0..self.shape.0).flat_map(move |i| {
            (self.indptr[i]..self.indptr[i + 1]).map(move |k| (i, self.indices[k], self.data[k]))
        })
    }

    pub fn values(&self) -> &[f64] {
        &self.data
    }

    pub fn row_sums(&self) -> Array1<f64> {
        Array1::from_iter((0..self.shape.0).map(|i| {
            self.data[self.indptr[i]..self.indptr[i + 1]].iter().sum::<f64>()
        }))
    }

    pub fn col_sums(&self) -> Array1<f64> {
        let mut sums = Array1::zeros(self.shape.1);
        for (_, j, v) in self.iter() {
            sums[j] += v;
        }
        sums
    }

    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }

    pub fn to_dense(&self) -> Array2<f64> {
        let mut dense = Array2::zeros(self.shape);
        for (i, j, v) in self.iter() {
            dense[[i, j]] = v;
        }
        dense
    }

    /// Dense block at the given rows and columns.
    pub fn select(&self, rows: &[usize], cols: &[usize]) -> Array2<f64> {
        let mut col_pos = vec![None; self.shape.1];
        for (c, j) in cols.iter().enumerate() {
            col_pos[*j] = Some(c);
        }
        let mut block = Array2::zeros((rows.len(), cols.len()));
        for (r, i) in rows.iter().enumerate() {
            for k in self.indptr[*i]..self.indptr[*i + 1] {
                if let Some(c) = col_pos[self.indices[k]] {
                    block[[r, c]] = self.data[k];
                }
            }
        }
        block
    }

    /// Symmetric relabelling: new cell `(a, b)` is old cell
    /// `(order[a], order[b])`. Ids missing from `order` are dropped.
    pub fn permute(&self, order: &[usize]) -> CsrMatrix {
        let mut new_id = vec![None; self.shape.0.max(self.shape.1)];
        for (new, old) in order.iter().enumerate() {
            new_id[*old] = Some(new);
        }
        let cells = self.iter().filter_map(|(i, j, v)| match (new_id[i], new_id[j]) {
            (Some(a), Some(b)) => Some((a, b, v)),
            _ => None,
        });
        CsrMatrix::from_triplets((order.len(), order.len()), cells)
    }
}


#[cfg(test)]
mod tests {

    use super::CsrMatrix;
    use ndarray::{array, Array1};

    fn example() -> CsrMatrix {
        CsrMatrix::from_triplets((4, 4), vec![
            (0, 1, 3.0), (1, 0, 3.0), (0, 3, 1.0), (3, 0, 1.0),
            (2, 1, 1.0), (1, 2, 1.0), (0, 2, 1.0), (2, 0, 1.0),
        ])
    }

    #[test]
    fn triplets_to_dense() {
        let m = example();
        assert_eq!(m.nnz(), 8);
        assert_eq!(m.to_dense(), array![
            [0., 3., 1., 1.],
            [3., 0., 1., 0.],
            [1., 1., 0., 0.],
            [1., 0., 0., 0.]
        ]);
        assert_eq!(m.get(0, 1), 3.0);
        assert_eq!(m.get(3, 3), 0.0);
        assert_eq!(m.row_sums(), Array1::from(vec![5., 4., 2., 1.]));
        assert_eq!(m.sum(), 12.0);
    }

    #[test]
    fn duplicates_sum_and_zeros_vanish() {
        let m = CsrMatrix::from_triplets((2, 2), vec![(1, 1, 2.0), (0, 0, 0.0), (1, 1, 1.0)]);
        assert_eq!(m.nnz(), 1);
        assert_eq!(m.get(1, 1), 3.0);
        assert_eq!(CsrMatrix::from_dense(&m.to_dense()), m);
    }

    #[test]
    fn permute_and_truncate() {
        let m = example();
        let p = m.permute(&[3, 2, 1, 0]);
        assert_eq!(p.get(0, 3), 1.0);
        assert_eq!(p.get(2, 3), 3.0);
        let t = m.permute(&[0, 1, 2]);
        assert_eq!(t.shape(), (3, 3));
        assert_eq!(t.sum(), 10.0);
    }

    #[test]
    fn select_strided_block() {
        let m = example();
        assert_eq!(m.select(&[0, 2], &[1, 3]), array![[3., 1.], [1., 0.]]);
    }
}
