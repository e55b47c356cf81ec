// PMI family over a loaded shard. Zero counts give -inf and zero marginals
// give NaN; sanitising those is left to the M effects.

use crate::cooc_stats::CoocShard;

use ndarray::Array2;


fn pmi_with(shard: &CoocShard, nxx: impl Fn(f64) -> f64) -> Array2<f64> {
    let log_n = shard.n.ln();
    Array2::from_shape_fn(shard.nxx.dim(), |(i, j)| {
        log_n + nxx(shard.nxx[[i, j]]).ln() - shard.nx[[i, 0]].ln() - shard.nxt[[0, j]].ln()
    })
}

/// `log N + log Nxx - log Nx - log Nxt`.
pub fn calc_pmi(shard: &CoocShard) -> Array2<f64> {
    pmi_with(shard, |v| v)
}

pub fn calc_positive_pmi(shard: &CoocShard) -> Array2<f64> {
    calc_pmi(shard).mapv_into(|v| if v < 0.0 { 0.0 } else { v })
}

/// PMI shifted down by `log k`, the fixed point of word2vec with `k`
/// negative samples.
pub fn calc_shifted_pmi(shard: &CoocShard, k: f64) -> Array2<f64> {
    calc_pmi(shard) - k.ln()
}

/// PMI with every zero count replaced by one.
pub fn calc_pmi_star(shard: &CoocShard) -> Array2<f64> {
    pmi_with(shard, |v| if v == 0.0 { 1.0 } else { v })
}

/// Swivel's target: PMI where the pair was observed and
/// `log N - log Nx - log Nxt` where it was not.
pub fn calc_m_swivel(shard: &CoocShard) -> Array2<f64> {
    calc_pmi_star(shard)
}


#[cfg(test)]
mod tests {

    use super::{calc_m_swivel, calc_pmi, calc_pmi_star, calc_positive_pmi, calc_shifted_pmi};
    use crate::cooc_stats::CoocShard;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn shard() -> CoocShard {
        CoocShard {
            nxx: array![
                [0., 3., 1., 1.],
                [3., 0., 1., 0.],
                [1., 1., 0., 0.],
                [1., 0., 0., 0.]
            ],
            nx: array![[5.], [4.], [2.], [1.]],
            nxt: array![[5., 4., 2., 1.]],
            n: 10.0,
        }
    }

    #[test]
    fn pmi_of_banana_socks() {
        let pmi = calc_pmi(&shard());
        let expected = 10f64.ln() + 3f64.ln() - 5f64.ln() - 4f64.ln();
        assert_abs_diff_eq!(pmi[[0, 1]], expected, epsilon = 1e-12);
        assert_abs_diff_eq!(pmi[[1, 0]], expected, epsilon = 1e-12);
        assert_eq!(pmi[[0, 0]], f64::NEG_INFINITY);
    }

    #[test]
    fn positive_pmi_clamps_negatives() {
        let pmi = calc_pmi(&shard());
        let ppmi = calc_positive_pmi(&shard());
        for (p, q) in pmi.iter().zip(ppmi.iter()) {
            assert!(*q >= 0.0);
            if *p > 0.0 {
                assert_eq!(p, q);
            }
        }
        assert_eq!(ppmi[[3, 3]], 0.0);
    }

    #[test]
    fn shifted_pmi_subtracts_log_k() {
        let pmi = calc_pmi(&shard());
        let shifted = calc_shifted_pmi(&shard(), 15.0);
        assert_abs_diff_eq!(shifted[[0, 2]], pmi[[0, 2]] - 15f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn pmi_star_replaces_zero_counts() {
        let star = calc_pmi_star(&shard());
        assert!(star.iter().all(|v| v.is_finite()));
        assert_abs_diff_eq!(star[[3, 3]], 10f64.ln(), epsilon = 1e-12);
        assert_abs_diff_eq!(star[[0, 1]], calc_pmi(&shard())[[0, 1]], epsilon = 1e-12);
    }

    #[test]
    fn swivel_target_for_unobserved_pairs() {
        let m = calc_m_swivel(&shard());
        assert_abs_diff_eq!(m[[1, 3]], 10f64.ln() - 4f64.ln() - 1f64.ln(), epsilon = 1e-12);
        assert_abs_diff_eq!(m[[0, 3]], 10f64.ln() - 5f64.ln(), epsilon = 1e-12);
    }
}
