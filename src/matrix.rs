//! Dense matrix kernels operating directly on [`Weight`] buffers.
//!
//! Every kernel here assumes `dst` and `src` never alias the same memory —
//! that precondition is encoded by taking disjoint `&mut`/`&` slices rather
//! than raw pointers, so the borrow checker enforces it instead of a
//! `restrict` annotation.

use crate::weight::{mul, Weight};

/// Seeds `dst[0..out_n)` with the layer's biases, then accumulates the
/// contribution of every nonzero input neuron.
///
/// `weights` is one layer's block: `in_n * out_n` weights (row `i` is input
/// neuron `i`'s contribution to every output) followed by `out_n` biases.
///
/// The `src[i] == 0` / `src[i] == ONE` fast paths are mandatory: they are
/// the crate's main inference-time optimization (most accumulator inputs
/// are exactly zero or one) and must be preserved by any future rewrite of
/// this function.
pub fn forwardprop(dst: &mut [Weight], src: &[Weight], weights: &[Weight], out_n: usize, in_n: usize) {
    debug_assert_eq!(dst.len(), out_n);
    debug_assert_eq!(src.len(), in_n);
    debug_assert_eq!(weights.len(), in_n * out_n + out_n);

    let biases = &weights[in_n * out_n..in_n * out_n + out_n];
    dst.copy_from_slice(biases);

    for i in 0..in_n {
        let v = src[i];
        if v == 0 {
            continue;
        }
        let row = &weights[i * out_n..(i + 1) * out_n];
        if v == crate::weight::ONE {
            for (d, w) in dst.iter_mut().zip(row) {
                *d = d.wrapping_add(*w);
            }
        } else {
            for (d, w) in dst.iter_mut().zip(row) {
                *d = d.wrapping_add(mul(v, *w));
            }
        }
    }
}

/// Back-propagates a downstream layer's error `src` (length `out_n`) into
/// the upstream layer's error `dst` (length `in_n`), using the same
/// `in_n * out_n` weight block `forwardprop` used going forward.
pub fn backprop(dst: &mut [Weight], src: &[Weight], weights: &[Weight], out_n: usize, in_n: usize) {
    debug_assert_eq!(dst.len(), in_n);
    debug_assert_eq!(src.len(), out_n);
    debug_assert!(weights.len() >= in_n * out_n);

    dst.fill(0);
    for i in 0..in_n {
        let row = &weights[i * out_n..(i + 1) * out_n];
        let mut acc: Weight = 0;
        for (s, w) in src.iter().zip(row) {
            acc = acc.wrapping_add(mul(*s, *w));
        }
        dst[i] = acc;
    }
}

/// Accumulates this sample's contribution to a layer's weight/bias
/// gradient: `gradient[i*out_n+o] += (err[o] * src[i]) >> P` for every
/// input/output pair, plus a raw `err[o]` added to the bias gradient.
pub fn gradupdate(gradient: &mut [Weight], err: &[Weight], src: &[Weight], in_n: usize, out_n: usize) {
    debug_assert_eq!(err.len(), out_n);
    debug_assert_eq!(src.len(), in_n);
    debug_assert_eq!(gradient.len(), in_n * out_n + out_n);

    for i in 0..in_n {
        let row = &mut gradient[i * out_n..(i + 1) * out_n];
        for (g, e) in row.iter_mut().zip(err) {
            *g = g.wrapping_add(mul(*e, src[i]));
        }
    }
    let bias_grad = &mut gradient[in_n * out_n..in_n * out_n + out_n];
    for (g, e) in bias_grad.iter_mut().zip(err) {
        *g = g.wrapping_add(*e);
    }
}

/// Elementwise (Hadamard) product, in place on `dst`.
pub fn hadamard(dst: &mut [Weight], src: &[Weight]) {
    debug_assert_eq!(dst.len(), src.len());
    for (d, s) in dst.iter_mut().zip(src) {
        *d = mul(*d, *s);
    }
}

/// Adds a first-layer weight row into the accumulator (feature turned on).
pub fn increment(acc: &mut [Weight], weights: &[Weight]) {
    debug_assert_eq!(acc.len(), weights.len());
    for (a, w) in acc.iter_mut().zip(weights) {
        *a = a.wrapping_add(*w);
    }
}

/// Subtracts a first-layer weight row from the accumulator (feature turned off).
pub fn decrement(acc: &mut [Weight], weights: &[Weight]) {
    debug_assert_eq!(acc.len(), weights.len());
    for (a, w) in acc.iter_mut().zip(weights) {
        *a = a.wrapping_sub(*w);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weight::ONE;

    fn naive_forwardprop(src: &[Weight], weights: &[Weight], out_n: usize, in_n: usize) -> Vec<Weight> {
        let mut dst = vec![0; out_n];
        let biases = &weights[in_n * out_n..in_n * out_n + out_n];
        dst.copy_from_slice(biases);
        for i in 0..in_n {
            for k in 0..out_n {
                dst[k] = dst[k].wrapping_add(mul(src[i], weights[i * out_n + k]));
            }
        }
        dst
    }

    #[test]
    fn forwardprop_matches_naive_dense_implementation() {
        let in_n = 4;
        let out_n = 3;
        let weights: Vec<Weight> = vec![
            100, -200, 300, // input 0
            400, 500, -600, // input 1
            -700, 800, 900, // input 2
            10, 20, 30, // input 3
            1000, 2000, 3000, // biases
        ];
        let src = vec![0, ONE, 12345, -500];

        let mut dst = vec![0; out_n];
        forwardprop(&mut dst, &src, &weights, out_n, in_n);

        let expected = naive_forwardprop(&src, &weights, out_n, in_n);
        assert_eq!(dst, expected);
    }

    #[test]
    fn forwardprop_zero_skips_entirely() {
        let in_n = 1;
        let out_n = 2;
        let weights: Vec<Weight> = vec![99999, 99999, 7, 8];
        let src = vec![0];
        let mut dst = vec![0; out_n];
        forwardprop(&mut dst, &src, &weights, out_n, in_n);
        assert_eq!(dst, vec![7, 8]);
    }

    #[test]
    fn increment_then_decrement_cancels() {
        let weights: Vec<Weight> = vec![10, -20, 30];
        let mut acc = vec![1, 2, 3];
        let before = acc.clone();
        increment(&mut acc, &weights);
        decrement(&mut acc, &weights);
        assert_eq!(acc, before);
    }

    #[test]
    fn hadamard_applies_fixed_point_mul() {
        let mut dst = vec![ONE, 2 * ONE];
        let src = vec![ONE / 2, ONE];
        hadamard(&mut dst, &src);
        assert_eq!(dst, vec![ONE / 2, 2 * ONE]);
    }
}
