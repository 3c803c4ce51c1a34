//! Thin façade over the matrix kernels and the network object, giving the
//! external search engine an O(layer-width) way to keep the first layer's
//! pre-activation vector up to date as individual input features toggle.

use crate::errors::{NnError, NnResult};
use crate::matrix;
use crate::network::Network;
use crate::weight::Weight;

/// Sets `acc[0..size[1])` to the first layer's biases — the accumulator's
/// value when no input feature is active.
pub fn acc_reset(nn: &Network, acc: &mut [Weight]) -> NnResult<()> {
    let in_n = nn.sizes()[0];
    let out_n = nn.sizes()[1];
    if acc.len() < out_n {
        return Err(NnError::InvalidArgument(format!(
            "accumulator buffer needs at least {out_n} elements"
        )));
    }
    let biases = &nn.layer_weights(0)[in_n * out_n..in_n * out_n + out_n];
    acc[..out_n].copy_from_slice(biases);
    Ok(())
}

/// Adds the first-layer weight row for input `idx` into `acc` — call when
/// feature `idx` turns on.
pub fn acc_increment(nn: &Network, acc: &mut [Weight], idx: usize) -> NnResult<()> {
    let in_n = nn.sizes()[0];
    let out_n = nn.sizes()[1];
    if idx >= in_n {
        return Err(NnError::InvalidArgument(format!(
            "accumulator index {idx} out of range (size[0]={in_n})"
        )));
    }
    let row = &nn.layer_weights(0)[idx * out_n..(idx + 1) * out_n];
    matrix::increment(&mut acc[..out_n], row);
    Ok(())
}

/// Subtracts the first-layer weight row for input `idx` from `acc` — call
/// when feature `idx` turns off. Exactly cancels a prior `acc_increment`.
pub fn acc_decrement(nn: &Network, acc: &mut [Weight], idx: usize) -> NnResult<()> {
    let in_n = nn.sizes()[0];
    let out_n = nn.sizes()[1];
    if idx >= in_n {
        return Err(NnError::InvalidArgument(format!(
            "accumulator index {idx} out of range (size[0]={in_n})"
        )));
    }
    let row = &nn.layer_weights(0)[idx * out_n..(idx + 1) * out_n];
    matrix::decrement(&mut acc[..out_n], row);
    Ok(())
}

/// Applies layer 1's activation to `acc` into `out_buf`, then runs the
/// remaining `L-1` layers exactly as [`Network::const_compute`] would,
/// using `acc` and `out_buf` as the ping-pong pair. Both buffers need only
/// be large enough for `max(size[1..L])`.
pub fn acc_compute(nn: &Network, acc: &mut [Weight], out_buf: &mut [Weight]) -> NnResult<Vec<Weight>> {
    let layers = nn.layers();
    let first_out = nn.sizes()[1];
    let max_tail = nn.sizes()[1..=layers].iter().copied().max().unwrap_or(first_out);
    if acc.len() < max_tail || out_buf.len() < max_tail {
        return Err(NnError::InvalidArgument(format!(
            "accumulator compute buffers must hold at least {max_tail} elements"
        )));
    }

    nn.activation_id(0).forward(&acc[..first_out], &mut out_buf[..first_out]);

    if layers == 1 {
        return Ok(out_buf[..first_out].to_vec());
    }

    let mut io = out_buf;
    let mut scratch = acc;
    let mut io_is_src = true;
    let mut pre_activation = vec![0 as Weight; max_tail];

    for l in 1..layers {
        let in_n = nn.sizes()[l];
        let out_n = nn.sizes()[l + 1];
        let weights = nn.layer_weights(l);
        let act = nn.activation_id(l);

        if io_is_src {
            matrix::forwardprop(&mut pre_activation[..out_n], &io[..in_n], weights, out_n, in_n);
            act.forward(&pre_activation[..out_n], &mut scratch[..out_n]);
        } else {
            matrix::forwardprop(&mut pre_activation[..out_n], &scratch[..in_n], weights, out_n, in_n);
            act.forward(&pre_activation[..out_n], &mut io[..out_n]);
        }
        io_is_src = !io_is_src;
    }

    // `io_is_src` tracks where the most recent activation output landed:
    // true means `io`, false means `scratch` — same convention as
    // `Network::const_compute`.
    let final_n = nn.sizes()[layers];
    let result = if io_is_src { io[..final_n].to_vec() } else { scratch[..final_n].to_vec() };
    Ok(result)
}
