//! The network object: owns layer shape, the contiguous weight buffer, and
//! the per-layer activation bindings. See the crate's design notes on the
//! weight buffer layout this module depends on.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read};
use std::path::Path;

use crate::activations::ActivationId;
use crate::errors::{NnError, NnResult};
use crate::matrix;
use crate::weight::{self, rate, Weight};

/// A strictly-sequential dense feed-forward network stored entirely in
/// fixed point.
#[derive(Clone, Debug)]
pub struct Network {
    /// Number of parametric layers.
    layers: usize,
    /// Neuron counts, `size[0..=layers]`.
    sizes: Vec<usize>,
    /// One activation id per layer, `activation_ids[0..layers]`.
    activation_ids: Vec<ActivationId>,
    /// Element offset of layer `l`'s block into `weights`.
    offsets: Vec<usize>,
    /// Single contiguous weight buffer; see module docs for layout.
    weights: Vec<Weight>,
    scratch_a: Vec<Weight>,
    scratch_b: Vec<Weight>,
}

fn compute_offsets(sizes: &[usize]) -> Vec<usize> {
    let layers = sizes.len() - 1;
    let mut offsets = vec![0usize; layers];
    for l in 1..layers {
        offsets[l] = offsets[l - 1] + (sizes[l - 1] + 1) * sizes[l];
    }
    offsets
}

fn total_weight_count(sizes: &[usize]) -> usize {
    let layers = sizes.len() - 1;
    if layers == 0 {
        return 0;
    }
    let offsets = compute_offsets(sizes);
    offsets[layers - 1] + (sizes[layers - 1] + 1) * sizes[layers]
}

impl Network {
    /// Validates shapes and activation ids, allocates every buffer, and
    /// zeroes the weight buffer.
    pub fn create(sizes: Vec<usize>, activation_ids: Vec<ActivationId>) -> NnResult<Network> {
        if sizes.len() < 2 {
            return Err(NnError::InvalidArgument(
                "a network needs at least an input and an output layer".into(),
            ));
        }
        let layers = sizes.len() - 1;
        if activation_ids.len() != layers {
            return Err(NnError::InvalidArgument(format!(
                "expected {layers} activation ids, got {}",
                activation_ids.len()
            )));
        }
        for (l, &s) in sizes.iter().enumerate() {
            if s == 0 {
                return Err(NnError::InvalidArgument(format!("layer size {l} is zero")));
            }
        }

        let offsets = compute_offsets(&sizes);
        let weight_count = total_weight_count(&sizes);
        let max_size = *sizes.iter().max().unwrap();

        // `weight_count` is derived from caller-supplied layer sizes and can
        // be arbitrarily large, unlike the fixed-size scratch buffers below:
        // pre-reserve it explicitly so an unreasonable shape reports
        // `OutOfMemory` instead of aborting the process.
        let mut weights = Vec::new();
        weights.try_reserve_exact(weight_count).map_err(|e| {
            NnError::OutOfMemory(format!("could not allocate {weight_count} weights: {e}"))
        })?;
        weights.resize(weight_count, 0);

        Ok(Network {
            layers,
            sizes,
            activation_ids,
            offsets,
            weights,
            scratch_a: vec![0; max_size],
            scratch_b: vec![0; max_size],
        })
    }

    pub fn layers(&self) -> usize {
        self.layers
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    pub fn activation_id(&self, layer: usize) -> ActivationId {
        self.activation_ids[layer]
    }

    pub fn offset(&self, layer: usize) -> usize {
        self.offsets[layer]
    }

    pub fn weights(&self) -> &[Weight] {
        &self.weights
    }

    pub fn weights_mut(&mut self) -> &mut [Weight] {
        &mut self.weights
    }

    /// The `(in*out + out)`-element block of layer `l`.
    pub fn layer_weights(&self, l: usize) -> &[Weight] {
        let in_n = self.sizes[l];
        let out_n = self.sizes[l + 1];
        &self.weights[self.offsets[l]..self.offsets[l] + (in_n + 1) * out_n]
    }

    pub fn layer_weights_mut(&mut self, l: usize) -> &mut [Weight] {
        let in_n = self.sizes[l];
        let out_n = self.sizes[l + 1];
        &mut self.weights[self.offsets[l]..self.offsets[l] + (in_n + 1) * out_n]
    }

    /// Swaps in a new activation for a layer; weights are untouched.
    pub fn set_layer_activation(&mut self, layer: usize, id: ActivationId) -> NnResult<()> {
        if layer >= self.layers {
            return Err(NnError::InvalidArgument(format!(
                "layer {layer} out of range (network has {} layers)",
                self.layers
            )));
        }
        self.activation_ids[layer] = id;
        Ok(())
    }

    /// Copies `inputs` into scratch, runs every layer's forwardprop +
    /// activation ping-ponging between the two scratch buffers, and writes
    /// the final layer's output into `outputs`.
    pub fn compute(&mut self, inputs: &[Weight], outputs: &mut [Weight]) -> NnResult<()> {
        if inputs.len() != self.sizes[0] {
            return Err(NnError::InvalidArgument(format!(
                "expected {} inputs, got {}",
                self.sizes[0],
                inputs.len()
            )));
        }
        if outputs.len() != self.sizes[self.layers] {
            return Err(NnError::InvalidArgument(format!(
                "expected {} outputs, got {}",
                self.sizes[self.layers],
                outputs.len()
            )));
        }

        self.scratch_a[..inputs.len()].copy_from_slice(inputs);
        let mut cur_is_a = true;
        let mut pre_activation = vec![0 as Weight; *self.sizes.iter().max().unwrap()];

        for l in 0..self.layers {
            let in_n = self.sizes[l];
            let out_n = self.sizes[l + 1];
            let weights = &self.weights[self.offsets[l]..self.offsets[l] + (in_n + 1) * out_n];

            if cur_is_a {
                matrix::forwardprop(&mut pre_activation[..out_n], &self.scratch_a[..in_n], weights, out_n, in_n);
                self.activation_ids[l].forward(&pre_activation[..out_n], &mut self.scratch_b[..out_n]);
            } else {
                matrix::forwardprop(&mut pre_activation[..out_n], &self.scratch_b[..in_n], weights, out_n, in_n);
                self.activation_ids[l].forward(&pre_activation[..out_n], &mut self.scratch_a[..out_n]);
            }
            cur_is_a = !cur_is_a;
        }

        let final_n = self.sizes[self.layers];
        if cur_is_a {
            outputs.copy_from_slice(&self.scratch_a[..final_n]);
        } else {
            outputs.copy_from_slice(&self.scratch_b[..final_n]);
        }
        Ok(())
    }

    /// Same as [`Network::compute`] but uses caller-supplied `io`/`scratch`
    /// buffers, each sized to at least `max(size)`, and never touches
    /// `self.scratch_a`/`scratch_b`. Input is in `io` on entry, output is in
    /// `io` on exit.
    pub fn const_compute(&self, io: &mut [Weight], scratch: &mut [Weight]) -> NnResult<()> {
        let max_size = *self.sizes.iter().max().unwrap();
        if io.len() < max_size || scratch.len() < max_size {
            return Err(NnError::InvalidArgument(format!(
                "const_compute buffers must hold at least {max_size} elements"
            )));
        }

        let mut io_is_src = true;
        let mut pre_activation = vec![0 as Weight; max_size];
        for l in 0..self.layers {
            let in_n = self.sizes[l];
            let out_n = self.sizes[l + 1];
            let weights = self.layer_weights(l);
            let act = self.activation_ids[l];

            if io_is_src {
                matrix::forwardprop(&mut pre_activation[..out_n], &io[..in_n], weights, out_n, in_n);
                act.forward(&pre_activation[..out_n], &mut scratch[..out_n]);
            } else {
                matrix::forwardprop(&mut pre_activation[..out_n], &scratch[..in_n], weights, out_n, in_n);
                act.forward(&pre_activation[..out_n], &mut io[..out_n]);
            }
            io_is_src = !io_is_src;
        }

        // `io_is_src` tracks where the most recent activation output was
        // written: true means `io`, false means `scratch`.
        if !io_is_src {
            let final_n = self.sizes[self.layers];
            io[..final_n].copy_from_slice(&scratch[..final_n]);
        }
        Ok(())
    }

    fn xorshift_next(state: &mut u64) -> u16 {
        *state ^= *state << 13;
        *state ^= *state >> 7;
        *state ^= *state << 17;
        (*state & 0xffff) as u16
    }

    /// Deterministic per-(seed, layer) xorshift64 weight initialization.
    pub fn init_layer_weights(&mut self, min_value: Weight, max_value: Weight, seed: u32, layer: usize) -> NnResult<()> {
        if layer >= self.layers {
            return Err(NnError::InvalidArgument(format!(
                "layer {layer} out of range (network has {} layers)",
                self.layers
            )));
        }
        let mut state = (seed as u64) + (layer as u64) * (1u64 << 32);
        if state == 0 {
            state = 1;
        }
        let block = self.layer_weights_mut(layer);
        for w in block.iter_mut() {
            let r16 = Self::xorshift_next(&mut state);
            *w = rate(min_value, max_value, r16);
        }
        Ok(())
    }

    /// Equivalent to calling [`Network::init_layer_weights`] for every
    /// layer in order.
    pub fn init_all_weights(&mut self, min_value: Weight, max_value: Weight, seed: u32) -> NnResult<()> {
        for l in 0..self.layers {
            self.init_layer_weights(min_value, max_value, seed, l)?;
        }
        Ok(())
    }

    /// Parses the binary format: `layers`, `size[0..=layers]`,
    /// `activation_id[0..layers]`, then each layer's weight block
    /// row-major. Reports the failing layer/index on truncation and warns
    /// (to stderr) about any trailing byte instead of erroring.
    pub fn load(path: impl AsRef<Path>) -> NnResult<Network> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        let layers = weight::read_u32(&mut reader)? as usize;
        if layers == 0 {
            return Err(NnError::FormatError("network file declares zero layers".into()));
        }

        let mut sizes = Vec::with_capacity(layers + 1);
        for i in 0..=layers {
            let s = weight::read_u32(&mut reader).map_err(|e| {
                NnError::FormatError(format!("truncated while reading size[{i}]: {e}"))
            })? as usize;
            if s == 0 {
                return Err(NnError::FormatError(format!("size[{i}] is zero")));
            }
            sizes.push(s);
        }

        let mut activation_ids = Vec::with_capacity(layers);
        for l in 0..layers {
            let raw = weight::read_u32(&mut reader).map_err(|e| {
                NnError::FormatError(format!("truncated while reading activation id for layer {l}: {e}"))
            })?;
            let id = ActivationId::from_raw(raw)
                .map_err(|e| NnError::FormatError(format!("layer {l}: {e}")))?;
            activation_ids.push(id);
        }

        let offsets = compute_offsets(&sizes);
        let weight_count = total_weight_count(&sizes);
        let mut weights = Vec::with_capacity(weight_count);

        for l in 0..layers {
            let in_n = sizes[l];
            let out_n = sizes[l + 1];
            for n in 0..in_n {
                for k in 0..out_n {
                    let w = weight::read_weight(&mut reader).map_err(|e| {
                        NnError::FormatError(format!(
                            "truncated weight at layer {l}, input {n}, output {k}: {e}"
                        ))
                    })?;
                    weights.push(w);
                }
            }
            for k in 0..out_n {
                let w = weight::read_weight(&mut reader).map_err(|e| {
                    NnError::FormatError(format!("truncated bias at layer {l}, output {k}: {e}"))
                })?;
                weights.push(w);
            }
        }

        let mut probe = [0u8; 1];
        if reader.read(&mut probe)? != 0 {
            eprintln!("warning: network file has trailing data past the last weight");
        }

        let max_size = *sizes.iter().max().unwrap();
        Ok(Network {
            layers,
            sizes,
            activation_ids,
            offsets,
            weights,
            scratch_a: vec![0; max_size],
            scratch_b: vec![0; max_size],
        })
    }

    /// Writes the binary format described on [`Network::load`].
    pub fn save(&self, path: impl AsRef<Path>) -> NnResult<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        weight::write_u32(&mut writer, self.layers as u32)?;
        for &s in &self.sizes {
            weight::write_u32(&mut writer, s as u32)?;
        }
        for id in &self.activation_ids {
            weight::write_u32(&mut writer, id.raw())?;
        }
        for &w in &self.weights {
            weight::write_weight(&mut writer, w)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weight::ONE;

    fn identity_net(sizes: Vec<usize>) -> Network {
        let layers = sizes.len() - 1;
        Network::create(sizes, vec![ActivationId::IDENTITY; layers]).unwrap()
    }

    #[test]
    fn create_rejects_zero_size_layer() {
        assert!(Network::create(vec![2, 0, 1], vec![ActivationId::IDENTITY; 2]).is_err());
    }

    #[test]
    fn create_rejects_mismatched_activation_count() {
        assert!(Network::create(vec![2, 2, 1], vec![ActivationId::IDENTITY]).is_err());
    }

    #[test]
    fn offsets_follow_layer_block_formula() {
        let net = identity_net(vec![2, 3, 1]);
        assert_eq!(net.offset(0), 0);
        assert_eq!(net.offset(1), (2 + 1) * 3);
    }

    #[test]
    fn zero_weight_identity_net_computes_zero_output() {
        let mut net = identity_net(vec![3, 3, 1]);
        let inputs = vec![ONE, -ONE, 2 * ONE];
        let mut outputs = vec![0];
        net.compute(&inputs, &mut outputs).unwrap();
        assert_eq!(outputs, vec![0]);
    }

    #[test]
    fn const_compute_matches_compute_on_identity_net() {
        let mut net = identity_net(vec![2, 2, 1]);
        net.init_all_weights(-ONE, ONE, 1).unwrap();

        let inputs = vec![ONE / 3, -ONE / 5];
        let mut via_compute = vec![0];
        net.compute(&inputs, &mut via_compute).unwrap();

        let max_size = *net.sizes().iter().max().unwrap();
        let mut io = vec![0; max_size];
        io[..2].copy_from_slice(&inputs);
        let mut scratch = vec![0; max_size];
        net.const_compute(&mut io, &mut scratch).unwrap();

        assert_eq!(io[0], via_compute[0]);
    }

    #[test]
    fn init_is_deterministic_given_same_seed() {
        let mut a = identity_net(vec![4, 4]);
        let mut b = identity_net(vec![4, 4]);
        a.init_all_weights(-ONE, ONE, 42).unwrap();
        b.init_all_weights(-ONE, ONE, 42).unwrap();
        assert_eq!(a.weights(), b.weights());
    }

    #[test]
    fn save_load_round_trip_preserves_weights_and_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("net.bin");

        let mut net = Network::create(
            vec![4, 8, 2],
            vec![ActivationId::RELU, ActivationId::IDENTITY],
        )
        .unwrap();
        net.init_all_weights(-ONE, ONE, 7).unwrap();
        net.save(&path).unwrap();

        let loaded = Network::load(&path).unwrap();
        assert_eq!(loaded.sizes(), net.sizes());
        assert_eq!(loaded.weights(), net.weights());
    }

    #[test]
    fn save_reload_save_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path_a = dir.path().join("a.bin");
        let path_b = dir.path().join("b.bin");

        let mut net = Network::create(
            vec![4, 8, 2],
            vec![ActivationId::RELU, ActivationId::IDENTITY],
        )
        .unwrap();
        net.init_all_weights(-ONE, ONE, 7).unwrap();
        net.save(&path_a).unwrap();

        let loaded = Network::load(&path_a).unwrap();
        loaded.save(&path_b).unwrap();

        let bytes_a = std::fs::read(&path_a).unwrap();
        let bytes_b = std::fs::read(&path_b).unwrap();
        assert_eq!(bytes_a, bytes_b);
    }

    #[test]
    fn load_rejects_reserved_activation_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.bin");
        {
            use std::io::Write;
            let mut f = File::create(&path).unwrap();
            f.write_all(&1u32.to_le_bytes()).unwrap(); // layers
            f.write_all(&2u32.to_le_bytes()).unwrap(); // size[0]
            f.write_all(&1u32.to_le_bytes()).unwrap(); // size[1]
            f.write_all(&2u32.to_le_bytes()).unwrap(); // activation id = Tanh (reserved)
        }
        assert!(Network::load(&path).is_err());
    }

    #[test]
    fn load_reports_truncation_as_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.bin");
        {
            use std::io::Write;
            let mut f = File::create(&path).unwrap();
            f.write_all(&1u32.to_le_bytes()).unwrap();
        }
        match Network::load(&path) {
            Err(NnError::FormatError(_)) => {}
            other => panic!("expected FormatError, got {other:?}"),
        }
    }
}
