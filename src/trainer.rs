//! Orchestrates the epoch/batch loop: pulls samples from a [`Dataset`] (and
//! optional spill file), dispatches contiguous sample ranges to worker
//! threads, reduces per-worker gradients, and applies an Adam-like
//! optimizer step without bias correction.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::ops::{BitOr, BitOrAssign};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::dataset::{read_spill_record, Dataset};
use crate::errors::{NnError, NnResult};
use crate::network::Network;
use crate::weight::{normalize, Weight, ONE};

/// Free-form-text progress bitset, mirroring the original debug flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DebugFlags(pub u32);

impl DebugFlags {
    pub const NONE: DebugFlags = DebugFlags(0);
    pub const SHOW_CONF: DebugFlags = DebugFlags(1 << 0);
    pub const SHOW_EPOCH: DebugFlags = DebugFlags(1 << 1);
    pub const SHOW_BATCH: DebugFlags = DebugFlags(1 << 2);
    pub const SHOW_LOSS: DebugFlags = DebugFlags(1 << 3);
    pub const SHOW_TIME: DebugFlags = DebugFlags(1 << 4);
    pub const SHOW_SAVES: DebugFlags = DebugFlags(1 << 5);
    pub const SHOW_ALL: DebugFlags = DebugFlags((1 << 6) - 1);

    pub fn contains(self, other: DebugFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for DebugFlags {
    type Output = DebugFlags;
    fn bitor(self, rhs: DebugFlags) -> DebugFlags {
        DebugFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for DebugFlags {
    fn bitor_assign(&mut self, rhs: DebugFlags) {
        self.0 |= rhs.0;
    }
}

/// Training hyperparameters and orchestration knobs.
#[derive(Clone, Debug)]
pub struct TrainParams {
    pub epochs: u32,
    pub learning_rate: f64,
    pub batch_size: usize,
    pub momentum: f64,
    pub velocity: f64,
    pub threads: usize,
    pub save_every: u32,
    /// Printf-style format with one `%d`-like integer argument receiving
    /// the epoch number. Only `%d`/`%03d`-style width specifiers are
    /// supported by [`format_checkpoint_name`].
    pub name_format: Option<String>,
    /// Invoked once after every batch's optimizer step, mirroring the
    /// original's `callbackAfterBatch` function pointer (the original also
    /// threads a `void *callbackUserData` through; Rust closures capture
    /// their own state instead, so no separate user-data parameter exists).
    pub callback_after_batch: Option<fn(&Network, &Dataset)>,
    /// Invoked once after every epoch's batches complete, before the loss
    /// probe and checkpoint save.
    pub callback_after_epoch: Option<fn(&Network, &Dataset)>,
}

impl Default for TrainParams {
    fn default() -> Self {
        TrainParams {
            epochs: 100,
            learning_rate: 0.001,
            batch_size: 1,
            momentum: 0.9,
            velocity: 0.999,
            threads: 1,
            save_every: 1,
            name_format: Some("network_%03d.nn".to_string()),
            callback_after_batch: None,
            callback_after_epoch: None,
        }
    }
}

/// Substitutes the first `%d` (optionally zero-padded, e.g. `%03d`) in
/// `format` with `value`. Grounded in the original's printf-style
/// checkpoint naming; only this one conversion is supported because it is
/// the only one the format ever carries.
pub fn format_checkpoint_name(format: &str, value: u32) -> String {
    if let Some(pos) = format.find('%') {
        let rest = &format[pos + 1..];
        let digits_end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let width_str = &rest[..digits_end];
        if let Some(rest2) = rest[digits_end..].strip_prefix('d') {
            let width: usize = width_str.parse().unwrap_or(0);
            let zero_padded = width_str.starts_with('0');
            let formatted = if zero_padded {
                format!("{:0>width$}", value, width = width)
            } else if width > 0 {
                format!("{:>width$}", value, width = width)
            } else {
                format!("{value}")
            };
            return format!("{}{}{}", &format[..pos], formatted, rest2);
        }
    }
    format.to_string()
}

fn zero_or_finite_nonneg(name: &str, value: f64) -> NnResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(NnError::InvalidArgument(format!(
            "{name} must be finite and non-negative, got {value}"
        )));
    }
    if value > 1.0 {
        eprintln!("warning: {name}={value} is above 1.0");
    }
    Ok(())
}

struct Sample {
    input: Vec<Weight>,
    output: Vec<Weight>,
}

fn decode_raw_weights(bytes: &[u8]) -> Vec<Weight> {
    bytes
        .chunks_exact(std::mem::size_of::<Weight>())
        .map(|c| Weight::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Per-worker scratch reused across every sample in its slice, per the
/// crate's scratch-buffer layout (`n_values` and `error` cover every
/// neuron of every layer, including the input layer, for backprop).
struct WorkerScratch {
    entry_input: Vec<Weight>,
    n_values: Vec<Weight>,
    error: Vec<Weight>,
    cpu_buffer: Vec<Weight>,
    gradient: Vec<Weight>,
}

impl WorkerScratch {
    fn new(net: &Network, total_weights: usize) -> WorkerScratch {
        let max_size = *net.sizes().iter().max().unwrap();
        let total_neurons: usize = net.sizes().iter().sum();
        WorkerScratch {
            entry_input: vec![0; max_size],
            n_values: vec![0; total_neurons],
            error: vec![0; total_neurons],
            cpu_buffer: vec![0; max_size + 1],
            gradient: vec![0; total_weights],
        }
    }
}

fn worker_layer_offsets(net: &Network) -> Vec<usize> {
    let mut offsets = vec![0usize; net.layers() + 1];
    for l in 1..=net.layers() {
        offsets[l] = offsets[l - 1] + net.sizes()[l - 1];
    }
    offsets
}

/// Runs the forward + backward pass for one worker's contiguous sample
/// slice, accumulating into `scratch.gradient` (already zeroed once per
/// slice by the caller).
fn run_worker_slice(net: &Network, samples: &[Sample], scratch: &mut WorkerScratch) {
    let layer_n_offsets = worker_layer_offsets(net);

    for sample in samples {
        scratch.entry_input[..sample.input.len()].copy_from_slice(&sample.input);
        scratch.n_values[..sample.input.len()].copy_from_slice(&sample.input);

        for l in 0..net.layers() {
            let in_n = net.sizes()[l];
            let out_n = net.sizes()[l + 1];
            let weights = net.layer_weights(l);

            crate::matrix::forwardprop(
                &mut scratch.cpu_buffer[..out_n],
                &scratch.entry_input[..in_n],
                weights,
                out_n,
                in_n,
            );
            scratch.n_values[layer_n_offsets[l + 1]..layer_n_offsets[l + 1] + out_n]
                .copy_from_slice(&scratch.cpu_buffer[..out_n]);

            let pre: Vec<Weight> = scratch.cpu_buffer[..out_n].to_vec();
            net.activation_id(l).forward(&pre, &mut scratch.entry_input[..out_n]);
        }

        let out_n = net.sizes()[net.layers()];
        for k in 0..out_n {
            scratch.cpu_buffer[k] = scratch.entry_input[k].wrapping_sub(sample.output[k]);
        }

        let mut n_offset = layer_n_offsets[net.layers()];
        {
            let pre = &scratch.n_values[n_offset..n_offset + out_n];
            let pre_copy = pre.to_vec();
            net.activation_id(net.layers() - 1)
                .derivative(&pre_copy, &mut scratch.error[n_offset..n_offset + out_n]);
        }
        crate::matrix::hadamard(&mut scratch.error[n_offset..n_offset + out_n], &scratch.cpu_buffer[..out_n]);

        for l in (1..net.layers()).rev() {
            let in_n = net.sizes()[l];
            let out_n = net.sizes()[l + 1];
            let weights = net.layer_weights(l);

            crate::matrix::backprop(
                &mut scratch.cpu_buffer[..in_n],
                &scratch.error[n_offset..n_offset + out_n],
                weights,
                out_n,
                in_n,
            );
            n_offset -= in_n;
            {
                let pre = scratch.n_values[n_offset..n_offset + in_n].to_vec();
                net.activation_id(l - 1).derivative(&pre, &mut scratch.error[n_offset..n_offset + in_n]);
            }
            crate::matrix::hadamard(&mut scratch.error[n_offset..n_offset + in_n], &scratch.cpu_buffer[..in_n]);
        }

        for l in (0..net.layers()).rev() {
            let in_n = net.sizes()[l];
            let out_n = net.sizes()[l + 1];
            let err_offset = layer_n_offsets[l + 1];

            // The layer-input activations: for l=0 this is the raw network
            // input (no activation precedes layer 0, so "applying the
            // activation" is the identity), for l>0 it is the activation
            // output of layer l-1 which must be recomputed from its
            // pre-activation block.
            let layer_input: Vec<Weight> = if l == 0 {
                scratch.n_values[0..in_n].to_vec()
            } else {
                let prev_offset = layer_n_offsets[l];
                let pre = scratch.n_values[prev_offset..prev_offset + in_n].to_vec();
                let mut activated = vec![0; in_n];
                net.activation_id(l - 1).forward(&pre, &mut activated);
                activated
            };

            let grad_block = &mut scratch.gradient[net.offset(l)..net.offset(l) + (in_n + 1) * out_n];
            crate::matrix::gradupdate(
                grad_block,
                &scratch.error[err_offset..err_offset + out_n],
                &layer_input,
                in_n,
                out_n,
            );
        }
    }
}

/// Trains `net` in place over `dataset` (followed by `spill_path`'s records
/// if given) for `params.epochs` passes, per the crate's orchestration
/// contract.
pub fn train(
    net: &mut Network,
    dataset: &Dataset,
    spill_path: Option<&PathBuf>,
    params: &TrainParams,
    debug: DebugFlags,
) -> NnResult<()> {
    zero_or_finite_nonneg("learning_rate", params.learning_rate)?;
    zero_or_finite_nonneg("momentum", params.momentum)?;
    zero_or_finite_nonneg("velocity", params.velocity)?;

    let batch_size = params.batch_size.max(1);
    let threads = params.threads.max(1);

    if params.save_every != 0 && params.name_format.is_none() {
        return Err(NnError::InvalidArgument(
            "save_every is nonzero but no name_format was given".into(),
        ));
    }

    if debug.contains(DebugFlags::SHOW_CONF) {
        println!(
            "epochs={} lr={} batch_size={batch_size} momentum={} velocity={} threads={threads} save_every={}",
            params.epochs, params.learning_rate, params.momentum, params.velocity, params.save_every,
        );
    }

    let total_weights = net.weights().len();
    let mut m_grad = vec![0.0f64; total_weights];
    let mut v_grad = vec![0.0f64; total_weights];

    let spill_record_count = match spill_path {
        Some(path) if path.exists() => count_spill_records(path)?,
        _ => 0,
    };
    let dataset_size = dataset.len() + spill_record_count;
    if dataset_size == 0 {
        return Err(NnError::InvalidArgument("dataset has no entries to train on".into()));
    }
    let batch_count = dataset_size.div_ceil(batch_size);

    let net_arc_sizes = net.sizes().to_vec();
    let input_size = net_arc_sizes[0];
    let output_size = *net_arc_sizes.last().unwrap();

    for epoch in 0..params.epochs {
        let epoch_start = Instant::now();
        let mut spill_reader = match spill_path {
            Some(path) if path.exists() => Some(std::io::BufReader::new(File::open(path)?)),
            _ => None,
        };

        let mut memory_cursor = 0usize;

        for batch_idx in 0..batch_count {
            let mut batch = Vec::with_capacity(batch_size);

            while batch.len() < batch_size && memory_cursor < dataset.len() {
                let entry = &dataset.entries()[memory_cursor];
                memory_cursor += 1;
                batch.push(decode_entry(dataset, entry, input_size, output_size));
            }
            while batch.len() < batch_size {
                let Some(reader) = spill_reader.as_mut() else { break };
                match read_spill_record(reader)? {
                    Some(entry) => batch.push(decode_entry(dataset, &entry, input_size, output_size)),
                    None => break,
                }
            }

            let batch_fill = batch.len();
            if batch_fill == 0 {
                continue;
            }

            let net_shared: &Network = net;
            let gradients = std::thread::scope(|scope| -> Vec<Vec<Weight>> {
                let mut bounds = Vec::with_capacity(threads);
                for k in 0..threads {
                    let lo = batch_fill * k / threads;
                    let hi = batch_fill * (k + 1) / threads;
                    bounds.push((lo, hi));
                }

                let mut handles = Vec::with_capacity(threads.saturating_sub(1));
                let mut results: Vec<Option<Vec<Weight>>> = (0..threads).map(|_| None).collect();

                let (_, tail) = bounds.split_at(1);
                for (k, &(lo, hi)) in tail.iter().enumerate() {
                    let slice = &batch[lo..hi];
                    let net_ref = net_shared;
                    handles.push((k + 1, scope.spawn(move || {
                        let mut scratch = WorkerScratch::new(net_ref, total_weights);
                        run_worker_slice(net_ref, slice, &mut scratch);
                        scratch.gradient
                    })));
                }

                let (lo0, hi0) = bounds[0];
                let mut scratch0 = WorkerScratch::new(net_shared, total_weights);
                run_worker_slice(net_shared, &batch[lo0..hi0], &mut scratch0);
                results[0] = Some(scratch0.gradient);

                for (idx, handle) in handles {
                    results[idx] = Some(handle.join().expect("training worker thread panicked"));
                }

                results.into_iter().map(|r| r.unwrap()).collect()
            });

            let mut summed = vec![0 as Weight; total_weights];
            for g in &gradients {
                for (s, v) in summed.iter_mut().zip(g) {
                    *s = s.wrapping_add(*v);
                }
            }

            let eps = 1e-8;
            for i in 0..total_weights {
                let g = summed[i] / (batch_fill as Weight);
                m_grad[i] = params.momentum * m_grad[i] + (1.0 - params.momentum) * normalize(g);
                let g_real = normalize(g);
                v_grad[i] = params.velocity * v_grad[i] + (1.0 - params.velocity) * g_real * g_real;
                let step = m_grad[i] * params.learning_rate / (v_grad[i] + eps).sqrt();
                let step_fixed = (step * (ONE as f64)) as Weight;
                net.weights_mut()[i] = net.weights()[i].wrapping_sub(step_fixed);
            }

            if debug.contains(DebugFlags::SHOW_BATCH) {
                println!("epoch {epoch} batch {batch_idx}/{batch_count} fill={batch_fill}");
            }

            if let Some(cb) = params.callback_after_batch {
                cb(net, dataset);
            }
        }

        if let Some(cb) = params.callback_after_epoch {
            cb(net, dataset);
        }

        if debug.contains(DebugFlags::SHOW_EPOCH) {
            println!("epoch {epoch} complete");
        }

        if debug.contains(DebugFlags::SHOW_LOSS) {
            let loss = compute_dataset_loss(net, dataset, input_size, output_size)?;
            println!("epoch {epoch} loss {loss}");
        }

        if debug.contains(DebugFlags::SHOW_TIME) {
            println!("epoch {epoch} took {:.3}s", epoch_start.elapsed().as_secs_f64());
        }

        if params.save_every != 0 && (epoch + 1) % params.save_every == 0 {
            let name = format_checkpoint_name(params.name_format.as_deref().unwrap(), epoch + 1);
            net.save(&name)?;
            if debug.contains(DebugFlags::SHOW_SAVES) {
                println!("saved checkpoint {name}");
            }
        }
    }

    Ok(())
}

fn decode_entry(dataset: &Dataset, entry: &crate::dataset::DatasetEntry, input_size: usize, output_size: usize) -> Sample {
    if let Some(decode) = dataset.decoder() {
        let (input, output) = decode(entry, input_size, output_size);
        Sample { input, output }
    } else {
        Sample {
            input: decode_raw_weights(&entry.in_data),
            output: decode_raw_weights(&entry.out_data),
        }
    }
}

fn count_spill_records(path: &PathBuf) -> NnResult<usize> {
    let mut file = File::open(path)?;
    let mut count = 0;
    let mut len_buf = [0u8; 8];
    loop {
        let n = file.read(&mut len_buf)?;
        if n == 0 {
            break;
        }
        if n != 8 {
            return Err(NnError::CorruptSpill("spill file truncated while pre-scanning".into()));
        }
        let in_bytes = u64::from_le_bytes(len_buf);
        file.read_exact(&mut len_buf)?;
        let out_bytes = u64::from_le_bytes(len_buf);
        file.seek(SeekFrom::Current((in_bytes + out_bytes) as i64))?;
        count += 1;
    }
    Ok(count)
}

/// Mean squared error over the in-memory dataset entries only, matching the
/// original's `TRAIN_SHOW_LOSS` block, which loops `d->entryCount` and never
/// reopens the spill file for this probe.
fn compute_dataset_loss(net: &Network, dataset: &Dataset, input_size: usize, output_size: usize) -> NnResult<f64> {
    let mut total = 0.0;
    let mut count = 0usize;
    let max_size = *net.sizes().iter().max().unwrap();
    let mut io = vec![0; max_size];
    let mut scratch = vec![0; max_size];

    for entry in dataset.entries() {
        let sample = decode_entry(dataset, entry, input_size, output_size);
        io[..input_size].copy_from_slice(&sample.input);
        net.const_compute(&mut io, &mut scratch)?;
        for (o, t) in io[..output_size].iter().zip(&sample.output) {
            let d = normalize(*o) - normalize(*t);
            total += d * d;
        }
        count += 1;
    }

    if count == 0 {
        Ok(0.0)
    } else {
        Ok(total / count as f64)
    }
}
