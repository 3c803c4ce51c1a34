//! Activation registry: a dense table of `(forward, derivative)` pairs
//! indexed by a small integer id, dispatched at layer granularity rather
//! than per element (see the crate's design notes on avoiding virtual
//! dispatch inside the hot inner loops).

use crate::errors::{NnError, NnResult};
use crate::weight::{mul, Weight, ONE};

/// Total number of reserved activation ids, including unimplemented ones.
pub const ACTIVATION_COUNT: u32 = 12;

/// A validated activation id. Constructed only through [`ActivationId::from_raw`],
/// which rejects ids outside `[0, ACTIVATION_COUNT)` and ids that are reserved
/// but not (yet) implemented.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ActivationId(u32);

impl ActivationId {
    pub const IDENTITY: ActivationId = ActivationId(0);
    pub const SIGMOID: ActivationId = ActivationId(1);
    pub const TANH: ActivationId = ActivationId(2);
    pub const RELU: ActivationId = ActivationId(3);
    pub const CLIPPED_RELU: ActivationId = ActivationId(4);
    pub const GELU: ActivationId = ActivationId(5);
    pub const SOFTPLUS: ActivationId = ActivationId(6);
    pub const ELU: ActivationId = ActivationId(7);
    pub const LEAKY_RELU: ActivationId = ActivationId(8);
    pub const SILU: ActivationId = ActivationId(9);
    pub const MISH: ActivationId = ActivationId(10);
    pub const GAUSSIAN: ActivationId = ActivationId(11);

    /// Validates a raw activation id read from a file or passed by a caller.
    ///
    /// Ids `>= ACTIVATION_COUNT` are unknown. Ids in range but outside the
    /// implemented subset (`Tanh`, `Gelu`, `Softplus`, `Elu`, `LeakyRelu`,
    /// `Silu`, `Mish`, `Gaussian`) are reserved for a future extension and
    /// are rejected here rather than dispatching to a missing implementation
    /// — the original C registry left those slots as null function pointers
    /// and crashed on first use; this crate refuses at construction time
    /// instead.
    pub fn from_raw(id: u32) -> NnResult<Self> {
        if id >= ACTIVATION_COUNT {
            return Err(NnError::InvalidArgument(format!(
                "activation id {id} does not exist (max {ACTIVATION_COUNT})"
            )));
        }
        if !matches!(id, 0 | 1 | 3 | 4) {
            return Err(NnError::InvalidArgument(format!(
                "activation id {id} is reserved but not implemented"
            )));
        }
        Ok(ActivationId(id))
    }

    /// The raw id, as stored in the network file format.
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Applies the forward activation elementwise: `inputs` and `outputs`
    /// must have equal length.
    pub fn forward(self, inputs: &[Weight], outputs: &mut [Weight]) {
        debug_assert_eq!(inputs.len(), outputs.len());
        match self.0 {
            0 => identity_forward(inputs, outputs),
            1 => sigmoid_forward(inputs, outputs),
            3 => relu_forward(inputs, outputs),
            4 => clipped_relu_forward(inputs, outputs),
            other => unreachable!("activation id {other} passed validation but is unimplemented"),
        }
    }

    /// Applies the activation's derivative, evaluated at the same
    /// pre-activation `inputs`.
    pub fn derivative(self, inputs: &[Weight], outputs: &mut [Weight]) {
        debug_assert_eq!(inputs.len(), outputs.len());
        match self.0 {
            0 => identity_derivative(inputs, outputs),
            1 => sigmoid_derivative(inputs, outputs),
            3 => relu_derivative(inputs, outputs),
            4 => clipped_relu_derivative(inputs, outputs),
            other => unreachable!("activation id {other} passed validation but is unimplemented"),
        }
    }
}

fn identity_forward(inputs: &[Weight], outputs: &mut [Weight]) {
    outputs.copy_from_slice(inputs);
}

fn identity_derivative(_inputs: &[Weight], outputs: &mut [Weight]) {
    outputs.fill(ONE);
}

fn sigmoid_forward(inputs: &[Weight], outputs: &mut [Weight]) {
    for (i, o) in inputs.iter().zip(outputs.iter_mut()) {
        let v = (*i as f64) / (ONE as f64);
        let s = 1.0 / (1.0 + (-v).exp());
        // Rounds to nearest: sigmoid's output is always non-negative, so
        // truncating after adding one half-ULP is a valid round-half-up.
        *o = (s * (ONE as f64) + 0.5) as Weight;
    }
}

fn sigmoid_derivative(inputs: &[Weight], outputs: &mut [Weight]) {
    sigmoid_forward(inputs, outputs);
    for o in outputs.iter_mut() {
        *o = mul(*o, ONE - *o);
    }
}

fn relu_forward(inputs: &[Weight], outputs: &mut [Weight]) {
    for (i, o) in inputs.iter().zip(outputs.iter_mut()) {
        *o = if *i < 0 { 0 } else { *i };
    }
}

fn relu_derivative(inputs: &[Weight], outputs: &mut [Weight]) {
    for (i, o) in inputs.iter().zip(outputs.iter_mut()) {
        *o = if *i > 0 { ONE } else { 0 };
    }
}

fn clipped_relu_forward(inputs: &[Weight], outputs: &mut [Weight]) {
    for (i, o) in inputs.iter().zip(outputs.iter_mut()) {
        *o = (*i).clamp(0, ONE);
    }
}

fn clipped_relu_derivative(inputs: &[Weight], outputs: &mut [Weight]) {
    for (i, o) in inputs.iter().zip(outputs.iter_mut()) {
        *o = if *i > 0 && *i < ONE { ONE } else { 0 };
    }
}
