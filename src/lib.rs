//! # nnue-core
//!
//! A fixed-point feed-forward neural network engine for efficiently-updatable
//! evaluation: construction, persistence, inference, Adam-style backprop
//! training with multi-threaded gradient computation, and an incremental
//! first-layer accumulator for consumers such as game-tree search.
//!
//! Every weight, bias, and activation lives in `Weight` (Q-format fixed
//! point, see [`weight`]) rather than floating point — there is no
//! floating-point training path anywhere in this crate.

pub mod accumulator;
pub mod activations;
pub mod dataset;
pub mod errors;
pub mod matrix;
pub mod network;
pub mod trainer;
pub mod weight;

pub use accumulator::{acc_compute, acc_decrement, acc_increment, acc_reset};
pub use activations::ActivationId;
pub use dataset::Dataset;
pub use errors::{NnError, NnResult};
pub use network::Network;
pub use trainer::{train, DebugFlags, TrainParams};
pub use weight::{Weight, ONE, PRECISION};
