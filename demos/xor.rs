//! Trains a 2-2-1 sigmoid network on XOR and prints the learned response
//! for each of the four inputs.

use nnue_core::trainer::DebugFlags;
use nnue_core::{ActivationId, Dataset, Network, TrainParams, Weight, ONE};

fn main() {
    let mut net = Network::create(
        vec![2, 2, 1],
        vec![ActivationId::SIGMOID, ActivationId::SIGMOID],
    )
    .expect("network shape is valid");
    net.init_all_weights(-ONE / 4, ONE / 4, 42).expect("layer indices in range");

    let mut dataset = Dataset::new(2, 1);
    let samples: [([Weight; 2], Weight); 4] = [
        ([0, 0], 0),
        ([0, ONE], ONE),
        ([ONE, 0], ONE),
        ([ONE, ONE], 0),
    ];
    for (input, output) in samples {
        let mut in_bytes = Vec::new();
        for v in input {
            in_bytes.extend_from_slice(&v.to_le_bytes());
        }
        dataset.add_entry(&in_bytes, &output.to_le_bytes()).unwrap();
    }

    let params = TrainParams {
        epochs: 5000,
        learning_rate: 0.1,
        batch_size: 4,
        momentum: 0.9,
        velocity: 0.999,
        threads: 1,
        save_every: 0,
        name_format: None,
        callback_after_batch: None,
        callback_after_epoch: None,
    };

    nnue_core::train(&mut net, &dataset, None, &params, DebugFlags::SHOW_EPOCH)
        .expect("training should converge on XOR");

    for (input, expected) in samples {
        let mut outputs = vec![0];
        net.compute(&input, &mut outputs).unwrap();
        println!(
            "input={:?} output={:.4} expected={:.4}",
            input,
            nnue_core::weight::normalize(outputs[0]),
            nnue_core::weight::normalize(expected)
        );
    }
}
