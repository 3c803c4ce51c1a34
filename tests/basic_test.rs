//! End-to-end scenarios exercising the public API the way an external
//! consumer (the search engine, a training script) would.

use nnue_core::trainer::{DebugFlags, TrainParams};
use nnue_core::{acc_compute, acc_increment, acc_reset, train, ActivationId, Dataset, Network, Weight, ONE};

#[test]
fn scenario_linear_identity_network_save_reload_matches_bias_vector() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("linear.nn");

    let net = Network::create(vec![736, 1], vec![ActivationId::IDENTITY]).unwrap();
    net.save(&path).unwrap();

    let mut reloaded = Network::load(&path).unwrap();
    assert_eq!(reloaded.weights(), net.weights());

    let inputs = vec![0; 736];
    let mut outputs = vec![0];
    reloaded.compute(&inputs, &mut outputs).unwrap();
    assert_eq!(outputs, vec![0]);
}

#[test]
fn scenario_accumulator_matches_full_compute_on_sparse_input() {
    let mut net = Network::create(vec![736, 1], vec![ActivationId::IDENTITY]).unwrap();
    net.init_all_weights(-ONE, ONE, 3).unwrap();

    let mut acc = vec![0; 1];
    acc_reset(&net, &mut acc).unwrap();
    acc_increment(&net, &mut acc, 17).unwrap();
    acc_increment(&net, &mut acc, 250).unwrap();

    let mut out_buf = vec![0; 1];
    let result = acc_compute(&net, &mut acc, &mut out_buf).unwrap();

    let mut sparse_input = vec![0; 736];
    sparse_input[17] = ONE;
    sparse_input[250] = ONE;
    let mut expected = vec![0; 1];
    net.compute(&sparse_input, &mut expected).unwrap();

    assert_eq!(result, expected);
}

#[test]
fn scenario_spill_round_trip_reports_correct_entry_count_and_file_size() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("spill.bin");

    let mut ds = Dataset::new(8, 1);
    for i in 0..1000i32 {
        let input_bytes: Vec<u8> = (0..8).flat_map(|_| i.to_le_bytes()).collect();
        ds.add_entry(&input_bytes, &i.to_le_bytes()).unwrap();
    }
    ds.push_entries(&path).unwrap();
    assert_eq!(ds.len(), 0);

    let expected_size = 1000 * (2 * 8 + 8 * 4 + 1 * 4);
    let metadata = std::fs::metadata(&path).unwrap();
    assert_eq!(metadata.len() as usize, expected_size);
}

#[test]
fn scenario_two_layer_net_save_reload_save_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let path_a = dir.path().join("a.nn");
    let path_b = dir.path().join("b.nn");

    let mut net = Network::create(
        vec![4, 8, 2],
        vec![ActivationId::RELU, ActivationId::IDENTITY],
    )
    .unwrap();
    net.init_all_weights(-ONE, ONE, 7).unwrap();
    net.save(&path_a).unwrap();

    let loaded = Network::load(&path_a).unwrap();
    loaded.save(&path_b).unwrap();

    assert_eq!(std::fs::read(&path_a).unwrap(), std::fs::read(&path_b).unwrap());
}

#[test]
fn scenario_xor_network_classifies_all_four_inputs_correctly_after_training() {
    let mut net = Network::create(
        vec![2, 2, 1],
        vec![ActivationId::SIGMOID, ActivationId::SIGMOID],
    )
    .unwrap();
    net.init_all_weights(-ONE / 4, ONE / 4, 42).unwrap();

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
        ..TrainParams::default()
    };
    train(&mut net, &dataset, None, &params, DebugFlags::NONE).unwrap();

    for (input, expected) in samples {
        let mut outputs = vec![0];
        net.compute(&input, &mut outputs).unwrap();
        let classified_high = outputs[0] > ONE / 2;
        let expected_high = expected > ONE / 2;
        assert_eq!(
            classified_high, expected_high,
            "input={input:?} output={} expected={expected}",
            outputs[0]
        );
    }
}
