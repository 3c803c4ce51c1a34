//! Demonstrates that incrementally updating the first-layer accumulator as
//! input features toggle on/off produces the same result as recomputing
//! the whole network from scratch on the corresponding sparse input.

use nnue_core::{acc_compute, acc_decrement, acc_increment, acc_reset, ActivationId, Network, ONE};

fn main() {
    let mut net = Network::create(
        vec![736, 8, 2],
        vec![ActivationId::RELU, ActivationId::IDENTITY],
    )
    .expect("network shape is valid");
    net.init_all_weights(-ONE, ONE, 1).expect("layer indices in range");

    let mut acc = vec![0; 8];
    acc_reset(&net, &mut acc).unwrap();

    let active_features = [3usize, 17, 250, 400];
    for &f in &active_features {
        acc_increment(&net, &mut acc, f).unwrap();
    }

    let mut out_buf = vec![0; 8];
    let incremental = acc_compute(&net, &mut acc, &mut out_buf).unwrap();

    let mut sparse_input = vec![0; 736];
    for &f in &active_features {
        sparse_input[f] = ONE;
    }
    let mut from_scratch = vec![0; 2];
    net.compute(&sparse_input, &mut from_scratch).unwrap();

    println!("incremental  = {incremental:?}");
    println!("from scratch = {from_scratch:?}");
    assert_eq!(incremental, from_scratch);

    acc_decrement(&net, &mut acc, active_features[0]).unwrap();
    println!("after decrementing feature {}: acc = {:?}", active_features[0], acc);
}
