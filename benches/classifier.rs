use criterion::{black_box, criterion_group, criterion_main, Criterion};

use surname_mlp::{SurnameClassifier, WeightedCrossEntropy};

// Roughly the size of a real surname corpus: ~80 characters, 18 nationalities.
const INPUT_DIM: usize = 80;
const HIDDEN_DIM: usize = 300;
const NUM_CLASSES: usize = 18;

fn multi_hot() -> Vec<f32> {
    (0..INPUT_DIM)
        .map(|i| if i % 9 == 0 { 1.0 } else { 0.0 })
        .collect()
}

fn classifier_forward_bench(c: &mut Criterion) {
    let model = SurnameClassifier::new_with_seed(INPUT_DIM, HIDDEN_DIM, NUM_CLASSES, 0).unwrap();
    let mut scratch = model.scratch();
    let input = multi_hot();

    c.bench_function("classifier_forward_80_300_18", |b| {
        b.iter(|| {
            let out = model.forward(black_box(&input), &mut scratch, true);
            black_box(out);
        })
    });
}

fn classifier_backward_bench(c: &mut Criterion) {
    let model = SurnameClassifier::new_with_seed(INPUT_DIM, HIDDEN_DIM, NUM_CLASSES, 0).unwrap();
    let loss = WeightedCrossEntropy::uniform(NUM_CLASSES).unwrap();
    let mut scratch = model.scratch();
    let mut grads = model.gradients();
    let input = multi_hot();

    let logits = model.forward(&input, &mut scratch, false).to_vec();
    loss.backward(&logits, 3, 1.0, grads.d_logits_mut());

    c.bench_function("classifier_backward_80_300_18", |b| {
        b.iter(|| {
            grads.zero();
            model.backward(black_box(&input), black_box(&scratch), &mut grads);
            black_box(grads.d_biases(0));
        })
    });
}

criterion_group!(benches, classifier_forward_bench, classifier_backward_bench);
criterion_main!(benches);
