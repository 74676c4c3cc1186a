// Integration tests for ml-feed-core: injection, windowing, batch-size changes

use std::sync::Arc;

use ml_feed_core::budget::MemoryBudget;
use ml_feed_core::{
    BatchDescriptor, BatchSource, Datum, DefaultTransform, Error, ErrorKind, FeederState,
    ImageBuffer, MemoryFeeder, SampleTransform, TensorElement,
};
use proptest::prelude::*;
use test_case::test_case;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("ml_feed_core=trace")
        .with_test_writer()
        .try_init();
}

fn scalar_images(values: &[u8]) -> Vec<ImageBuffer> {
    values
        .iter()
        .map(|&v| ImageBuffer::new(1, 1, 1, vec![v]))
        .collect()
}

fn datums(count: usize, size: usize) -> Vec<Datum> {
    (0..count)
        .map(|i| {
            let bytes = (0..size).map(|j| ((i * size + j) % 251) as u8).collect();
            Datum::from_bytes(size, 1, 1, bytes, i as i32)
        })
        .collect()
}

#[test]
fn test_two_step_scenario() {
    init_tracing();
    let mut feeder = MemoryFeeder::<f32>::new(BatchDescriptor::new(2, 1, 1, 1)).unwrap();
    feeder
        .add_images(&scalar_images(&[10, 20, 30, 40]), &[0, 1, 0, 1])
        .unwrap();
    assert!(feeder.has_pending_data());

    {
        let view = feeder.next_batch().unwrap();
        assert_eq!(view.data.as_slice(), &[10.0, 20.0]);
        assert_eq!(view.labels.as_slice(), &[0.0, 1.0]);
        assert_eq!(view.data.shape().dims(), [2, 1, 1, 1]);
    }
    assert!(feeder.has_pending_data());

    {
        let view = feeder.next_batch().unwrap();
        assert_eq!(view.data.as_slice(), &[30.0, 40.0]);
        assert_eq!(view.labels.as_slice(), &[0.0, 1.0]);
    }
    assert!(!feeder.has_pending_data());
    assert_eq!(feeder.position().unwrap(), 0);
}

#[test]
fn test_second_injection_without_consumption_is_protocol_error() {
    let mut feeder = MemoryFeeder::<f32>::new(BatchDescriptor::new(2, 1, 1, 1)).unwrap();
    feeder.add_images(&scalar_images(&[1, 2]), &[0, 1]).unwrap();

    let err = feeder
        .add_images(&scalar_images(&[3, 4]), &[1, 0])
        .unwrap_err();
    assert!(matches!(err, Error::PendingData { operation: "add_images" }));
    assert_eq!(err.kind(), ErrorKind::Protocol);
}

#[test]
fn test_single_sample_with_batch_three_is_input_shape_error() {
    let mut feeder = MemoryFeeder::<f32>::new(BatchDescriptor::new(3, 1, 1, 1)).unwrap();
    let err = feeder.add_images(&scalar_images(&[7]), &[0]).unwrap_err();
    assert!(matches!(err, Error::NotBatchMultiple { count: 1, batch_size: 3 }));
    assert_eq!(err.kind(), ErrorKind::InputShape);
}

#[test_case(0, 0 ; "empty input")]
#[test_case(3, 3 ; "not a multiple")]
#[test_case(4, 3 ; "label count mismatch")]
fn test_injection_preconditions(samples: usize, labels: usize) {
    let mut feeder = MemoryFeeder::<f32>::new(BatchDescriptor::new(2, 1, 1, 1)).unwrap();
    let images = scalar_images(&vec![1; samples]);
    let labels = vec![0; labels];

    let err = feeder.add_images(&images, &labels).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InputShape);
    assert!(!feeder.has_pending_data());
    assert_eq!(feeder.version(), 0);
}

#[test]
fn test_empty_datum_injection() {
    let mut feeder = MemoryFeeder::<f32>::new(BatchDescriptor::new(2, 1, 1, 1)).unwrap();
    assert!(matches!(feeder.add_datums(&[]), Err(Error::NoSamples)));
}

#[test]
fn test_rejected_injection_leaves_store_untouched() {
    let mut feeder = MemoryFeeder::<f32>::new(BatchDescriptor::new(1, 2, 1, 1)).unwrap();
    feeder.add_datums(&datums(2, 2)).unwrap();
    feeder.forward().unwrap();

    let version = feeder.version();
    let capacity = feeder.capacity();
    let position = feeder.position().unwrap();

    let err = feeder.add_datums(&datums(6, 2)).unwrap_err();
    assert!(matches!(err, Error::PendingData { .. }));
    assert_eq!(feeder.version(), version);
    assert_eq!(feeder.capacity(), capacity);
    assert_eq!(feeder.position().unwrap(), position);

    let view = feeder.next_batch().unwrap();
    assert_eq!(view.data.as_slice(), &[2.0, 3.0]);
    assert_eq!(view.labels.as_slice(), &[1.0]);
}

#[test]
fn test_capacity_grows_and_never_shrinks() {
    let mut feeder = MemoryFeeder::<f32>::new(BatchDescriptor::new(2, 1, 1, 1)).unwrap();
    assert_eq!(feeder.capacity(), 2);

    feeder.add_datums(&datums(6, 1)).unwrap();
    assert_eq!(feeder.capacity(), 6);
    for _ in 0..3 {
        feeder.forward().unwrap();
    }

    feeder.add_datums(&datums(2, 1)).unwrap();
    assert_eq!(feeder.capacity(), 6);
    assert_eq!(feeder.total_count().unwrap(), 2);
}

#[test]
fn test_change_batch_size_redeclares_shapes() {
    init_tracing();
    let mut feeder = MemoryFeeder::<f32>::new(BatchDescriptor::new(2, 1, 1, 1)).unwrap();
    feeder
        .add_images(&scalar_images(&[1, 2, 3, 4]), &[0, 1, 2, 3])
        .unwrap();

    assert!(matches!(
        feeder.change_batch_size(4),
        Err(Error::PendingData { operation: "change_batch_size" })
    ));

    feeder.forward().unwrap();
    feeder.forward().unwrap();

    feeder.change_batch_size(4).unwrap();
    assert!(feeder.needs_reshape());
    assert_eq!(feeder.output_shapes().data.num(), 2);

    let view = feeder.next_batch().unwrap();
    assert_eq!(view.data.shape().dims(), [4, 1, 1, 1]);
    assert_eq!(view.data.as_slice(), &[1.0, 2.0, 3.0, 4.0]);
    assert_eq!(view.labels.as_slice(), &[0.0, 1.0, 2.0, 3.0]);
    assert!(!feeder.needs_reshape());
    assert_eq!(feeder.output_shapes().data.dims(), [4, 1, 1, 1]);
    assert_eq!(feeder.output_shapes().labels.dims(), [4, 1, 1, 1]);
}

#[test]
fn test_change_batch_size_then_inject() {
    let mut feeder = MemoryFeeder::<f32>::new(BatchDescriptor::new(2, 1, 1, 1)).unwrap();
    feeder.change_batch_size(3).unwrap();
    feeder.add_datums(&datums(6, 1)).unwrap();

    let view = feeder.next_batch().unwrap();
    assert_eq!(view.data.shape().dims(), [3, 1, 1, 1]);
    assert_eq!(view.labels.as_slice(), &[0.0, 1.0, 2.0]);
    assert_eq!(feeder.state(), FeederState::Draining);
}

struct FailingTransform;

impl SampleTransform<Datum> for FailingTransform {
    fn transform<T: TensorElement>(
        &mut self,
        _samples: &[Datum],
        _descriptor: &BatchDescriptor,
        dst: &mut [T],
    ) -> ml_feed_core::Result<()> {
        // Half-write before failing
        if let Some(first) = dst.first_mut() {
            *first = T::from_u8(99);
        }
        Err(Error::TransformationError("decoder unavailable".into()))
    }
}

#[test]
fn test_transform_failure_does_not_mark_ready() {
    let mut feeder =
        MemoryFeeder::<f32, _>::with_transform(BatchDescriptor::new(1, 1, 1, 1), FailingTransform)
            .unwrap();

    let err = feeder.add_datums(&datums(1, 1)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transformation);
    assert!(!feeder.has_pending_data());
    assert_eq!(feeder.state(), FeederState::Empty);
    assert!(matches!(feeder.forward(), Err(Error::NotInitialized)));
}

#[test]
fn test_transform_failure_keeps_previous_window() {
    init_tracing();
    let mut feeder = MemoryFeeder::<f32>::new(BatchDescriptor::new(2, 1, 1, 1)).unwrap();
    feeder.add_datums(&datums(4, 1)).unwrap();
    feeder.forward().unwrap();
    let issued = feeder.forward().unwrap();
    assert!(!feeder.has_pending_data());
    let version = feeder.version();

    // The second record has the wrong geometry, so conversion fails mid-batch
    let bad = vec![
        Datum::from_bytes(1, 1, 1, vec![9], 0),
        Datum::from_bytes(2, 1, 1, vec![1, 2], 1),
    ];
    let err = feeder.add_datums(&bad).unwrap_err();
    assert!(matches!(err, Error::TransformationError(_)));
    assert!(!feeder.has_pending_data());
    assert_eq!(feeder.version(), version);
    assert_eq!(feeder.total_count().unwrap(), 4);

    assert_eq!(feeder.view(&issued).unwrap().data.as_slice(), &[2.0, 3.0]);
    let view = feeder.next_batch().unwrap();
    assert_eq!(view.data.as_slice(), &[0.0, 1.0]);
    assert_eq!(view.labels.as_slice(), &[0.0, 1.0]);

    feeder.add_datums(&datums(2, 1)).unwrap();
    assert_eq!(feeder.state(), FeederState::Loaded);
}

#[test]
fn test_budget_limits_growth() {
    // One batch of 2 f32 samples plus labels is 16 bytes; staging holds
    // another copy of the sample values
    let budget = Arc::new(MemoryBudget::new(48));
    let mut feeder = MemoryFeeder::<f32, _>::with_budget(
        BatchDescriptor::new(2, 1, 1, 1),
        DefaultTransform,
        budget.clone(),
    )
    .unwrap();
    assert_eq!(budget.usage(), 16);

    feeder.add_datums(&datums(4, 1)).unwrap();
    assert_eq!(budget.usage(), 48);
    feeder.forward().unwrap();
    feeder.forward().unwrap();

    let err = feeder.add_datums(&datums(6, 1)).unwrap_err();
    assert!(matches!(err, Error::MemoryBudgetExceeded { .. }));
    assert!(!feeder.has_pending_data());
    assert_eq!(feeder.capacity(), 4);
    assert_eq!(feeder.next_batch().unwrap().labels.as_slice(), &[0.0, 1.0]);

    drop(feeder);
    assert_eq!(budget.usage(), 0);
}

fn drain<S: BatchSource>(source: &mut S, steps: usize) -> Vec<f64>
where
    S::Elem: Into<f64>,
{
    let mut labels = Vec::new();
    for _ in 0..steps {
        let view = source.next_batch().unwrap();
        labels.extend(view.labels.as_slice().iter().map(|&l| l.into()));
    }
    labels
}

#[test]
fn test_feeder_as_batch_source() {
    let mut feeder = MemoryFeeder::<f32>::new(BatchDescriptor::new(2, 1, 1, 1)).unwrap();
    feeder.add_datums(&datums(4, 1)).unwrap();
    assert_eq!(drain(&mut feeder, 2), vec![0.0, 1.0, 2.0, 3.0]);
    assert_eq!(BatchSource::output_shapes(&feeder).labels.dims(), [2, 1, 1, 1]);
}

proptest! {
    #[test]
    fn prop_k_steps_visit_every_sample_once_in_order(
        batch in 1usize..6,
        k in 1usize..6,
        size in 1usize..5,
    ) {
        let mut feeder = MemoryFeeder::<f32>::new(BatchDescriptor::new(batch, size, 1, 1)).unwrap();
        let samples = datums(batch * k, size);
        feeder.add_datums(&samples).unwrap();

        let mut values = Vec::new();
        let mut labels = Vec::new();
        for step in 0..k {
            prop_assert!(feeder.has_pending_data());
            let view = feeder.next_batch().unwrap();
            prop_assert_eq!(view.batch.offset, step * batch);
            values.extend_from_slice(view.data.as_slice());
            labels.extend_from_slice(view.labels.as_slice());
        }
        prop_assert!(!feeder.has_pending_data());

        let expected_values: Vec<f32> = samples
            .iter()
            .flat_map(|d| d.data.iter().map(|&b| f32::from(b)))
            .collect();
        let expected_labels: Vec<f32> = (0..batch * k).map(|i| i as f32).collect();
        prop_assert_eq!(values, expected_values);
        prop_assert_eq!(labels, expected_labels);
    }

    #[test]
    fn prop_position_tracks_steps(batch in 1usize..6, k in 1usize..6, steps in 0usize..40) {
        let mut feeder = MemoryFeeder::<f32>::new(BatchDescriptor::new(batch, 1, 1, 1)).unwrap();
        feeder.add_datums(&datums(batch * k, 1)).unwrap();
        for _ in 0..steps {
            feeder.forward().unwrap();
        }
        let position = feeder.position().unwrap();
        prop_assert_eq!(position, (steps * batch) % (batch * k));
        prop_assert_eq!(position % batch, 0);
    }

    #[test]
    fn prop_setup_declares_batch_shapes(
        b in 1usize..64,
        c in 1usize..8,
        h in 1usize..8,
        w in 1usize..8,
    ) {
        let feeder = MemoryFeeder::<f64>::new(BatchDescriptor::new(b, c, h, w)).unwrap();
        prop_assert_eq!(feeder.output_shapes().data.dims(), [b, c, h, w]);
        prop_assert_eq!(feeder.output_shapes().labels.dims(), [b, 1, 1, 1]);
    }
}
