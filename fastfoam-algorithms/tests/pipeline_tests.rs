#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::unreadable_literal,
    clippy::uninlined_format_args
)]
use std::sync::Arc;
use std::thread;

use approx::assert_relative_eq;
use ndarray::Array2;

use fastfoam_algorithms::{
    AccumulatorCell, HistogramConfig, ProcessorConfig, PumpProbeAccumulator, RoiDefinition,
    RoiShape, StatisticsConfig, TrainProcessor,
};
use fastfoam_core::{
    AssembledImage, CalibrationSet, CorrectionConstants, GeometryDescriptor, ModulePanel,
    ModulePlacement, Orientation, Pulse, PulseTag, QuadPosition, Train,
};

const MODULE_SHAPE: (usize, usize) = (8, 8);

// Quadrant layout with a 2-pixel cross-shaped gap; the two right-hand
// modules are mounted upside down.
fn quad_geometry() -> Arc<GeometryDescriptor> {
    let (h, w) = MODULE_SHAPE;
    let placements = vec![
        ModulePlacement::new(QuadPosition::new(0.0, 0.0), Orientation::R0),
        ModulePlacement::new(QuadPosition::new(w as f64 + 2.0, 0.0), Orientation::R180),
        ModulePlacement::new(QuadPosition::new(0.0, h as f64 + 2.0), Orientation::R0),
        ModulePlacement::new(
            QuadPosition::new(w as f64 + 2.0, h as f64 + 2.0),
            Orientation::R180,
        ),
    ];
    Arc::new(GeometryDescriptor::new(MODULE_SHAPE, 0.5e-3, placements).unwrap())
}

fn flat_stack(value: f32) -> Vec<ModulePanel> {
    (0..4)
        .map(|module| ModulePanel::new(module, Array2::from_elem(MODULE_SHAPE, value)))
        .collect()
}

fn train_of(train_id: u64, values: &[f32]) -> Train {
    let pulses = values
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            let tag = if i % 2 == 0 { PulseTag::On } else { PulseTag::Off };
            Pulse::new(train_id * 100 + i as u64, tag, flat_stack(value))
        })
        .collect();
    Train::with_pulses(train_id, pulses)
}

fn processor_with(statistics: StatisticsConfig) -> TrainProcessor {
    let geom = quad_geometry();
    let calibration = CalibrationSet::identity(0, &geom);
    TrainProcessor::new(
        geom,
        calibration,
        ProcessorConfig {
            statistics,
            pulse_range: None,
        },
    )
    .unwrap()
}

#[test]
fn test_end_to_end_flat_field() {
    let mut processor = processor_with(StatisticsConfig::default());
    let frames = processor.process_train(train_of(1, &[3.0, 3.0, 3.0, 3.0]));
    assert_eq!(frames.len(), 4);

    let canvas = (MODULE_SHAPE.0 * 2 + 2, MODULE_SHAPE.1 * 2 + 2);
    for frame in &frames {
        assert_eq!(frame.shape(), canvas);
        // 4 modules of 64 pixels each; the cross gap stays invalid
        assert_eq!(frame.valid_count(), 256);
        for value in frame.valid_values() {
            assert_eq!(value, 3.0);
        }
    }

    let snapshot = processor.snapshot();
    assert_eq!(snapshot.on.frames, 2);
    assert_eq!(snapshot.off.frames, 2);
    // gap pixels collect no samples in either stream
    let gap_count = snapshot.on.count[[MODULE_SHAPE.0, 0]];
    assert_eq!(gap_count, 0);
}

#[test]
fn test_dark_gain_mask_full_chain() {
    let geom = quad_geometry();
    let (h, w) = MODULE_SHAPE;
    let modules = (0..4)
        .map(|_| {
            let mut mask = Array2::from_elem((h, w), false);
            mask[[0, 0]] = true;
            CorrectionConstants {
                dark: Array2::from_elem((h, w), 10.0),
                gain: Array2::from_elem((h, w), 2.0),
                mask,
            }
        })
        .collect();
    let calibration = CalibrationSet::new(1, 1000.0, modules, &geom).unwrap();
    let mut processor = TrainProcessor::new(
        geom,
        calibration,
        ProcessorConfig::default(),
    )
    .unwrap();

    let frames = processor.process_train(train_of(1, &[30.0]));
    let frame = &frames[0];
    // (30 - 10) / 2 everywhere except the 4 masked corners
    assert_eq!(frame.valid_count(), 256 - 4);
    for value in frame.valid_values() {
        assert_eq!(value, 10.0);
    }
}

#[test]
fn test_statistics_track_pump_probe_difference() {
    let mut processor = processor_with(StatisticsConfig::default());
    // on-pulses carry signal 8, off-pulses background 2
    for train_id in 0..5 {
        processor.process_train(train_of(train_id, &[8.0, 2.0, 8.0, 2.0]));
    }
    let snapshot = processor.snapshot();
    assert_eq!(snapshot.on.frames, 10);
    assert_eq!(snapshot.off.frames, 10);

    let diff = snapshot.difference();
    assert_relative_eq!(diff[[0, 0]], 6.0, max_relative = 1e-12);
    // gap pixels have no samples on either side
    assert!(diff[[MODULE_SHAPE.0, 0]].is_nan());
}

#[test]
fn test_roi_and_histogram_through_pipeline() {
    let statistics = StatisticsConfig {
        rois: vec![RoiDefinition::new(
            "module0",
            RoiShape::Rectangle {
                x: 0,
                y: 0,
                width: 4,
                height: 4,
            },
        )
        .unwrap()],
        histogram: Some(HistogramConfig {
            edges: vec![0.0, 2.0, 4.0, 6.0],
        }),
    };
    let mut processor = processor_with(statistics);
    processor.process_train(train_of(1, &[1.0, 5.0]));

    let snapshot = processor.snapshot();
    let on_series = &snapshot.on.rois[0].samples;
    assert_eq!(on_series.len(), 1);
    let reduction = on_series[0].value.unwrap();
    assert_eq!(reduction.count, 16);
    assert_relative_eq!(reduction.mean, 1.0, max_relative = 1e-12);

    // each frame contributes its 256 valid pixels to its own stream
    let on_hist = snapshot.on.histogram.unwrap();
    assert_eq!(on_hist.counts(), &[256, 0, 0]);
    let off_hist = snapshot.off.histogram.unwrap();
    assert_eq!(off_hist.counts(), &[0, 0, 256]);
}

#[test]
fn test_sharded_accumulation_matches_serial() {
    let config = StatisticsConfig::default();
    let shape = (1, 3);
    let frames: Vec<AssembledImage> = (0..48)
        .map(|i| {
            AssembledImage::new(Array2::from_shape_fn(shape, |(_, col)| {
                (i as f32).mul_add(0.5, col as f32) - 7.0
            }))
        })
        .collect();

    let mut serial = PumpProbeAccumulator::new(shape, &config).unwrap();
    for (i, frame) in frames.iter().enumerate() {
        serial.update(frame, i as u64, PulseTag::On).unwrap();
    }

    let mut shards: Vec<PumpProbeAccumulator> = (0..4)
        .map(|_| PumpProbeAccumulator::new(shape, &config).unwrap())
        .collect();
    for (i, frame) in frames.iter().enumerate() {
        shards[i % 4].update(frame, i as u64, PulseTag::On).unwrap();
    }
    let mut merged = shards.remove(0);
    for shard in &shards {
        merged.merge(shard).unwrap();
    }

    let expected = serial.snapshot();
    let actual = merged.snapshot();
    assert_eq!(expected.on.frames, actual.on.frames);
    for col in 0..shape.1 {
        assert_relative_eq!(
            expected.on.mean[[0, col]],
            actual.on.mean[[0, col]],
            max_relative = 1e-9
        );
        assert_relative_eq!(
            expected.on.variance[[0, col]],
            actual.on.variance[[0, col]],
            max_relative = 1e-9
        );
    }
}

#[test]
fn test_snapshot_never_observes_partial_reset() {
    let config = StatisticsConfig {
        rois: vec![RoiDefinition::new(
            "all",
            RoiShape::Rectangle {
                x: 0,
                y: 0,
                width: 2,
                height: 2,
            },
        )
        .unwrap()],
        histogram: None,
    };
    let cell = Arc::new(AccumulatorCell::new((2, 2), &config).unwrap());
    let frame = AssembledImage::new(Array2::from_elem((2, 2), 1.0));

    let writer = {
        let cell = Arc::clone(&cell);
        let frame = frame.clone();
        thread::spawn(move || {
            for i in 0..2000u64 {
                cell.update(&frame, i, PulseTag::On).unwrap();
                if i % 500 == 0 {
                    cell.reset();
                }
            }
        })
    };

    let reader = {
        let cell = Arc::clone(&cell);
        thread::spawn(move || {
            for _ in 0..2000 {
                let snapshot = cell.snapshot();
                // every update appends exactly one ROI sample, so a torn
                // accumulator would show a frame/series length mismatch
                assert_eq!(
                    snapshot.on.rois[0].samples.len() as u64,
                    snapshot.on.frames
                );
                assert_eq!(snapshot.off.frames, 0);
            }
        })
    };

    writer.join().unwrap();
    reader.join().unwrap();
}

#[test]
fn test_geometry_change_requires_new_processor() {
    // InvalidGeometry is fatal at initialization, never at frame time
    let placements = vec![
        ModulePlacement::new(QuadPosition::new(0.0, 0.0), Orientation::R0),
        ModulePlacement::new(QuadPosition::new(1.0, 1.0), Orientation::R0),
    ];
    let err = GeometryDescriptor::new(MODULE_SHAPE, 0.5e-3, placements).unwrap_err();
    assert!(!err.is_frame_error());
}

#[test]
fn test_orientation_affects_assembled_values() {
    let geom = quad_geometry();
    let calibration = CalibrationSet::identity(0, &geom);
    let mut processor = TrainProcessor::new(
        geom,
        calibration,
        ProcessorConfig::default(),
    )
    .unwrap();

    // gradient panel: value grows with the row index
    let stack: Vec<ModulePanel> = (0..4)
        .map(|module| {
            ModulePanel::new(
                module,
                Array2::from_shape_fn(MODULE_SHAPE, |(row, _)| row as f32),
            )
        })
        .collect();
    let frames =
        processor.process_train(Train::with_pulses(1, vec![Pulse::new(0, PulseTag::On, stack)]));
    let frame = &frames[0];

    // module 0 is upright: top-left row is 0
    assert_eq!(frame.data()[[0, 0]], 0.0);
    // module 1 is rotated 180 degrees: its top row shows the panel's bottom
    assert_eq!(frame.data()[[0, MODULE_SHAPE.1 + 2]], (MODULE_SHAPE.0 - 1) as f32);
}
