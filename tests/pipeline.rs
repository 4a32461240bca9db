//! End-to-end scenarios over the public API: adapters → background → fusion.

use chrono::{DateTime, Duration, TimeZone, Utc};
use ndarray::Array2;

use radiofuse::config::default_priority_order;
use radiofuse::instrument::{single_dish, DishRecord, RawObservation, Stokes};
use radiofuse::{
    fuse, subtract_background, BackgroundConfig, BaselineMode, FuseError, FusionConfig,
    IntensityUnit, SourceId, Spectrogram,
};

fn t(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 14, 10, 0, 0).unwrap() + Duration::seconds(secs)
}

/// Constant-valued spectrogram at 1 Hz cadence starting at t(0).
fn constant_spec(source: SourceId, freqs: Vec<f64>, nt: usize, value: f64) -> Spectrogram {
    let nf = freqs.len();
    Spectrogram::from_parts(
        source,
        (0..nt as i64).map(t).collect(),
        freqs,
        Array2::from_elem((nt, nf), value),
        IntensityUnit::BackgroundSubtracted,
    )
}

fn two_instrument_config(secs: i64) -> FusionConfig {
    FusionConfig {
        time_window: (t(0), t(secs)),
        freq_window: (10.0, 700.0),
        cadence: Some(1.0),
        priority_order: default_priority_order(),
    }
}

#[test]
fn two_instruments_tile_the_spectrum_without_holes() {
    // A: 10–80 MHz at constant 5. B: 80–700 MHz at constant 9. Together
    // they cover the whole requested range for the whole window.
    let a = constant_spec(
        SourceId::SingleDish,
        (1..=8).map(|i| 10.0 * i as f64).collect(),
        31,
        5.0,
    );
    let b = constant_spec(
        SourceId::SweepSpectrograph,
        (2..=18).map(|i| (i * 40) as f64 - 20.0).collect(), // 60..700
        31,
        9.0,
    );
    let grid = fuse(&[a, b], &two_instrument_config(30)).unwrap();

    assert!(
        !grid.data.iter().any(|v| v.is_nan()),
        "no missing cells inside the jointly covered range"
    );
    // Constant inputs z-score to zero on both sides of the split.
    assert!(grid.data.iter().all(|v| v.abs() < 1e-12));
    assert!(grid.freqs.windows(2).all(|w| w[1] > w[0]));
    assert_eq!(grid.times.len(), 31);
}

#[test]
fn overlap_channel_belongs_to_the_later_priority_source() {
    // Both cover 60–80 MHz, but the sweep spectrograph only recorded the
    // first half of the window. If it owns the overlap channels, the cells
    // beyond its time coverage must be missing even though the dish has
    // data there: channel authority is exclusive, never blended.
    let dish = constant_spec(
        SourceId::SingleDish,
        vec![10.0, 40.0, 60.0, 80.0],
        31,
        5.0,
    );
    let sweep = constant_spec(
        SourceId::SweepSpectrograph,
        vec![60.0, 80.0, 300.0, 700.0],
        10,
        9.0,
    );
    let cfg = two_instrument_config(30);
    let grid = fuse(&[dish.clone(), sweep.clone()], &cfg).unwrap();

    let ch60 = grid.freqs.iter().position(|f| *f == 60.0).unwrap();
    let ch10 = grid.freqs.iter().position(|f| *f == 10.0).unwrap();
    assert!(grid.data[[20, ch60]].is_nan(), "sweep owns 60 MHz; dish never fills in");
    assert!(grid.data[[20, ch10]].is_finite(), "10 MHz stays with the dish");

    // Reversing the priority order hands the overlap back to the dish.
    let mut reversed = cfg;
    reversed.priority_order = vec![SourceId::SweepSpectrograph, SourceId::SingleDish];
    let grid2 = fuse(&[dish, sweep], &reversed).unwrap();
    assert!(
        grid2.data[[20, ch60]].is_finite(),
        "priority order is an explicit configuration choice"
    );
}

#[test]
fn empty_source_contributes_nothing_and_never_raises() {
    let good = constant_spec(
        SourceId::SweepSpectrograph,
        (2..=18).map(|i| (i * 40) as f64 - 20.0).collect(),
        31,
        9.0,
    );
    let with_empty = fuse(
        &[good.clone(), Spectrogram::empty(SourceId::TiledLow)],
        &two_instrument_config(30),
    )
    .unwrap();
    let without = fuse(&[good], &two_instrument_config(30)).unwrap();

    assert_eq!(with_empty.freqs, without.freqs);
    let bits = |g: &radiofuse::FusionGrid| g.data.iter().map(|v| v.to_bits()).collect::<Vec<_>>();
    assert_eq!(bits(&with_empty), bits(&without));
}

#[test]
fn sub_two_sample_frequency_window_is_fatal() {
    let only = constant_spec(SourceId::SingleDish, vec![10.0, 20.0, 30.0], 31, 5.0);
    let mut cfg = two_instrument_config(30);
    cfg.freq_window = (19.5, 20.5);
    match fuse(&[only], &cfg) {
        Err(FuseError::InsufficientAxis { axis: "frequency", .. }) => {}
        other => panic!("expected InsufficientAxis, got {other:?}"),
    }
}

#[test]
fn adapter_to_grid_round_trip_through_the_binary_decoder() {
    // One dish file with an edge-truncated offset field (31 offsets for 30
    // rows), decoded from bytes, normalized, and fused alone.
    let freqs: Vec<f64> = (0..16).map(|i| 10.0 + 5.0 * i as f64).collect();
    let offsets: Vec<f64> = (0..31).map(|i| i as f64).collect();
    let rows = 30usize;

    let mut bytes = Vec::new();
    bytes.extend_from_slice(&single_dish::RECORD_MAGIC);
    bytes.extend_from_slice(&t(0).timestamp_micros().to_le_bytes());
    bytes.extend_from_slice(&(offsets.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&(rows as u32).to_le_bytes());
    bytes.extend_from_slice(&(freqs.len() as u32).to_le_bytes());
    for v in &offsets {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    for v in &freqs {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    for stokes_fill in [400.0f32, 40.0f32] {
        for _ in 0..rows * freqs.len() {
            bytes.extend_from_slice(&stokes_fill.to_le_bytes());
        }
    }

    let record: DishRecord = single_dish::decode_record(&bytes).unwrap();
    let obs = RawObservation::SingleDish {
        stokes: Stokes::I,
        records: vec![record],
    };
    let mut spec = obs.produce();
    assert_eq!(spec.data.dim(), (30, 16), "edge truncation restores the invariant");

    let baseline = subtract_background(
        &mut spec,
        &BackgroundConfig {
            mode: BaselineMode::FullAxis,
            log_transform: true,
            intensity_floor: 1e-4,
        },
    );
    assert_eq!(baseline.per_channel.len(), 16);
    assert_eq!(spec.unit, IntensityUnit::BackgroundSubtracted);

    let cfg = FusionConfig {
        time_window: (t(0), t(29)),
        freq_window: (10.0, 100.0),
        cadence: None,
        priority_order: default_priority_order(),
    };
    let grid = fuse(&[spec], &cfg).unwrap();
    assert_eq!(grid.times.len(), 30, "native 1 Hz cadence inferred");
    assert!(grid.data.iter().all(|v| v.is_finite()));
}

#[test]
fn repeated_runs_are_bit_identical() {
    let a = constant_spec(SourceId::SingleDish, vec![10.0, 40.0, 80.0], 31, 5.0);
    let b = constant_spec(
        SourceId::SweepSpectrograph,
        vec![80.0, 300.0, 700.0],
        31,
        9.0,
    );
    let cfg = two_instrument_config(30);
    let bits = |g: &radiofuse::FusionGrid| g.data.iter().map(|v| v.to_bits()).collect::<Vec<_>>();
    let first = fuse(&[a.clone(), b.clone()], &cfg).unwrap();
    let second = fuse(&[a, b], &cfg).unwrap();
    assert_eq!(bits(&first), bits(&second));
}
