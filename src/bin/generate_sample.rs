//! Synthesize one observation for all three instruments, run the full
//! alignment/fusion pipeline on it, and dump the fused grid to CSV for
//! inspection. Records go through the real binary decoders, so this also
//! exercises the on-disk layouts end to end.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use log::info;

use radiofuse::instrument::{single_dish, sweep, tiled, ChannelFamily, RawObservation, Stokes};
use radiofuse::{fuse, subtract_background, BackgroundConfig, FusionConfig, FusionGrid};

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// Raw counts for one cell: a quiet background with a drifting burst that
/// sweeps from high to low frequency over the observation.
fn cell(t_s: f64, f_mhz: f64, rng: &mut SimpleRng) -> f64 {
    let drift_f = 600.0 * (-t_s / 400.0).exp() + 20.0;
    let burst = 2000.0 * (-((f_mhz - drift_f) / (0.25 * drift_f)).powi(2)).exp();
    let background = 120.0 + 0.05 * f_mhz;
    (background + burst + rng.gauss(0.0, 8.0)).max(0.0)
}

fn sample_block(
    start: DateTime<Utc>,
    t0: DateTime<Utc>,
    cadence_s: f64,
    n_samp: usize,
    freqs: &[f64],
    rng: &mut SimpleRng,
) -> Vec<f32> {
    let mut out = Vec::with_capacity(n_samp * freqs.len());
    for k in 0..n_samp {
        let t_s = (start - t0).num_milliseconds() as f64 / 1e3 + k as f64 * cadence_s;
        for &f in freqs {
            out.push(cell(t_s, f, rng) as f32);
        }
    }
    out
}

fn push_f64s(out: &mut Vec<u8>, values: &[f64]) {
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
}

fn push_f32s(out: &mut Vec<u8>, values: &[f32]) {
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
}

/// Single-dish file: explicit per-sample offsets, dual Stokes blocks.
fn dish_file(
    start: DateTime<Utc>,
    t0: DateTime<Utc>,
    n_samp: usize,
    rng: &mut SimpleRng,
) -> Vec<u8> {
    let freqs: Vec<f64> = (0..40).map(|i| 10.0 + 1.8 * i as f64).collect();
    let offsets: Vec<f64> = (0..n_samp).map(|i| i as f64).collect();
    let block = sample_block(start, t0, 1.0, n_samp, &freqs, rng);

    let mut out = Vec::new();
    out.extend_from_slice(&single_dish::RECORD_MAGIC);
    out.extend_from_slice(&start.timestamp_micros().to_le_bytes());
    out.extend_from_slice(&(offsets.len() as u32).to_le_bytes());
    out.extend_from_slice(&(n_samp as u32).to_le_bytes());
    out.extend_from_slice(&(freqs.len() as u32).to_le_bytes());
    push_f64s(&mut out, &offsets);
    push_f64s(&mut out, &freqs);
    push_f32s(&mut out, &block);
    // Stokes V: a weak copy of I.
    let v: Vec<f32> = block.iter().map(|x| x * 0.1).collect();
    push_f32s(&mut out, &v);
    out
}

/// Sweep file: three labeled sub-bands with a real gap between the last two.
fn sweep_file(
    start: DateTime<Utc>,
    t0: DateTime<Utc>,
    n_samp: usize,
    rng: &mut SimpleRng,
) -> Vec<u8> {
    let bands: [(&str, f64, f64, usize); 3] = [
        ("P", 25.0, 1.0, 55),
        ("L", 80.0, 2.0, 60),
        ("S", 245.0, 5.0, 91),
    ];
    let mut out = Vec::new();
    out.extend_from_slice(&sweep::RECORD_MAGIC);
    out.extend_from_slice(&start.timestamp_micros().to_le_bytes());
    out.extend_from_slice(&3.0f64.to_le_bytes());
    out.extend_from_slice(&(n_samp as u32).to_le_bytes());
    out.extend_from_slice(&(bands.len() as u32).to_le_bytes());
    for (label, f_start, df, n_chan) in bands {
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
        out.extend_from_slice(&(n_chan as u32).to_le_bytes());
        let freqs: Vec<f64> = (0..n_chan).map(|i| f_start + df * i as f64).collect();
        push_f64s(&mut out, &freqs);
        push_f32s(&mut out, &sample_block(start, t0, 3.0, n_samp, &freqs, rng));
    }
    out
}

/// Tile file: descending frequency axis, ten-minute slices.
fn tile_file(
    family: ChannelFamily,
    start: DateTime<Utc>,
    t0: DateTime<Utc>,
    n_samp: usize,
    rng: &mut SimpleRng,
) -> Vec<u8> {
    let (top, n_chan) = match family {
        ChannelFamily::Low => (400.0, 120),
        ChannelFamily::High => (700.0, 120),
    };
    let freqs: Vec<f64> = (0..n_chan).map(|i| top - 2.5 * i as f64).collect();
    let ascending: Vec<f64> = freqs.iter().rev().copied().collect();
    let block = sample_block(start, t0, 0.5, n_samp, &ascending, rng);
    // Store columns the way the instrument does: highest frequency first.
    let mut descending_block = vec![0.0f32; block.len()];
    for row in 0..n_samp {
        for col in 0..n_chan {
            descending_block[row * n_chan + col] = block[row * n_chan + (n_chan - 1 - col)];
        }
    }

    let mut out = Vec::new();
    out.extend_from_slice(&tiled::RECORD_MAGIC);
    out.push(match family {
        ChannelFamily::Low => 0,
        ChannelFamily::High => 1,
    });
    out.extend_from_slice(&start.timestamp_micros().to_le_bytes());
    out.extend_from_slice(&0.5f64.to_le_bytes());
    out.extend_from_slice(&(n_samp as u32).to_le_bytes());
    out.extend_from_slice(&(n_chan as u32).to_le_bytes());
    push_f64s(&mut out, &freqs);
    push_f32s(&mut out, &descending_block);
    out
}

fn write_csv(grid: &FusionGrid, path: &str) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).context("creating CSV output")?;
    let mut header = vec!["time_utc".to_string()];
    header.extend(grid.freqs.iter().map(|f| format!("{f:.3}")));
    writer.write_record(&header)?;
    for (i, t) in grid.times.iter().enumerate() {
        let mut row = vec![t.to_rfc3339()];
        row.extend(grid.data.row(i).iter().map(|v| {
            if v.is_nan() {
                String::new()
            } else {
                format!("{v:.5}")
            }
        }));
        writer.write_record(&row)?;
    }
    writer.flush().context("flushing CSV output")?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let mut rng = SimpleRng::new(42);
    let t0 = Utc.with_ymd_and_hms(2024, 7, 14, 10, 0, 0).unwrap();

    // Two dish files with a deliberate one-sample overlap at the seam.
    let dish_bytes = vec![
        dish_file(t0, t0, 300, &mut rng),
        dish_file(t0 + Duration::seconds(299), t0, 300, &mut rng),
    ];
    let sweep_bytes = vec![sweep_file(t0, t0, 200, &mut rng)];
    let tile_bytes: Vec<(ChannelFamily, Vec<u8>)> = (0..2)
        .flat_map(|slice| {
            let start = t0 + Duration::seconds(slice * 300);
            [
                (ChannelFamily::Low, tile_file(ChannelFamily::Low, start, t0, 600, &mut rng)),
                (ChannelFamily::High, tile_file(ChannelFamily::High, start, t0, 600, &mut rng)),
            ]
        })
        .collect();

    // Decode through the real adapters.
    let dish = RawObservation::SingleDish {
        stokes: Stokes::I,
        records: dish_bytes
            .iter()
            .map(|b| single_dish::decode_record(b))
            .collect::<radiofuse::Result<_>>()?,
    };
    let sweeps = RawObservation::Sweep {
        records: sweep_bytes
            .iter()
            .map(|b| sweep::decode_record(b))
            .collect::<radiofuse::Result<_>>()?,
    };
    let mut observations = vec![dish, sweeps];
    for family in [ChannelFamily::Low, ChannelFamily::High] {
        let records = tile_bytes
            .iter()
            .filter(|(f, _)| *f == family)
            .map(|(_, b)| tiled::decode_record(b))
            .collect::<radiofuse::Result<_>>()?;
        observations.push(RawObservation::Tiled { family, records });
    }

    let bg = BackgroundConfig::default();
    let specs: Vec<_> = observations
        .into_iter()
        .map(|obs| {
            let mut spec = obs.produce();
            subtract_background(&mut spec, &bg);
            info!(
                "{}: {} samples x {} channels",
                spec.source,
                spec.times.len(),
                spec.freqs.len()
            );
            spec
        })
        .collect();

    let cfg = FusionConfig {
        time_window: (t0, t0 + Duration::seconds(598)),
        freq_window: (10.0, 700.0),
        cadence: Some(1.0),
        priority_order: radiofuse::config::default_priority_order(),
    };
    let grid = fuse(&specs, &cfg)?;

    let output_path = "fused_grid.csv";
    write_csv(&grid, output_path)?;
    println!(
        "Fused {} time samples x {} channels ({:.1}% missing) to {output_path}",
        grid.times.len(),
        grid.freqs.len(),
        grid.missing_fraction() * 100.0
    );
    Ok(())
}
