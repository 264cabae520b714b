use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::print_batches;
use log::info;
use parquet::arrow::ArrowWriter;

/// Records per second.
const SAMPLERATE: f64 = 10.0;

/// Pressure cycles in the acquisition.
const CYCLES: usize = 6;

/// Records per cycle: ramp up, hold, vent, idle.
const RAMP: usize = 40;
const HOLD: usize = 30;
const VENT: usize = 20;
const IDLE: usize = 25;

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

/// Column buffers of the synthetic acquisition.
#[derive(Default)]
struct Acquisition {
    time: Vec<f64>,
    pressure: Vec<f64>,
    valve: Vec<bool>,
    speed: Vec<i64>,
    mode: Vec<&'static str>,
}

impl Acquisition {
    fn push(&mut self, pressure: f64, valve: bool, speed: i64, mode: &'static str) {
        self.time.push(self.time.len() as f64 / SAMPLERATE);
        self.pressure.push(pressure);
        self.valve.push(valve);
        self.speed.push(speed);
        self.mode.push(mode);
    }

    fn len(&self) -> usize {
        self.time.len()
    }
}

fn generate(rng: &mut SimpleRng) -> Acquisition {
    let mut acq = Acquisition::default();
    for cycle in 0..CYCLES {
        // later cycles hold a little higher and a little shorter
        let peak = 4.0 + cycle as f64 * 0.5;
        let hold = HOLD - cycle * 3;

        for i in 0..RAMP {
            let p = peak * (i + 1) as f64 / RAMP as f64;
            acq.push(p + rng.gauss(0.0, 0.02), true, 1200, "ramp");
        }
        for _ in 0..hold {
            acq.push(peak + rng.gauss(0.0, 0.05), true, 1500, "hold");
        }
        for i in 0..VENT {
            let p = peak * (1.0 - (i + 1) as f64 / VENT as f64);
            acq.push(p.max(0.0) + rng.gauss(0.0, 0.02).abs(), false, 800, "vent");
        }
        for _ in 0..IDLE {
            acq.push(rng.gauss(0.0, 0.01).abs(), false, 0, "idle");
        }
    }
    acq
}

fn write_csv(acq: &Acquisition, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(["time", "pressure", "valve", "speed", "mode"])?;
    for i in 0..acq.len() {
        writer.write_record([
            format!("{:.1}", acq.time[i]),
            format!("{:.4}", acq.pressure[i]),
            acq.valve[i].to_string(),
            acq.speed[i].to_string(),
            acq.mode[i].to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn to_batch(acq: &Acquisition) -> Result<RecordBatch> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("time", DataType::Float64, false),
        Field::new("pressure", DataType::Float64, false),
        Field::new("valve", DataType::Boolean, false),
        Field::new("speed", DataType::Int64, false),
        Field::new("mode", DataType::Utf8, false),
    ]));

    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Float64Array::from(acq.time.clone())),
            Arc::new(Float64Array::from(acq.pressure.clone())),
            Arc::new(BooleanArray::from(acq.valve.clone())),
            Arc::new(Int64Array::from(acq.speed.clone())),
            Arc::new(StringArray::from(acq.mode.clone())),
        ],
    )
    .context("building record batch")?;
    Ok(batch)
}

fn write_parquet(batch: &RecordBatch, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)
        .context("creating parquet writer")?;
    writer.write(batch).context("writing batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let out_dir = PathBuf::from(std::env::args().nth(1).unwrap_or_else(|| ".".into()));
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;

    let mut rng = SimpleRng::new(42);
    let acq = generate(&mut rng);
    let batch = to_batch(&acq)?;

    let csv_path = out_dir.join("sample_acquisition.csv");
    let parquet_path = out_dir.join("sample_acquisition.parquet");
    write_csv(&acq, &csv_path)?;
    write_parquet(&batch, &parquet_path)?;
    info!("sample rate {SAMPLERATE} Hz, {CYCLES} cycles");

    print_batches(&[batch.slice(0, batch.num_rows().min(5))])?;
    println!(
        "Wrote {} records to {} and {}",
        acq.len(),
        csv_path.display(),
        parquet_path.display()
    );
    Ok(())
}
