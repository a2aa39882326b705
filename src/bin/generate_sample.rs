//! Write a synthetic APOGEE night for offline runs of `fibercheck`.
//!
//! Produces `sample_night/quickred/<mjd>/ap1D-a-<id>.parquet` frames and a
//! `sample_night/master.csv` master column. A dome flat has a dead stretch of
//! fibers, a faint bundle and a few weak fibers; a ThAr arc has its line
//! shifted by a known amount.
//!
//! ```text
//! fibercheck --frame sample_night/quickred/59000/ap1D-a-35880001.parquet \
//!     --master-file sample_night/master.csv
//! fibercheck --frame sample_night/quickred/59000/ap1D-a-35880002.parquet --arc thar
//! ```

use std::path::Path;
use std::sync::Arc;

use arrow::array::{Float64Builder, Int64Array, ListBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

const N_FIBERS: usize = 300;
const N_PIXELS: usize = 2048;
const MJD: u32 = 59000;

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

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

/// Relative throughput of each fiber in the synthetic flat.
fn throughput(fiber: usize) -> f64 {
    match fiber {
        50..=52 => 0.05,
        80 | 143 => 0.45,
        181..=210 => 0.5,
        _ => 1.0,
    }
}

fn write_frame(path: &Path, rows: &[Vec<f64>]) {
    let mut flux_builder = ListBuilder::new(Float64Builder::new());
    for row in rows {
        flux_builder.values().append_slice(row);
        flux_builder.append(true);
    }
    let fiber_array = Int64Array::from((1..=rows.len() as i64).collect::<Vec<_>>());

    let schema = Arc::new(Schema::new(vec![
        Field::new("fiber", DataType::Int64, false),
        Field::new(
            "flux",
            DataType::List(Arc::new(Field::new("item", DataType::Float64, true))),
            false,
        ),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![Arc::new(fiber_array), Arc::new(flux_builder.finish())],
    )
    .expect("Failed to create RecordBatch");

    let file = std::fs::File::create(path).expect("Failed to create output file");
    let mut writer = ArrowWriter::try_new(file, schema, None).expect("Failed to create writer");
    writer.write(&batch).expect("Failed to write batch");
    writer.close().expect("Failed to close writer");
}

fn main() {
    let mut rng = SimpleRng::new(42);
    let level = 12_000.0;

    let out = Path::new("sample_night").join("quickred").join(MJD.to_string());
    std::fs::create_dir_all(&out).expect("Failed to create output directory");

    // Dome flat: smooth continuum scaled by each fiber's throughput.
    let flat: Vec<Vec<f64>> = (1..=N_FIBERS)
        .map(|fiber| {
            (0..N_PIXELS)
                .map(|_| level * throughput(fiber) + rng.gauss(0.0, 40.0))
                .collect()
        })
        .collect();
    write_frame(&out.join("ap1D-a-35880001.parquet"), &flat);

    // ThAr arc: one bright line, 0.8 px redward of its nominal position.
    let arc: Vec<Vec<f64>> = (1..=N_FIBERS)
        .map(|_| {
            (0..N_PIXELS)
                .map(|p| 50.0 + gaussian(p as f64, 939.8, 1.2745, 40_000.0) + rng.gauss(0.0, 5.0))
                .collect()
        })
        .collect();
    write_frame(&out.join("ap1D-a-35880002.parquet"), &arc);

    let master = std::iter::repeat(format!("{level}\n"))
        .take(N_FIBERS)
        .collect::<String>();
    std::fs::write(Path::new("sample_night").join("master.csv"), master)
        .expect("Failed to write master column");

    println!(
        "Wrote 2 quickred frames ({N_FIBERS} fibers x {N_PIXELS} pixels) to {}",
        out.display()
    );
}
