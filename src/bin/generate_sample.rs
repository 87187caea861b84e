use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

const ROWS: usize = 8;
const COLS: usize = 12;

/// Standard series in wells A1..H1 (mg/L NH4).
const STANDARDS: [f64; ROWS] = [0.0, 0.5, 1.0, 2.0, 4.0, 6.0, 8.0, 10.0];

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

/// One plate's wells in column-major position order (A1, B1, ..., H12).
struct Plate {
    id: String,
    concentrations: Vec<f64>,
}

fn make_plate(id: &str, rng: &mut SimpleRng) -> Plate {
    let concentrations = (0..ROWS * COLS)
        .map(|i| if i < ROWS { STANDARDS[i] } else { rng.next_f64() * 9.0 })
        .collect();
    Plate {
        id: id.to_string(),
        concentrations,
    }
}

/// Absorbance = blank + slope * conc + noise, laid out as the reader exports it.
fn write_raw(path: &Path, plate: &Plate, slope: f64, rng: &mut SimpleRng) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    let mut header = vec![String::new()];
    header.extend((1..=COLS).map(|c| c.to_string()));
    writer.write_record(&header)?;

    for row in 0..ROWS {
        let mut record = vec![((b'A' + row as u8) as char).to_string()];
        for col in 0..COLS {
            let conc = plate.concentrations[col * ROWS + row];
            let absorbance = 0.045 + slope * conc + rng.gauss(0.0, 0.004);
            record.push(format!("{:.4}", absorbance.max(0.0)));
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_ids(path: &Path, plates: &[Plate]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(["position", "well", "sample", "std", "std_conc_NH4", "ammonium_id"])?;
    for plate in plates {
        for (i, conc) in plate.concentrations.iter().enumerate() {
            let well = format!("{}{}", (b'A' + (i % ROWS) as u8) as char, i / ROWS + 1);
            let is_std = i < ROWS;
            writer.write_record([
                (i + 1).to_string(),
                well,
                if is_std { format!("std_{conc}") } else { format!("soil_{:03}", i + 1) },
                u8::from(is_std).to_string(),
                if is_std { conc.to_string() } else { String::new() },
                plate.id.clone(),
            ])?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Write synthetic plate-reader exports and identifier sheets.
#[derive(Parser, Debug)]
#[command(name = "generate_sample", about, long_about = None)]
struct Args {
    /// Output directory; `raw/` and `ids/` are created inside it.
    #[arg(default_value = "sample_data")]
    out_dir: PathBuf,

    /// PRNG seed.
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn main() -> Result<()> {
    let Args { out_dir, seed } = Args::parse();
    let raw_dir = out_dir.join("raw");
    let id_dir = out_dir.join("ids");
    std::fs::create_dir_all(&raw_dir).context("creating raw directory")?;
    std::fs::create_dir_all(&id_dir).context("creating identifier directory")?;

    let mut rng = SimpleRng::new(seed);
    let days = ["2021-06-15", "2021-06-16", "2021-06-22"];
    let mut n_plates = 0;

    for day in days {
        let plates: Vec<Plate> = (1..=2)
            .map(|p| make_plate(&format!("NH4_plate{p}"), &mut rng))
            .collect();
        for plate in &plates {
            // Each plate gets its own slightly different response.
            let slope = 0.08 + rng.gauss(0.0, 0.005);
            write_raw(&raw_dir.join(format!("{day}_{}.csv", plate.id)), plate, slope, &mut rng)?;
            n_plates += 1;
        }
        write_ids(&id_dir.join(format!("{day}_ids.csv")), &plates)?;
    }

    println!(
        "Wrote {n_plates} plates over {} days to {}",
        days.len(),
        out_dir.display()
    );
    Ok(())
}
