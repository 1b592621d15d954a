//! tensorcore-emu: cycle-accurate tensor-core emulator test harness
//!
//! Runs the end-to-end verification scenarios against the pipelined core,
//! using the combinational model as the oracle.

use std::env;
use std::path::Path;
use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

use tensorcore_emu::config::{FileConfig, RunConfig, CONFIG_FILE};
use tensorcore_emu::fp::{Precision, RoundingMode};
use tensorcore_emu::testing::scenarios;

fn print_usage(prog: &str) {
    println!();
    println!("  tensorcore-emu — cycle-accurate 8x8x8 tensor-core emulator");
    println!();
    println!("  Usage: {} [OPTIONS]", prog);
    println!();
    println!("  Options:");
    println!("    --prec <P>       Restrict input precision (repeatable)");
    println!("                     Values: FP4_E2M1 | FP8_E4M3 | FP8_E5M2 | FP16");
    println!("    --out-prec <P>   Restrict output precision (repeatable)");
    println!("                     Values: FP8_E4M3 | FP8_E5M2 | FP16 | FP32");
    println!("    --test <ID>      Run a single test (1-6); default all");
    println!("                     1 = single matmul per precision pair");
    println!("                     2 = back-to-back jobs");
    println!("                     3 = stress (100 random jobs per pair)");
    println!("                     4 = pipeline stage visualization");
    println!("                     5 = output conversion table");
    println!("                     6 = edge cases (identity, zero)");
    println!("    --rm <MODE>      Rounding mode: RNE | RTZ | RDN | RUP | RMM");
    println!("    --seed <N>       RNG seed (0 = derive from the clock)");
    println!("    --max-cycles <N> Cycle cap per job (default 100)");
    println!("    --help           Show this message");
    println!();
}

fn parse_args(cfg: &mut RunConfig, args: &[String]) -> anyhow::Result<bool> {
    let mut precisions = Vec::new();
    let mut out_precisions = Vec::new();
    let mut it = args.iter();
    while let Some(arg) = it.next() {
        let mut value_of = |name: &str| -> anyhow::Result<String> {
            it.next()
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("{} requires a value", name))
        };
        match arg.as_str() {
            "--help" | "-h" => return Ok(false),
            "--prec" => {
                let v = value_of("--prec")?;
                precisions.push(
                    Precision::parse(&v).ok_or_else(|| anyhow::anyhow!("unknown precision '{}'", v))?,
                );
            }
            "--out-prec" => {
                let v = value_of("--out-prec")?;
                out_precisions.push(
                    Precision::parse(&v).ok_or_else(|| anyhow::anyhow!("unknown precision '{}'", v))?,
                );
            }
            "--test" => {
                let v = value_of("--test")?;
                cfg.test_id = v.parse()?;
                anyhow::ensure!((1..=6).contains(&cfg.test_id), "test id must be 1-6");
            }
            "--rm" => {
                let v = value_of("--rm")?;
                cfg.rm = RoundingMode::parse(&v)
                    .ok_or_else(|| anyhow::anyhow!("unknown rounding mode '{}'", v))?;
            }
            "--seed" => cfg.seed = value_of("--seed")?.parse()?,
            "--max-cycles" => cfg.max_cycles = value_of("--max-cycles")?.parse()?,
            other => anyhow::bail!("unknown argument '{}'", other),
        }
    }
    if !precisions.is_empty() {
        cfg.precisions = precisions;
    }
    if !out_precisions.is_empty() {
        cfg.out_precisions = out_precisions;
    }
    for p in &cfg.precisions {
        anyhow::ensure!(
            Precision::INPUTS.contains(p),
            "{} is not an input precision",
            p.name()
        );
    }
    for p in &cfg.out_precisions {
        anyhow::ensure!(
            Precision::OUTPUTS.contains(p),
            "{} is not an output precision",
            p.name()
        );
    }
    Ok(true)
}

fn print_config(cfg: &RunConfig) {
    let names = |ps: &[Precision]| ps.iter().map(|p| p.name()).collect::<Vec<_>>().join(", ");
    println!("  configuration:");
    println!("    precisions     : {}", names(&cfg.precisions));
    println!("    out precisions : {}", names(&cfg.out_precisions));
    println!("    rounding       : {}", cfg.rm.name());
    println!("    seed           : {}", cfg.seed);
    if cfg.test_id == 0 {
        println!("    tests          : all (1-6)");
    } else {
        println!("    tests          : {} only", cfg.test_id);
    }
    println!();
}

fn main() -> anyhow::Result<ExitCode> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let file = FileConfig::load(Path::new(CONFIG_FILE))?;
    let mut cfg = RunConfig::from_file(&file)?;
    if !parse_args(&mut cfg, &args[1..])? {
        print_usage(&args[0]);
        return Ok(ExitCode::SUCCESS);
    }

    if cfg.seed == 0 {
        cfg.seed = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
        log::debug!("derived seed {}", cfg.seed);
    }

    println!();
    println!("  tensorcore-emu: 8x8x8 D = A*B + C, cycle-accurate");
    println!("  FP9 multiply (3-stage), FP9 add (near/far dual path),");
    println!("  FP22 accumulate, output conversion");
    println!();
    print_config(&cfg);

    let ok = scenarios::run_selected(&cfg);
    println!("  {}", if ok { "all tests passed" } else { "FAILURES detected" });
    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
