//! Implements the command line behavior.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use ilsim_vm::{EngineError, Mode, ScanConfig, ScanEngine};
use log::info;
use serde_json::json;

/// Parses an `ID=LEVEL` input assignment such as `I0.0=1`.
pub fn parse_input(text: &str) -> Result<(String, bool), String> {
    let (id, level) = text
        .split_once('=')
        .ok_or_else(|| format!("expected ID=LEVEL but found '{text}'"))?;
    let level = match level.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" => true,
        "0" | "false" | "off" => false,
        other => return Err(format!("'{other}' is not a boolean level")),
    };
    Ok((id.trim().to_string(), level))
}

fn describe(err: &EngineError) -> String {
    format!("{err} [{}]", err.problem().code())
}

/// Reads a program file into an engine and checks that it parses. Returns
/// the engine with the number of instructions.
fn load(path: &Path, config: ScanConfig) -> Result<(ScanEngine, usize), String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("Unable to open {}: {}", path.display(), e))?;

    let mut engine = ScanEngine::with_config(config);
    engine.set_program_text(text);
    let count = engine
        .validate()
        .map_err(|e| describe(&EngineError::from(e)))?;
    Ok((engine, count))
}

/// Loads a program and runs scan cycles.
///
/// When `scans` is `Some(n)`, runs exactly `n` cycles.
/// When `scans` is `None`, runs continuously until Ctrl+C.
/// When `dump_vars` is `Some(path)`, writes all variable values after stopping,
/// including after a fault.
pub fn run(
    path: &Path,
    scans: Option<u64>,
    period: Duration,
    inputs: &[(String, bool)],
    dump_vars: Option<&Path>,
) -> Result<(), String> {
    let (mut engine, _) = load(path, ScanConfig::default().with_target_period(period))?;

    engine.start();
    for (id, level) in inputs {
        engine
            .set_input(id, *level)
            .map_err(|e| format!("Invalid input {id}: {e}"))?;
    }

    // Install signal handler for clean shutdown
    let handle = engine.stop_handle();
    ctrlc::set_handler(move || handle.request_stop())
        .map_err(|e| format!("Failed to set signal handler: {e}"))?;

    let mut cycles = 0u64;
    loop {
        if let Some(max) = scans {
            if cycles >= max {
                break;
            }
        }

        let cycle_start = Instant::now();
        if let Err(err) = engine.execute_cycle() {
            if let Some(dump_path) = dump_vars {
                dump_variables(&engine, dump_path)?;
            }
            return Err(describe(&err));
        }
        if engine.mode() != Mode::Running {
            break;
        }
        cycles += 1;

        if scans.map_or(true, |max| cycles < max) {
            thread::sleep(period.saturating_sub(cycle_start.elapsed()));
        }
    }

    engine.stop();
    let stats = engine.stats();
    info!(
        "Completed {} scans, average {:?}, max {:?}, {} overruns",
        stats.scan_count, stats.average_cycle_time, stats.max_cycle_time, stats.overrun_count
    );

    if let Some(dump_path) = dump_vars {
        dump_variables(&engine, dump_path)?;
    }

    Ok(())
}

/// Parses a program without running it.
pub fn check(path: &Path) -> Result<(), String> {
    let (_, count) = load(path, ScanConfig::default())?;
    println!("ok: {count} instructions");
    Ok(())
}

/// Benchmarks a program by running it for `cycles` scans, preceded by
/// `warmup` unmeasured scans, then prints JSON timing statistics.
pub fn benchmark(path: &Path, cycles: u64, warmup: u64) -> Result<(), String> {
    let (mut engine, instructions) = load(path, ScanConfig::default())?;
    engine.start();

    // Warmup phase (unmeasured)
    for _ in 0..warmup {
        engine
            .execute_cycle()
            .map_err(|e| format!("Fault during warmup: {}", describe(&e)))?;
    }

    // Measured phase, recording each scan's duration
    let mut durations_us = Vec::with_capacity(usize::try_from(cycles).unwrap_or(0));
    for _ in 0..cycles {
        let scan_start = Instant::now();
        engine
            .execute_cycle()
            .map_err(|e| format!("Fault during benchmark: {}", describe(&e)))?;
        durations_us.push(scan_start.elapsed().as_nanos() as f64 / 1000.0);
    }

    engine.stop();

    durations_us.sort_by(f64::total_cmp);
    let count = durations_us.len().max(1) as f64;
    let mean = durations_us.iter().sum::<f64>() / count;
    let variance = durations_us.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / count;
    let stddev = variance.sqrt();
    let max = durations_us.last().copied().unwrap_or(0.0);
    let p99 = percentile(&durations_us, 99.0);

    let program_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stats = engine.stats();
    let target_us = stats.target_cycle_time.as_micros() as f64;

    let result = json!({
        "program": program_name,
        "instructions": instructions,
        "cycles": cycles,
        "warmup": warmup,
        "scan_us": {
            "mean": round3(mean),
            "stddev": round3(stddev),
            "p99": round3(p99),
            "max": round3(max),
        },
        "target_us": target_us,
        "budget_pct": {
            "mean": round3(mean / target_us * 100.0),
            "p99": round3(p99 / target_us * 100.0),
            "max": round3(max / target_us * 100.0),
        },
        "overruns": stats.overrun_count,
    });

    println!(
        "{}",
        serde_json::to_string_pretty(&result).unwrap_or_default()
    );
    Ok(())
}

/// Returns the value at the given percentile (0 to 100) using nearest-rank.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (pct / 100.0 * sorted.len() as f64).ceil() as usize;
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

/// Rounds to 3 decimal places.
fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

/// Writes inputs, outputs and then memory entries, one per line.
fn dump_variables(engine: &ScanEngine, dump_path: &Path) -> Result<(), String> {
    let mut out = File::create(dump_path)
        .map_err(|e| format!("Unable to create dump file {}: {e}", dump_path.display()))?;
    let snapshot = engine.snapshot();

    for (name, value) in snapshot.inputs.iter().chain(snapshot.outputs.iter()) {
        writeln!(out, "{name}: {value}").map_err(|e| format!("Unable to write dump file: {e}"))?;
    }
    for (id, variable) in engine.memory() {
        writeln!(out, "{}", variable.status(id))
            .map_err(|e| format!("Unable to write dump file: {e}"))?;
    }
    Ok(())
}
