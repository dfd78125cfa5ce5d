//! Shared test helpers for engine integration tests.

use std::time::{Duration, Instant};

use ilsim_vm::{EngineError, ScanConfig, ScanEngine};

/// Time base used by the timer tests, in place of the 100 ms default.
pub const TIME_BASE: Duration = Duration::from_millis(10);

/// Creates a started engine running `text`.
pub fn running_engine(text: &str) -> ScanEngine {
    let mut engine =
        ScanEngine::with_config(ScanConfig::default().with_time_base(TIME_BASE));
    engine.set_program_text(text);
    engine.start();
    engine
}

/// Runs one cycle as of `base + millis`.
#[allow(dead_code)]
pub fn cycle_at(engine: &mut ScanEngine, base: Instant, millis: u64) -> Result<(), EngineError> {
    engine.execute_cycle_at(base + Duration::from_millis(millis))
}

/// Reads an output, panicking on a bad identifier.
#[allow(dead_code)]
pub fn output(engine: &ScanEngine, id: &str) -> bool {
    engine.output(id).unwrap()
}
