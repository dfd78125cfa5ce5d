//! The scan cycle orchestrator.
//!
//! A [`ScanEngine`] owns the program text, the committed [`Snapshot`] and the
//! run mode. An external driver calls [`execute_cycle`](ScanEngine::execute_cycle)
//! once per period. Each call runs the program once, ages the timers and
//! commits the result only if the whole scan succeeded.
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::address::Address;
use crate::error::{EngineError, ParseError, Trap};
use crate::interpreter::{self, Snapshot};
use crate::memory::{MemoryMap, MemoryVariable};
use crate::parser::{self, Program};
use crate::process_image::InputKind;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    /// Not scanning. Used while the program is edited.
    #[default]
    Idle,
    Running,
    /// Frozen after a stop request or a fault.
    Stopped,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Idle => "IDLE",
            Mode::Running => "RUNNING",
            Mode::Stopped => "STOPPED",
        };
        f.write_str(name)
    }
}

/// Timing configuration for the engine.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanConfig {
    /// The period the driver is expected to call the engine at.
    pub target_period: Duration,
    /// The unit of timer presets and accumulated values.
    pub time_base: Duration,
    /// A cycle longer than `overrun_factor * target_period` is an overrun.
    pub overrun_factor: f64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            target_period: Duration::from_millis(100),
            time_base: Duration::from_millis(100),
            overrun_factor: 1.5,
        }
    }
}

impl ScanConfig {
    pub fn with_target_period(mut self, period: Duration) -> Self {
        self.target_period = period;
        self
    }

    pub fn with_time_base(mut self, time_base: Duration) -> Self {
        self.time_base = time_base;
        self
    }

    pub fn with_overrun_factor(mut self, factor: f64) -> Self {
        self.overrun_factor = factor;
        self
    }

    /// A limit that does not fit in a `Duration` saturates, so no cycle
    /// counts as an overrun.
    fn overrun_limit(&self) -> Duration {
        let secs = self.target_period.as_secs_f64() * self.overrun_factor.max(0.0);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

/// Timing statistics for telemetry displays.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanStats {
    pub scan_count: u64,
    pub cycle_time: Duration,
    pub average_cycle_time: Duration,
    pub max_cycle_time: Duration,
    pub target_cycle_time: Duration,
    pub overrun_count: u64,
    /// True when the last cycle took longer than the target period.
    pub is_overtime: bool,
}

/// A cloneable handle for requesting the engine to stop.
/// Used by signal handlers to stop the engine from another context.
#[derive(Clone, Debug)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    /// Requests the engine to stop before its next scan.
    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }
}

/// Drives an IL program through scan cycles.
///
/// The engine assumes exclusive, sequential access: calls to
/// [`execute_cycle`](ScanEngine::execute_cycle) must never overlap.
#[derive(Debug)]
pub struct ScanEngine {
    config: ScanConfig,
    program_text: String,
    /// Parsed form of `program_text`, filled on first use.
    program: Option<Program>,
    snapshot: Snapshot,
    input_kinds: BTreeMap<Address, InputKind>,
    mode: Mode,
    scan_count: u64,
    cycle_time: Duration,
    total_cycle_time: Duration,
    max_cycle_time: Duration,
    overrun_count: u64,
    stop_flag: Arc<AtomicBool>,
}

impl Default for ScanEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn input_address(id: &str) -> Result<Address, Trap> {
    match id.parse::<Address>()? {
        address @ Address::Input { .. } => Ok(address),
        other => Err(Trap::InvalidTarget {
            mnemonic: "input",
            id: other.to_string(),
        }),
    }
}

impl ScanEngine {
    /// Creates an idle engine with the default configuration and no program.
    pub fn new() -> Self {
        Self::with_config(ScanConfig::default())
    }

    pub fn with_config(config: ScanConfig) -> Self {
        ScanEngine {
            config,
            program_text: String::new(),
            program: None,
            snapshot: Snapshot::default(),
            input_kinds: BTreeMap::new(),
            mode: Mode::Idle,
            scan_count: 0,
            cycle_time: Duration::ZERO,
            total_cycle_time: Duration::ZERO,
            max_cycle_time: Duration::ZERO,
            overrun_count: 0,
            stop_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replaces the program text. The new text is parsed on the next cycle.
    pub fn set_program_text(&mut self, text: impl Into<String>) {
        self.program_text = text.into();
        self.program = None;
    }

    pub fn program_text(&self) -> &str {
        &self.program_text
    }

    /// Parses the program text now rather than on the next cycle. Returns
    /// the number of instructions.
    pub fn validate(&mut self) -> Result<usize, ParseError> {
        self.ensure_parsed()?;
        Ok(self.program.as_ref().map_or(0, Program::len))
    }

    fn ensure_parsed(&mut self) -> Result<(), ParseError> {
        if self.program.is_none() {
            let program = parser::parse(&self.program_text)?;
            debug!("Parsed program with {} instructions", program.len());
            self.program = Some(program);
        }
        Ok(())
    }

    /// Clears outputs and returns every memory entry to its zero state,
    /// then starts scanning.
    pub fn start(&mut self) {
        self.snapshot.outputs.clear();
        self.snapshot
            .memory
            .values_mut()
            .for_each(MemoryVariable::zero);
        self.snapshot.accumulator = None;
        self.clear_stats();
        self.stop_flag.store(false, Ordering::Relaxed);
        self.mode = Mode::Running;
        info!("Engine started");
    }

    /// Freezes the current state without resetting anything.
    pub fn stop(&mut self) {
        self.mode = Mode::Stopped;
        info!("Engine stopped after {} scans", self.scan_count);
    }

    /// Leaves the current state as is and returns to idle for editing.
    pub fn pause(&mut self) {
        self.mode = Mode::Idle;
    }

    /// Same as [`pause`](ScanEngine::pause).
    pub fn program(&mut self) {
        self.pause();
    }

    /// Discards all memory entries, clears the outputs and returns to idle.
    pub fn reset(&mut self) {
        self.snapshot.outputs.clear();
        self.snapshot.memory.clear();
        self.snapshot.accumulator = None;
        self.clear_stats();
        self.mode = Mode::Idle;
    }

    fn clear_stats(&mut self) {
        self.scan_count = 0;
        self.cycle_time = Duration::ZERO;
        self.total_cycle_time = Duration::ZERO;
        self.max_cycle_time = Duration::ZERO;
        self.overrun_count = 0;
    }

    /// Returns a cloneable handle that can request the engine to stop.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            flag: self.stop_flag.clone(),
        }
    }

    /// Writes the logical level of an input.
    pub fn set_input(&mut self, id: &str, value: bool) -> Result<(), Trap> {
        match input_address(id)? {
            Address::Input { byte, bit } => self.snapshot.inputs.store(byte, bit, value),
            _ => Ok(()),
        }
    }

    pub fn input(&self, id: &str) -> Result<bool, Trap> {
        self.snapshot.read(&input_address(id)?)
    }

    /// Sets the device kind of an input. Push buttons go to their released
    /// level.
    pub fn set_input_kind(&mut self, id: &str, kind: InputKind) -> Result<(), Trap> {
        let address = input_address(id)?;
        self.input_kinds.insert(address, kind);
        if kind != InputKind::Switch {
            self.release_input(id)?;
        }
        Ok(())
    }

    pub fn input_kind(&self, id: &str) -> Result<InputKind, Trap> {
        let address = input_address(id)?;
        Ok(self.input_kinds.get(&address).copied().unwrap_or_default())
    }

    /// Applies a physical press to an input according to its kind.
    pub fn press_input(&mut self, id: &str) -> Result<bool, Trap> {
        let level = self.input_kind(id)?.press(self.input(id)?);
        self.set_input(id, level)?;
        Ok(level)
    }

    /// Applies a physical release to an input according to its kind.
    pub fn release_input(&mut self, id: &str) -> Result<bool, Trap> {
        let level = self.input_kind(id)?.release(self.input(id)?);
        self.set_input(id, level)?;
        Ok(level)
    }

    pub fn output(&self, id: &str) -> Result<bool, Trap> {
        match id.parse::<Address>()? {
            address @ Address::Output { .. } => self.snapshot.read(&address),
            other => Err(Trap::InvalidTarget {
                mnemonic: "output",
                id: other.to_string(),
            }),
        }
    }

    pub fn memory(&self) -> &MemoryMap {
        &self.snapshot.memory
    }

    /// Looks up a memory, timer or counter entry by identifier.
    pub fn memory_variable(&self, id: &str) -> Option<&MemoryVariable> {
        let address = id.parse::<Address>().ok()?;
        if !address.is_memory_map() {
            return None;
        }
        self.snapshot.memory.get(&address.to_string())
    }

    /// The last committed state.
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn scan_count(&self) -> u64 {
        self.scan_count
    }

    /// Wall time taken by the last committed cycle.
    pub fn cycle_time(&self) -> Duration {
        self.cycle_time
    }

    pub fn accumulator(&self) -> Option<bool> {
        self.snapshot.accumulator
    }

    /// Runs one scan using the current time for timers.
    pub fn execute_cycle(&mut self) -> Result<(), EngineError> {
        self.execute_cycle_at(Instant::now())
    }

    /// Runs one scan, aging timers as of `now`.
    ///
    /// Does nothing when the engine is not running or the program is empty.
    /// On an error the engine stops and the previous snapshot stays
    /// committed.
    pub fn execute_cycle_at(&mut self, now: Instant) -> Result<(), EngineError> {
        if self.stop_flag.swap(false, Ordering::Relaxed) {
            self.stop();
        }
        if self.mode != Mode::Running {
            return Ok(());
        }

        let cycle_start = Instant::now();

        if let Err(e) = self.ensure_parsed() {
            return Err(self.fault(e.into()));
        }

        let result = match &self.program {
            Some(program) if !program.is_empty() => interpreter::execute(program, &self.snapshot),
            _ => return Ok(()),
        };
        let mut next = match result {
            Ok(next) => next,
            Err(ctx) => return Err(self.fault(ctx.into())),
        };

        // Timers age after the scan so LD sees the done bit from the previous cycle.
        for variable in next.memory.values_mut() {
            if let MemoryVariable::Timer(timer) = variable {
                let enable = timer.current_value();
                timer.update(enable, now, self.config.time_base);
            }
        }

        self.snapshot = next;
        self.scan_count += 1;
        self.record_cycle(cycle_start.elapsed());

        Ok(())
    }

    fn fault(&mut self, err: EngineError) -> EngineError {
        error!("{} [{}]", err, err.problem().code());
        self.mode = Mode::Stopped;
        err
    }

    fn record_cycle(&mut self, elapsed: Duration) {
        self.cycle_time = elapsed;
        self.total_cycle_time += elapsed;
        if elapsed > self.max_cycle_time {
            self.max_cycle_time = elapsed;
        }

        let limit = self.config.overrun_limit();
        if elapsed > limit {
            self.overrun_count += 1;
            warn!(
                "Scan {} took {:?}, longer than the {:?} limit",
                self.scan_count, elapsed, limit
            );
        } else {
            debug!("Scan {} completed in {:?}", self.scan_count, elapsed);
        }
    }

    pub fn stats(&self) -> ScanStats {
        let scans = u32::try_from(self.scan_count).unwrap_or(u32::MAX);
        ScanStats {
            scan_count: self.scan_count,
            cycle_time: self.cycle_time,
            average_cycle_time: self.total_cycle_time.checked_div(scans).unwrap_or_default(),
            max_cycle_time: self.max_cycle_time,
            target_cycle_time: self.config.target_period,
            overrun_count: self.overrun_count,
            is_overtime: self.cycle_time > self.config.target_period,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::CounterKind;

    fn running(text: &str) -> ScanEngine {
        let mut engine = ScanEngine::new();
        engine.set_program_text(text);
        engine.start();
        engine
    }

    #[test]
    fn execute_cycle_when_idle_then_no_op() {
        let mut engine = ScanEngine::new();
        engine.set_program_text("LDN I0.0\nST Q0.0");

        engine.execute_cycle().unwrap();

        assert_eq!(engine.scan_count(), 0);
        assert!(!engine.output("Q0.0").unwrap());
    }

    #[test]
    fn execute_cycle_when_running_then_commits_and_counts() {
        let mut engine = running("LDN I0.0\nST Q0.0");

        engine.execute_cycle().unwrap();

        assert_eq!(engine.scan_count(), 1);
        assert!(engine.output("Q0.0").unwrap());
        assert_eq!(engine.accumulator(), Some(true));
    }

    #[test]
    fn execute_cycle_when_program_empty_then_identity() {
        let mut engine = running("// nothing here\n\n");
        let before = engine.snapshot().clone();

        engine.execute_cycle().unwrap();

        assert_eq!(engine.snapshot(), &before);
        assert_eq!(engine.scan_count(), 0);
        assert_eq!(engine.mode(), Mode::Running);
    }

    #[test]
    fn execute_cycle_when_parse_error_then_stopped_without_executing() {
        let mut engine = running("LDN I0.0\nST Q0.0\nFOOBAR X");

        let err = engine.execute_cycle().unwrap_err();

        assert_eq!(
            err,
            EngineError::Parse(ParseError {
                line: 3,
                token: "FOOBAR".to_string()
            })
        );
        assert_eq!(engine.mode(), Mode::Stopped);
        assert!(!engine.output("Q0.0").unwrap());
    }

    #[test]
    fn execute_cycle_when_fault_then_previous_snapshot_kept() {
        let mut engine = running("LD I0.0\nST Q0.0");
        engine.set_input("I0.0", true).unwrap();
        engine.execute_cycle().unwrap();
        let good = engine.snapshot().clone();

        engine.set_program_text("LD I0.0\nST Q0.1\nST I0.1");
        engine.set_input("I0.0", false).unwrap();
        let err = engine.execute_cycle().unwrap_err();

        assert!(matches!(err, EngineError::Fault(ref ctx) if ctx.line == 3));
        assert_eq!(engine.mode(), Mode::Stopped);
        assert_eq!(engine.snapshot().outputs, good.outputs);
        assert_eq!(engine.scan_count(), 1);
    }

    #[test]
    fn set_program_text_when_changed_then_reparsed() {
        let mut engine = running("LD I0.0\nST Q0.0");
        engine.execute_cycle().unwrap();

        engine.set_program_text("LDN I0.0\nST Q0.1");
        engine.execute_cycle().unwrap();

        assert!(engine.output("Q0.1").unwrap());
    }

    #[test]
    fn validate_when_program_valid_then_instruction_count() {
        let mut engine = ScanEngine::new();
        engine.set_program_text("LD I0.0 // start\nST Q0.0\n");

        assert_eq!(engine.validate(), Ok(2));
    }

    #[test]
    fn start_when_restarted_then_entries_zeroed_but_kept() {
        let mut engine = running("LD I0.0\nCTD C0 3\nST M1\nLD I0.0\nST Q0.0");
        engine.set_input("I0.0", true).unwrap();
        engine.execute_cycle().unwrap();
        assert_eq!(
            engine
                .memory_variable("C0")
                .and_then(MemoryVariable::as_counter)
                .map(|c| c.accumulated()),
            Some(2)
        );

        engine.stop();
        engine.start();

        let counter = engine
            .memory_variable("c0")
            .and_then(MemoryVariable::as_counter)
            .unwrap();
        assert_eq!(counter.kind(), CounterKind::Down);
        assert_eq!(counter.accumulated(), 3);
        assert!(!engine.memory()["M1"].boolean());
        assert!(!engine.output("Q0.0").unwrap());
        assert_eq!(engine.scan_count(), 0);
        assert!(engine.input("I0.0").unwrap());
    }

    #[test]
    fn stop_when_cycle_requested_then_no_op() {
        let mut engine = running("LDN I0.0\nST Q0.0");

        engine.stop();
        engine.execute_cycle().unwrap();

        assert_eq!(engine.mode(), Mode::Stopped);
        assert_eq!(engine.scan_count(), 0);
    }

    #[test]
    fn pause_when_running_then_idle_and_state_kept() {
        let mut engine = running("LDN I0.0\nST Q0.0");
        engine.execute_cycle().unwrap();

        engine.program();

        assert_eq!(engine.mode(), Mode::Idle);
        assert!(engine.output("Q0.0").unwrap());
        assert_eq!(engine.scan_count(), 1);
    }

    #[test]
    fn reset_when_called_then_memory_map_wiped() {
        let mut engine = running("LDN I0.0\nST M0\nST Q0.0");
        engine.execute_cycle().unwrap();

        engine.reset();

        assert!(engine.memory().is_empty());
        assert!(!engine.output("Q0.0").unwrap());
        assert_eq!(engine.mode(), Mode::Idle);
        assert_eq!(engine.cycle_time(), Duration::ZERO);
    }

    #[test]
    fn stop_handle_when_requested_then_next_cycle_stops() {
        let mut engine = running("LDN I0.0\nST Q0.0");
        let handle = engine.stop_handle();

        handle.request_stop();
        engine.execute_cycle().unwrap();

        assert_eq!(engine.mode(), Mode::Stopped);
        assert_eq!(engine.scan_count(), 0);
    }

    #[test]
    fn set_input_when_output_address_then_invalid_target() {
        let mut engine = ScanEngine::new();

        assert_eq!(
            engine.set_input("Q0.0", true),
            Err(Trap::InvalidTarget {
                mnemonic: "input",
                id: "Q0.0".to_string()
            })
        );
    }

    #[test]
    fn set_input_kind_when_normally_closed_then_released_level_true() {
        let mut engine = ScanEngine::new();

        engine
            .set_input_kind("I1.1", InputKind::NormallyClosed)
            .unwrap();
        assert!(engine.input("I1.1").unwrap());

        assert!(!engine.press_input("I1.1").unwrap());
        assert!(engine.release_input("I1.1").unwrap());
    }

    #[test]
    fn press_input_when_switch_then_toggles() {
        let mut engine = ScanEngine::new();

        engine.press_input("I0.2").unwrap();
        engine.release_input("I0.2").unwrap();
        assert!(engine.input("I0.2").unwrap());

        engine.press_input("I0.2").unwrap();
        assert!(!engine.input("I0.2").unwrap());
    }

    #[test]
    fn record_cycle_when_past_overrun_limit_then_counted() {
        let mut engine = ScanEngine::with_config(
            ScanConfig::default().with_target_period(Duration::from_millis(10)),
        );

        engine.record_cycle(Duration::from_millis(12));
        assert_eq!(engine.stats().overrun_count, 0);
        assert!(engine.stats().is_overtime);

        engine.record_cycle(Duration::from_millis(16));
        assert_eq!(engine.stats().overrun_count, 1);
        assert_eq!(engine.stats().max_cycle_time, Duration::from_millis(16));
    }

    #[test]
    fn execute_cycle_when_overrun_then_counted_and_still_running() {
        let mut engine = ScanEngine::with_config(
            ScanConfig::default().with_target_period(Duration::from_nanos(1)),
        );
        engine.set_program_text("LD I0.0\nST Q0.0\nLDN Q0.0\nST M0");
        engine.start();

        for _ in 0..3 {
            engine.execute_cycle().unwrap();
        }

        assert_eq!(engine.mode(), Mode::Running);
        assert_eq!(engine.scan_count(), 3);
        assert_eq!(engine.stats().overrun_count, 3);
        assert!(engine.memory()["M0"].boolean());
    }

    #[test]
    fn execute_cycle_when_overrun_factor_infinite_then_never_overrun() {
        let mut engine = ScanEngine::with_config(
            ScanConfig::default()
                .with_target_period(Duration::from_nanos(1))
                .with_overrun_factor(f64::INFINITY),
        );
        engine.set_program_text("LD I0.0\nST Q0.0");
        engine.start();

        engine.execute_cycle().unwrap();

        assert_eq!(engine.mode(), Mode::Running);
        assert_eq!(engine.scan_count(), 1);
        assert_eq!(engine.stats().overrun_count, 0);
    }

    #[test]
    fn overrun_limit_when_factor_not_representable_then_saturates() {
        let huge = ScanConfig::default().with_overrun_factor(f64::MAX);
        let nan = ScanConfig::default().with_overrun_factor(f64::NAN);
        let negative = ScanConfig::default().with_overrun_factor(-2.0);

        assert_eq!(huge.overrun_limit(), Duration::MAX);
        assert_eq!(nan.overrun_limit(), Duration::ZERO);
        assert_eq!(negative.overrun_limit(), Duration::ZERO);
    }

    #[test]
    fn stats_when_scans_recorded_then_average() {
        let mut engine = ScanEngine::new();
        engine.scan_count = 2;
        engine.record_cycle(Duration::from_millis(2));
        engine.record_cycle(Duration::from_millis(4));

        let stats = engine.stats();

        assert_eq!(stats.average_cycle_time, Duration::from_millis(3));
        assert_eq!(stats.cycle_time, Duration::from_millis(4));
        assert_eq!(stats.target_cycle_time, Duration::from_millis(100));
        assert!(!stats.is_overtime);
    }

    #[test]
    fn stats_when_no_scans_then_zero_average() {
        let engine = ScanEngine::new();

        assert_eq!(engine.stats().average_cycle_time, Duration::ZERO);
    }
}
