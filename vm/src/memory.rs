//! Memory bits, timers and counters.
//!
//! Entries are created lazily by the interpreter on first reference and are
//! kept in a [`MemoryMap`] keyed by the canonical identifier (`M0`, `T3`, ...).
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::error::ConfigError;

pub const TIMER_PRESET_MIN: i64 = 1;
pub const TIMER_PRESET_MAX: i64 = 32767;
pub const COUNTER_PRESET_MIN: i64 = 1;
pub const COUNTER_PRESET_MAX: i64 = 9999;

/// Lazily created memory, timer and counter entries.
pub type MemoryMap = BTreeMap<String, MemoryVariable>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerKind {
    OnDelay,
    OffDelay,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CounterKind {
    Up,
    Down,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryBit {
    pub value: bool,
}

/// A non-retentive timer. The preset and accumulated values are in units of
/// the engine time base.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Timer {
    kind: TimerKind,
    current_value: bool,
    preset: u32,
    accumulated: u32,
    enabled: bool,
    done: bool,
    start: Option<Instant>,
}

fn check_timer_preset(preset: i64) -> Result<u32, ConfigError> {
    if (TIMER_PRESET_MIN..=TIMER_PRESET_MAX).contains(&preset) {
        Ok(preset as u32)
    } else {
        Err(ConfigError::TimerPresetOutOfRange(preset))
    }
}

fn check_counter_preset(preset: i64) -> Result<i32, ConfigError> {
    if (COUNTER_PRESET_MIN..=COUNTER_PRESET_MAX).contains(&preset) {
        Ok(preset as i32)
    } else {
        Err(ConfigError::CounterPresetOutOfRange(preset))
    }
}

/// Whole time-base units elapsed between `start` and `now`.
fn elapsed_units(start: Instant, now: Instant, time_base: Duration) -> u64 {
    let base = time_base.as_nanos().max(1);
    let units = now.saturating_duration_since(start).as_nanos() / base;
    u64::try_from(units).unwrap_or(u64::MAX)
}

impl Timer {
    pub fn new(kind: TimerKind, preset: i64) -> Result<Self, ConfigError> {
        Ok(Timer {
            kind,
            current_value: false,
            preset: check_timer_preset(preset)?,
            accumulated: 0,
            enabled: false,
            done: false,
            start: None,
        })
    }

    /// Changes the kind and preset of an existing timer without touching its
    /// timing state.
    pub fn configure(&mut self, kind: TimerKind, preset: i64) -> Result<(), ConfigError> {
        self.preset = check_timer_preset(preset)?;
        self.kind = kind;
        Ok(())
    }

    pub fn kind(&self) -> TimerKind {
        self.kind
    }

    /// The enable input last written by the program.
    pub fn current_value(&self) -> bool {
        self.current_value
    }

    pub fn set_current_value(&mut self, value: bool) {
        self.current_value = value;
    }

    pub fn preset(&self) -> u32 {
        self.preset
    }

    pub fn accumulated(&self) -> u32 {
        self.accumulated
    }

    /// The enable level observed by the most recent [`update`](Timer::update).
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn done(&self) -> bool {
        self.done
    }

    pub fn start(&self) -> Option<Instant> {
        self.start
    }

    /// Advances the timer for the enable level `enable` at time `now`.
    ///
    /// Accumulated time is derived from the wall clock, not from the number
    /// of updates, so a late or stalled caller still sees real elapsed time.
    pub fn update(&mut self, enable: bool, now: Instant, time_base: Duration) {
        match self.kind {
            TimerKind::OnDelay => {
                if enable && !self.enabled {
                    self.start = Some(now);
                    self.accumulated = 0;
                    self.done = false;
                } else if enable {
                    if let Some(start) = self.start {
                        self.advance(start, now, time_base);
                        if self.accumulated >= self.preset {
                            self.done = true;
                        }
                    }
                } else {
                    self.start = None;
                    self.accumulated = 0;
                    self.done = false;
                }
            }
            TimerKind::OffDelay => {
                if enable {
                    self.done = true;
                    self.start = None;
                    self.accumulated = 0;
                } else if self.enabled {
                    self.start = Some(now);
                    self.accumulated = 0;
                    self.done = true;
                } else if let Some(start) = self.start {
                    self.advance(start, now, time_base);
                    if self.accumulated >= self.preset {
                        self.done = false;
                    }
                }
            }
        }

        self.enabled = enable;
    }

    fn advance(&mut self, start: Instant, now: Instant, time_base: Duration) {
        let units = elapsed_units(start, now, time_base);
        self.accumulated = units.min(self.preset as u64) as u32;
    }

    /// Returns the timer to idle.
    pub fn reset(&mut self) {
        self.accumulated = 0;
        self.done = false;
        self.enabled = false;
        self.start = None;
    }
}

/// An edge-triggered counter.
///
/// The accumulated value is not clamped: an up counter may run past its
/// preset and a down counter may go negative. The done bit is always
/// computed from the accumulated value and the preset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Counter {
    kind: CounterKind,
    current_value: bool,
    preset: i32,
    accumulated: i32,
    previous_enable: bool,
}

impl Counter {
    /// Creates a counter. A down counter starts at its preset.
    pub fn new(kind: CounterKind, preset: i64) -> Result<Self, ConfigError> {
        let preset = check_counter_preset(preset)?;
        let accumulated = match kind {
            CounterKind::Up => 0,
            CounterKind::Down => preset,
        };
        Ok(Counter {
            kind,
            current_value: false,
            preset,
            accumulated,
            previous_enable: false,
        })
    }

    pub fn kind(&self) -> CounterKind {
        self.kind
    }

    pub fn set_kind(&mut self, kind: CounterKind) {
        self.kind = kind;
    }

    pub fn current_value(&self) -> bool {
        self.current_value
    }

    pub fn set_current_value(&mut self, value: bool) {
        self.current_value = value;
    }

    pub fn preset(&self) -> i32 {
        self.preset
    }

    pub fn accumulated(&self) -> i32 {
        self.accumulated
    }

    /// The enable level seen at the previous evaluation.
    pub fn previous_enable(&self) -> bool {
        self.previous_enable
    }

    pub fn done(&self) -> bool {
        match self.kind {
            CounterKind::Up => self.accumulated >= self.preset,
            CounterKind::Down => self.accumulated <= 0,
        }
    }

    /// Evaluates the enable input. Counts once on a false to true transition
    /// and returns the done bit.
    pub fn count(&mut self, enable: bool) -> bool {
        if enable && !self.previous_enable {
            self.accumulated = match self.kind {
                CounterKind::Up => self.accumulated.saturating_add(1),
                CounterKind::Down => self.accumulated.saturating_sub(1),
            };
        }
        // Must be recorded even without an edge or the next scan misreads one.
        self.previous_enable = enable;
        self.done()
    }

    /// Returns an up counter to zero and a down counter to its preset.
    pub fn reset(&mut self) {
        self.accumulated = match self.kind {
            CounterKind::Up => 0,
            CounterKind::Down => self.preset,
        };
        self.previous_enable = false;
    }

    /// Loads both the preset and the accumulated value.
    pub fn load(&mut self, value: i64) -> Result<(), ConfigError> {
        let value = check_counter_preset(value)?;
        self.preset = value;
        self.accumulated = value;
        self.previous_enable = false;
        Ok(())
    }

    /// Zeroes the accumulated value regardless of kind.
    pub fn clear(&mut self) {
        self.accumulated = 0;
        self.previous_enable = false;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemoryVariable {
    Bit(MemoryBit),
    Timer(Timer),
    Counter(Counter),
}

impl MemoryVariable {
    /// The value seen by LD, AND and OR: the bit itself for memory, the done
    /// bit for timers and counters.
    pub fn boolean(&self) -> bool {
        match self {
            MemoryVariable::Bit(bit) => bit.value,
            MemoryVariable::Timer(timer) => timer.done(),
            MemoryVariable::Counter(counter) => counter.done(),
        }
    }

    pub fn as_timer(&self) -> Option<&Timer> {
        match self {
            MemoryVariable::Timer(timer) => Some(timer),
            _ => None,
        }
    }

    pub fn as_counter(&self) -> Option<&Counter> {
        match self {
            MemoryVariable::Counter(counter) => Some(counter),
            _ => None,
        }
    }

    /// Returns the entry to the state it has when the controller starts.
    pub fn zero(&mut self) {
        match self {
            MemoryVariable::Bit(bit) => bit.value = false,
            MemoryVariable::Timer(timer) => {
                timer.reset();
                timer.set_current_value(false);
            }
            MemoryVariable::Counter(counter) => {
                counter.reset();
                counter.set_current_value(false);
            }
        }
    }

    /// Formats a one-line status for tables and dumps.
    pub fn status(&self, id: &str) -> String {
        match self {
            MemoryVariable::Bit(bit) => format!("Memory {id}: State={}", bit.value),
            MemoryVariable::Timer(timer) => {
                let kind = match timer.kind() {
                    TimerKind::OnDelay => "Timer On",
                    TimerKind::OffDelay => "Timer Off",
                };
                format!(
                    "{kind} {id}: EN={}, Accum={}, Preset={}, DN={}",
                    timer.current_value(),
                    timer.accumulated(),
                    timer.preset(),
                    timer.done()
                )
            }
            MemoryVariable::Counter(counter) => {
                let kind = match counter.kind() {
                    CounterKind::Up => "Counter Up",
                    CounterKind::Down => "Counter Down",
                };
                format!(
                    "{kind} {id}: Accum={}, Preset={}, DN={}",
                    counter.accumulated(),
                    counter.preset(),
                    counter.done()
                )
            }
        }
    }
}
