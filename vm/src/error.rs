use std::fmt;

use ilsim_problems::Problem;

use crate::memory::{COUNTER_PRESET_MAX, COUNTER_PRESET_MIN, TIMER_PRESET_MAX, TIMER_PRESET_MIN};

/// Presets that violate the configured bounds. These are raised when a
/// timer or counter is created, never deferred to a later scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    TimerPresetOutOfRange(i64),
    CounterPresetOutOfRange(i64),
}

impl ConfigError {
    pub fn problem(&self) -> Problem {
        match self {
            ConfigError::TimerPresetOutOfRange(_) => Problem::TimerPresetOutOfRange,
            ConfigError::CounterPresetOutOfRange(_) => Problem::CounterPresetOutOfRange,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::TimerPresetOutOfRange(v) => write!(
                f,
                "timer preset {v} is outside {TIMER_PRESET_MIN}..={TIMER_PRESET_MAX}"
            ),
            ConfigError::CounterPresetOutOfRange(v) => write!(
                f,
                "counter preset {v} is outside {COUNTER_PRESET_MIN}..={COUNTER_PRESET_MAX}"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Runtime traps that abort the remainder of a scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Trap {
    /// The instruction read the accumulator before anything loaded it.
    AccumulatorUnset(&'static str),
    WriteToInput(String),
    /// The variable kind cannot be the subject of the instruction.
    InvalidTarget {
        mnemonic: &'static str,
        id: String,
    },
    MissingOperand(&'static str),
    /// A timer or counter was referenced for the first time without a preset.
    MissingPreset(String),
    InvalidPreset(String),
    MalformedVariable(String),
    Config(ConfigError),
}

impl Trap {
    /// Returns the stable problem code for this trap.
    pub fn problem(&self) -> Problem {
        match self {
            Trap::AccumulatorUnset(_) => Problem::AccumulatorUnset,
            Trap::WriteToInput(_) => Problem::WriteToInput,
            Trap::InvalidTarget { .. } => Problem::InvalidTarget,
            Trap::MissingOperand(_) => Problem::MissingOperand,
            Trap::MissingPreset(_) => Problem::MissingPreset,
            Trap::InvalidPreset(_) => Problem::InvalidPreset,
            Trap::MalformedVariable(_) => Problem::MalformedVariable,
            Trap::Config(e) => e.problem(),
        }
    }
}

impl fmt::Display for Trap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trap::AccumulatorUnset(op) => {
                write!(f, "{op} reads the accumulator before LD or LDN")
            }
            Trap::WriteToInput(id) => write!(f, "cannot write to input {id}"),
            Trap::InvalidTarget { mnemonic, id } => {
                write!(f, "{id} is not a valid target for {mnemonic}")
            }
            Trap::MissingOperand(op) => write!(f, "{op} is missing an operand"),
            Trap::MissingPreset(id) => write!(f, "{id} needs a preset on first use"),
            Trap::InvalidPreset(text) => write!(f, "invalid preset value: '{text}'"),
            Trap::MalformedVariable(id) => write!(f, "malformed variable: '{id}'"),
            Trap::Config(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for Trap {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Trap::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for Trap {
    fn from(e: ConfigError) -> Self {
        Trap::Config(e)
    }
}

/// The program text contains an operator outside the vocabulary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseError {
    /// Line (1-indexed)
    pub line: usize,
    pub token: String,
}

impl ParseError {
    pub fn problem(&self) -> Problem {
        Problem::UnknownOperator
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: unknown operator '{}'", self.line, self.token)
    }
}

impl std::error::Error for ParseError {}

/// Context for a trap that occurred while executing a program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FaultContext {
    pub trap: Trap,
    /// Source line (1-indexed) of the failing instruction.
    pub line: usize,
    /// The source text of the failing instruction.
    pub raw: String,
}

impl fmt::Display for FaultContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {} ({})", self.line, self.trap, self.raw)
    }
}

impl std::error::Error for FaultContext {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.trap)
    }
}

/// Errors produced by a scan cycle. Either one leaves the engine stopped
/// with the last committed snapshot intact.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineError {
    Parse(ParseError),
    Fault(FaultContext),
}

impl EngineError {
    pub fn problem(&self) -> Problem {
        match self {
            EngineError::Parse(e) => e.problem(),
            EngineError::Fault(ctx) => ctx.trap.problem(),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Parse(e) => write!(f, "parse error: {e}"),
            EngineError::Fault(ctx) => write!(f, "runtime error: {ctx}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Parse(e) => Some(e),
            EngineError::Fault(ctx) => Some(ctx),
        }
    }
}

impl From<ParseError> for EngineError {
    fn from(e: ParseError) -> Self {
        EngineError::Parse(e)
    }
}

impl From<FaultContext> for EngineError {
    fn from(ctx: FaultContext) -> Self {
        EngineError::Fault(ctx)
    }
}
