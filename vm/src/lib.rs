pub mod address;
pub mod error;
pub mod interpreter;
pub mod memory;
pub mod parser;
pub mod process_image;
mod scan;

pub use address::Address;
pub use error::{ConfigError, EngineError, FaultContext, ParseError, Trap};
pub use interpreter::{execute, ExecutionContext, Snapshot};
pub use memory::{Counter, CounterKind, MemoryBit, MemoryMap, MemoryVariable, Timer, TimerKind};
pub use parser::{parse, Instruction, Opcode, Program};
pub use process_image::{InputKind, ProcessImage};
pub use scan::{Mode, ScanConfig, ScanEngine, ScanStats, StopHandle};
