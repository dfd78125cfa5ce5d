//! Accumulator machine that executes one pass over an instruction list.
use log::{debug, trace};

use crate::address::Address;
use crate::error::{FaultContext, Trap};
use crate::memory::{Counter, CounterKind, MemoryBit, MemoryMap, MemoryVariable, Timer, TimerKind};
use crate::parser::{Instruction, Opcode, Program};
use crate::process_image::ProcessImage;

/// The state a program reads and writes during a scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub inputs: ProcessImage,
    pub outputs: ProcessImage,
    pub memory: MemoryMap,
    /// Accumulator at the end of the last completed scan.
    pub accumulator: Option<bool>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Snapshot {
            inputs: ProcessImage::inputs(),
            outputs: ProcessImage::outputs(),
            memory: MemoryMap::new(),
            accumulator: None,
        }
    }
}

impl Snapshot {
    /// Reads the boolean value of any address. Memory entries that do not
    /// exist yet read as false.
    pub fn read(&self, address: &Address) -> Result<bool, Trap> {
        match address {
            Address::Input { byte, bit } => self.inputs.load(*byte, *bit),
            Address::Output { byte, bit } => self.outputs.load(*byte, *bit),
            Address::Memory(_) | Address::Timer(_) | Address::Counter(_) => Ok(self
                .memory
                .get(&address.to_string())
                .map(MemoryVariable::boolean)
                .unwrap_or(false)),
        }
    }
}

/// Registers for one scan. The accumulator starts unset on every scan.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    accumulator: Option<bool>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accumulator(&self) -> Option<bool> {
        self.accumulator
    }

    fn read(&self, opcode: Opcode) -> Result<bool, Trap> {
        self.accumulator
            .ok_or(Trap::AccumulatorUnset(opcode.mnemonic()))
    }

    fn write(&mut self, value: bool) {
        self.accumulator = Some(value);
    }
}

/// Executes `program` once against a private copy of `snapshot`.
///
/// Returns the updated copy. On a trap the copy is dropped, so the caller's
/// snapshot never observes a partially executed scan.
pub fn execute(program: &Program, snapshot: &Snapshot) -> Result<Snapshot, FaultContext> {
    let mut working = snapshot.clone();
    let mut ctx = ExecutionContext::new();

    for instruction in program.instructions() {
        step(instruction, &mut ctx, &mut working).map_err(|trap| FaultContext {
            trap,
            line: instruction.line,
            raw: instruction.raw.clone(),
        })?;
        trace!(
            "line {}: {} -> {:?}",
            instruction.line,
            instruction.raw,
            ctx.accumulator()
        );
    }

    working.accumulator = ctx.accumulator();
    Ok(working)
}

fn subject(instruction: &Instruction) -> Result<Address, Trap> {
    instruction
        .operand(0)
        .ok_or(Trap::MissingOperand(instruction.opcode.mnemonic()))?
        .parse()
}

fn parse_preset(text: &str) -> Result<i64, Trap> {
    text.trim()
        .parse::<i64>()
        .map_err(|_| Trap::InvalidPreset(text.to_string()))
}

fn invalid_target(opcode: Opcode, address: &Address) -> Trap {
    Trap::InvalidTarget {
        mnemonic: opcode.mnemonic(),
        id: address.to_string(),
    }
}

fn timer_mut<'a>(memory: &'a mut MemoryMap, id: &str) -> Option<&'a mut Timer> {
    match memory.get_mut(id) {
        Some(MemoryVariable::Timer(timer)) => Some(timer),
        _ => None,
    }
}

fn counter_mut<'a>(memory: &'a mut MemoryMap, id: &str) -> Option<&'a mut Counter> {
    match memory.get_mut(id) {
        Some(MemoryVariable::Counter(counter)) => Some(counter),
        _ => None,
    }
}

/// Writes a memory bit, creating it on first use.
fn store_bit(memory: &mut MemoryMap, id: String, value: bool) {
    memory.insert(id, MemoryVariable::Bit(MemoryBit { value }));
}

/// Stores a value the way ST does.
fn store(address: &Address, value: bool, state: &mut Snapshot) -> Result<(), Trap> {
    let id = address.to_string();
    match address {
        Address::Input { .. } => Err(Trap::WriteToInput(id)),
        Address::Output { byte, bit } => state.outputs.store(*byte, *bit, value),
        Address::Memory(_) => {
            store_bit(&mut state.memory, id, value);
            Ok(())
        }
        Address::Timer(_) => {
            let timer =
                timer_mut(&mut state.memory, &id).ok_or(Trap::MissingPreset(id.clone()))?;
            timer.set_current_value(value);
            Ok(())
        }
        Address::Counter(_) => {
            let counter =
                counter_mut(&mut state.memory, &id).ok_or(Trap::MissingPreset(id.clone()))?;
            // Storing into a counter drives its count input.
            counter.count(value);
            counter.set_current_value(value);
            Ok(())
        }
    }
}

fn step(
    instruction: &Instruction,
    ctx: &mut ExecutionContext,
    state: &mut Snapshot,
) -> Result<(), Trap> {
    let opcode = instruction.opcode;

    match opcode {
        Opcode::Ld => {
            let value = state.read(&subject(instruction)?)?;
            ctx.write(value);
        }
        Opcode::Ldn => {
            let value = state.read(&subject(instruction)?)?;
            ctx.write(!value);
        }
        Opcode::St => {
            let acc = ctx.read(opcode)?;
            store(&subject(instruction)?, acc, state)?;
        }
        Opcode::Stn => {
            // The accumulator itself keeps its original value.
            let acc = ctx.read(opcode)?;
            store(&subject(instruction)?, !acc, state)?;
        }
        Opcode::And | Opcode::Andn | Opcode::Or | Opcode::Orn => {
            let acc = ctx.read(opcode)?;
            let value = state.read(&subject(instruction)?)?;
            let result = match opcode {
                Opcode::And => acc && value,
                Opcode::Andn => acc && !value,
                Opcode::Or => acc || value,
                _ => acc || !value,
            };
            ctx.write(result);
        }
        Opcode::Not => {
            let acc = ctx.read(opcode)?;
            ctx.write(!acc);
        }
        Opcode::Set | Opcode::Reset => {
            let acc = ctx.read(opcode)?;
            let address = subject(instruction)?;
            let value = opcode == Opcode::Set;
            // A false accumulator leaves the bit alone rather than writing the opposite value.
            match address {
                Address::Output { byte, bit } if acc => {
                    state.outputs.store(byte, bit, value)?
                }
                Address::Memory(_) if acc => {
                    store_bit(&mut state.memory, address.to_string(), value)
                }
                Address::Output { .. } | Address::Memory(_) => {}
                _ => return Err(invalid_target(opcode, &address)),
            }
        }
        Opcode::Ton | Opcode::Toff => {
            let address = subject(instruction)?;
            if !matches!(address, Address::Timer(_)) {
                return Err(invalid_target(opcode, &address));
            }
            let id = address.to_string();
            let preset = parse_preset(
                instruction
                    .operand(1)
                    .ok_or(Trap::MissingPreset(id.clone()))?,
            )?;
            let enable = ctx.read(opcode)?;
            let kind = if opcode == Opcode::Ton {
                TimerKind::OnDelay
            } else {
                TimerKind::OffDelay
            };

            match timer_mut(&mut state.memory, &id) {
                Some(timer) => timer.configure(kind, preset)?,
                None => {
                    debug!("Creating {kind:?} timer {id} with preset {preset}");
                    state
                        .memory
                        .insert(id.clone(), MemoryVariable::Timer(Timer::new(kind, preset)?));
                }
            }

            // The instruction both configures the timer and drives its enable.
            if let Some(timer) = timer_mut(&mut state.memory, &id) {
                timer.set_current_value(enable);
            }
        }
        Opcode::Ctu | Opcode::Ctd => {
            let address = subject(instruction)?;
            if !matches!(address, Address::Counter(_)) {
                return Err(invalid_target(opcode, &address));
            }
            let id = address.to_string();
            let preset = instruction.operand(1).map(parse_preset).transpose()?;
            let enable = ctx.read(opcode)?;
            let kind = if opcode == Opcode::Ctu {
                CounterKind::Up
            } else {
                CounterKind::Down
            };

            match counter_mut(&mut state.memory, &id) {
                // An existing counter keeps its preset, which may have come from CTL.
                Some(counter) => counter.set_kind(kind),
                None => {
                    let preset = preset.ok_or(Trap::MissingPreset(id.clone()))?;
                    debug!("Creating {kind:?} counter {id} with preset {preset}");
                    state
                        .memory
                        .insert(id.clone(), MemoryVariable::Counter(Counter::new(kind, preset)?));
                }
            }

            if let Some(counter) = counter_mut(&mut state.memory, &id) {
                let done = counter.count(enable);
                counter.set_current_value(done);
                // The done bit replaces the accumulator. IL programs rely on this
                // to chain the counter output into the following instructions.
                ctx.write(done);
            }
        }
        Opcode::Ctr => {
            let acc = ctx.read(opcode)?;
            let address = subject(instruction)?;
            if !matches!(address, Address::Counter(_)) {
                return Err(invalid_target(opcode, &address));
            }
            if acc {
                if let Some(counter) = counter_mut(&mut state.memory, &address.to_string()) {
                    counter.reset();
                }
            }
        }
        Opcode::Ctl => {
            let address = subject(instruction)?;
            if !matches!(address, Address::Counter(_)) {
                return Err(invalid_target(opcode, &address));
            }
            let id = address.to_string();
            let value = parse_preset(
                instruction
                    .operand(1)
                    .ok_or(Trap::MissingPreset(id.clone()))?,
            )?;
            let acc = ctx.read(opcode)?;

            if !state.memory.contains_key(&id) {
                debug!("Creating Down counter {id} loaded with {value}");
                state.memory.insert(
                    id.clone(),
                    MemoryVariable::Counter(Counter::new(CounterKind::Down, value)?),
                );
            }
            if acc {
                if let Some(counter) = counter_mut(&mut state.memory, &id) {
                    counter.load(value)?;
                }
            }
        }
        Opcode::Rst => {
            let acc = ctx.read(opcode)?;
            let address = subject(instruction)?;
            let id = address.to_string();
            match address {
                Address::Input { .. } => return Err(invalid_target(opcode, &address)),
                _ if !acc => {}
                Address::Output { byte, bit } => state.outputs.store(byte, bit, false)?,
                Address::Memory(_) => {
                    if let Some(MemoryVariable::Bit(bit)) = state.memory.get_mut(&id) {
                        bit.value = false;
                    }
                }
                Address::Timer(_) => {
                    if let Some(timer) = timer_mut(&mut state.memory, &id) {
                        timer.reset();
                    }
                }
                Address::Counter(_) => {
                    if let Some(counter) = counter_mut(&mut state.memory, &id) {
                        counter.clear();
                    }
                }
            }
        }
    }

    Ok(())
}
