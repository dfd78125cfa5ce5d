use crate::address::{BITS_PER_BYTE, IO_BYTES};
use crate::error::Trap;

/// How a physical input device maps to the logical input level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InputKind {
    /// Toggle switch: each press flips the level and it stays there.
    #[default]
    Switch,
    /// Push button, normally open: true only while pressed.
    NormallyOpen,
    /// Push button, normally closed: false only while pressed.
    NormallyClosed,
}

impl InputKind {
    /// Returns the level after the device is pressed.
    pub fn press(self, current: bool) -> bool {
        match self {
            InputKind::Switch => !current,
            InputKind::NormallyOpen => true,
            InputKind::NormallyClosed => false,
        }
    }

    /// Returns the level after the device is released.
    pub fn release(self, current: bool) -> bool {
        match self {
            InputKind::Switch => current,
            InputKind::NormallyOpen => false,
            InputKind::NormallyClosed => true,
        }
    }
}

/// Bit storage for one process image (all inputs or all outputs).
///
/// Every address in the image exists for the lifetime of the engine, all
/// initialized to false.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessImage {
    prefix: char,
    bits: Vec<bool>,
}

impl ProcessImage {
    fn new(prefix: char) -> Self {
        ProcessImage {
            prefix,
            bits: vec![false; IO_BYTES as usize * BITS_PER_BYTE as usize],
        }
    }

    /// Creates the input image (`I0.0` onwards).
    pub fn inputs() -> Self {
        Self::new('I')
    }

    /// Creates the output image (`Q0.0` onwards).
    pub fn outputs() -> Self {
        Self::new('Q')
    }

    fn index(&self, byte: u8, bit: u8) -> Result<usize, Trap> {
        if byte < IO_BYTES && bit < BITS_PER_BYTE {
            Ok(byte as usize * BITS_PER_BYTE as usize + bit as usize)
        } else {
            Err(Trap::MalformedVariable(format!(
                "{}{}.{}",
                self.prefix, byte, bit
            )))
        }
    }

    /// Loads the bit at the given byte and bit.
    pub fn load(&self, byte: u8, bit: u8) -> Result<bool, Trap> {
        let index = self.index(byte, bit)?;
        Ok(self.bits[index])
    }

    /// Stores the bit at the given byte and bit.
    pub fn store(&mut self, byte: u8, bit: u8, value: bool) -> Result<(), Trap> {
        let index = self.index(byte, bit)?;
        self.bits[index] = value;
        Ok(())
    }

    /// Sets every bit to false.
    pub fn clear(&mut self) {
        self.bits.iter_mut().for_each(|b| *b = false);
    }

    /// Iterates over `(name, value)` pairs in address order.
    pub fn iter(&self) -> impl Iterator<Item = (String, bool)> + '_ {
        self.bits.iter().enumerate().map(move |(i, value)| {
            let byte = i / BITS_PER_BYTE as usize;
            let bit = i % BITS_PER_BYTE as usize;
            (format!("{}{}.{}", self.prefix, byte, bit), *value)
        })
    }
}
