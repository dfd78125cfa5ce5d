//! Variable addressing. The kind of every identifier is decided by its
//! lexical form alone: `I{byte}.{bit}`, `Q{byte}.{bit}`, `M{n}`, `T{n}`
//! and `C{n}`.
use std::fmt;
use std::str::FromStr;

use crate::error::Trap;

/// Number of addressable bytes in each of the input and output images.
pub const IO_BYTES: u8 = 2;

/// Number of bits in one image byte.
pub const BITS_PER_BYTE: u8 = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Address {
    Input { byte: u8, bit: u8 },
    Output { byte: u8, bit: u8 },
    Memory(u32),
    Timer(u32),
    Counter(u32),
}

impl Address {
    /// Returns true for addresses that live in the lazily created memory map.
    pub fn is_memory_map(&self) -> bool {
        matches!(
            self,
            Address::Memory(_) | Address::Timer(_) | Address::Counter(_)
        )
    }
}

fn parse_bit_address(rest: &str) -> Option<(u8, u8)> {
    let (byte, bit) = rest.split_once('.')?;
    let byte = parse_digits(byte)?;
    let bit = parse_digits(bit)?;
    if byte < IO_BYTES as u32 && bit < BITS_PER_BYTE as u32 {
        Some((byte as u8, bit as u8))
    } else {
        None
    }
}

/// Parses a non-empty run of ASCII digits. Signs are not allowed.
fn parse_digits(text: &str) -> Option<u32> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

impl FromStr for Address {
    type Err = Trap;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || Trap::MalformedVariable(s.to_string());

        let upper = s.trim().to_ascii_uppercase();
        let mut chars = upper.chars();
        let prefix = chars.next().ok_or_else(malformed)?;
        let rest = chars.as_str();

        match prefix {
            'I' => parse_bit_address(rest)
                .map(|(byte, bit)| Address::Input { byte, bit })
                .ok_or_else(malformed),
            'Q' => parse_bit_address(rest)
                .map(|(byte, bit)| Address::Output { byte, bit })
                .ok_or_else(malformed),
            'M' => parse_digits(rest).map(Address::Memory).ok_or_else(malformed),
            'T' => parse_digits(rest).map(Address::Timer).ok_or_else(malformed),
            'C' => parse_digits(rest).map(Address::Counter).ok_or_else(malformed),
            _ => Err(malformed()),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Input { byte, bit } => write!(f, "I{byte}.{bit}"),
            Address::Output { byte, bit } => write!(f, "Q{byte}.{bit}"),
            Address::Memory(n) => write!(f, "M{n}"),
            Address::Timer(n) => write!(f, "T{n}"),
            Address::Counter(n) => write!(f, "C{n}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_str_when_input_then_byte_and_bit() {
        assert_eq!(
            "I1.7".parse::<Address>(),
            Ok(Address::Input { byte: 1, bit: 7 })
        );
    }

    #[test]
    fn from_str_when_lower_case_then_same_address() {
        assert_eq!("q0.3".parse::<Address>(), "Q0.3".parse::<Address>());
        assert_eq!("t12".parse::<Address>(), Ok(Address::Timer(12)));
    }

    #[test]
    fn from_str_when_byte_out_of_range_then_malformed() {
        assert_eq!(
            "I2.0".parse::<Address>(),
            Err(Trap::MalformedVariable("I2.0".to_string()))
        );
    }

    #[test]
    fn from_str_when_bit_out_of_range_then_malformed() {
        assert!("Q0.8".parse::<Address>().is_err());
    }

    #[test]
    fn from_str_when_missing_number_then_malformed() {
        assert!("M".parse::<Address>().is_err());
        assert!("C-1".parse::<Address>().is_err());
        assert!("I0".parse::<Address>().is_err());
    }

    #[test]
    fn from_str_when_unknown_prefix_then_malformed() {
        assert!("X0".parse::<Address>().is_err());
        assert!("".parse::<Address>().is_err());
    }

    #[test]
    fn display_when_round_tripped_then_canonical() {
        let addr: Address = "c05".parse().unwrap();
        assert_eq!(addr.to_string(), "C5");
    }

    #[test]
    fn is_memory_map_when_bit_image_then_false() {
        assert!(!Address::Output { byte: 0, bit: 0 }.is_memory_map());
        assert!(Address::Memory(0).is_memory_map());
    }
}
