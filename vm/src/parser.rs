//! Parser for Instruction List program text.
//!
//! The grammar is line oriented: one `OPERATOR operand[,operand]*` per line,
//! with `//` starting a comment. Operands may be separated by commas or by
//! whitespace, so `TON T0,50` and `TON T0 50` are the same instruction.
use std::fmt;

use log::trace;
use phf::{phf_map, Map};

use crate::error::ParseError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    Ld,
    Ldn,
    St,
    Stn,
    And,
    Andn,
    Or,
    Orn,
    Not,
    Set,
    Reset,
    Ton,
    Toff,
    Ctu,
    Ctd,
    Ctr,
    Ctl,
    Rst,
}

/// The instruction vocabulary keyed by upper-case mnemonic. `OUT`, `S` and
/// `R` are aliases.
static OPCODES: Map<&'static str, Opcode> = phf_map! {
    "LD" => Opcode::Ld,
    "LDN" => Opcode::Ldn,
    "ST" => Opcode::St,
    "OUT" => Opcode::St,
    "STN" => Opcode::Stn,
    "AND" => Opcode::And,
    "ANDN" => Opcode::Andn,
    "OR" => Opcode::Or,
    "ORN" => Opcode::Orn,
    "NOT" => Opcode::Not,
    "SET" => Opcode::Set,
    "S" => Opcode::Set,
    "RESET" => Opcode::Reset,
    "R" => Opcode::Reset,
    "TON" => Opcode::Ton,
    "TOFF" => Opcode::Toff,
    "CTU" => Opcode::Ctu,
    "CTD" => Opcode::Ctd,
    "CTR" => Opcode::Ctr,
    "CTL" => Opcode::Ctl,
    "RST" => Opcode::Rst,
};

impl Opcode {
    /// Looks up an operator. The lookup is case-insensitive.
    pub fn from_mnemonic(text: &str) -> Option<Opcode> {
        OPCODES.get(text.to_ascii_uppercase().as_str()).copied()
    }

    /// Returns the canonical mnemonic for this opcode.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::Ld => "LD",
            Opcode::Ldn => "LDN",
            Opcode::St => "ST",
            Opcode::Stn => "STN",
            Opcode::And => "AND",
            Opcode::Andn => "ANDN",
            Opcode::Or => "OR",
            Opcode::Orn => "ORN",
            Opcode::Not => "NOT",
            Opcode::Set => "SET",
            Opcode::Reset => "RESET",
            Opcode::Ton => "TON",
            Opcode::Toff => "TOFF",
            Opcode::Ctu => "CTU",
            Opcode::Ctd => "CTD",
            Opcode::Ctr => "CTR",
            Opcode::Ctl => "CTL",
            Opcode::Rst => "RST",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// One parsed line of the program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    /// Source line (1-indexed)
    pub line: usize,
    pub opcode: Opcode,
    pub operands: Vec<String>,
    /// The line as written, without any trailing comment.
    pub raw: String,
}

impl Instruction {
    /// Returns the operand at `index` if present.
    pub fn operand(&self, index: usize) -> Option<&str> {
        self.operands.get(index).map(String::as_str)
    }
}

/// An ordered instruction list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Program {
    instructions: Vec<Instruction>,
}

impl Program {
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

/// Removes a trailing `//` comment.
fn strip_comment(line: &str) -> &str {
    match line.find("//") {
        Some(pos) => &line[..pos],
        None => line,
    }
}

fn split_operands(rest: &str) -> Vec<String> {
    if rest.contains(',') {
        // Empty fields are kept so a missing operand surfaces when it is used.
        rest.split(',').map(|s| s.trim().to_string()).collect()
    } else {
        rest.split_whitespace().map(String::from).collect()
    }
}

/// Parses the text of one line. Returns `Ok(None)` for blank and comment lines.
fn parse_line(text: &str, line: usize) -> Result<Option<Instruction>, ParseError> {
    let content = strip_comment(text).trim();
    if content.is_empty() {
        return Ok(None);
    }

    let collapsed = content.split_whitespace().collect::<Vec<_>>().join(" ");
    let (token, rest) = match collapsed.split_once(' ') {
        Some((token, rest)) => (token, rest),
        None => (collapsed.as_str(), ""),
    };

    let opcode = Opcode::from_mnemonic(token).ok_or_else(|| ParseError {
        line,
        token: token.to_ascii_uppercase(),
    })?;

    Ok(Some(Instruction {
        line,
        opcode,
        operands: split_operands(rest),
        raw: content.to_string(),
    }))
}

/// Parses program text into an instruction list.
///
/// An unknown operator anywhere in the text fails the whole parse; no
/// partial program is returned.
pub fn parse(text: &str) -> Result<Program, ParseError> {
    let mut instructions = Vec::new();

    for (index, text) in text.lines().enumerate() {
        if let Some(instruction) = parse_line(text, index + 1)? {
            instructions.push(instruction);
        }
    }

    trace!("Parsed {} instructions", instructions.len());

    Ok(Program { instructions })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_when_comma_and_space_operands_then_same_instruction() {
        let comma = parse("TON T0,50").unwrap();
        let space = parse("TON T0 50").unwrap();
        let spaced_comma = parse("TON   T0 , 50").unwrap();

        assert_eq!(comma.instructions()[0].operands, vec!["T0", "50"]);
        assert_eq!(space.instructions()[0].operands, vec!["T0", "50"]);
        assert_eq!(spaced_comma.instructions()[0].operands, vec!["T0", "50"]);
    }

    #[test]
    fn parse_when_lower_case_operator_then_normalized() {
        let program = parse("ld I0.0").unwrap();

        assert_eq!(program.instructions()[0].opcode, Opcode::Ld);
    }

    #[test]
    fn parse_when_blank_and_comment_lines_then_dropped_with_line_numbers_kept() {
        let program = parse("// header\n\nLD I0.0\n   \nST Q0.0 // drive lamp\n").unwrap();

        assert_eq!(program.len(), 2);
        assert_eq!(program.instructions()[0].line, 3);
        assert_eq!(program.instructions()[1].line, 5);
        assert_eq!(program.instructions()[1].raw, "ST Q0.0");
        assert_eq!(program.instructions()[1].operands, vec!["Q0.0"]);
    }

    #[test]
    fn parse_when_aliases_then_map_to_canonical_opcodes() {
        let program = parse("OUT Q0.0\nS M0\nR M0").unwrap();
        let opcodes: Vec<Opcode> = program.instructions().iter().map(|i| i.opcode).collect();

        assert_eq!(opcodes, vec![Opcode::St, Opcode::Set, Opcode::Reset]);
    }

    #[test]
    fn parse_when_empty_comma_field_then_kept_as_empty_operand() {
        let program = parse("TON T0,,50\nLD I0.0,").unwrap();

        assert_eq!(program.instructions()[0].operands, vec!["T0", "", "50"]);
        assert_eq!(program.instructions()[0].operand(1), Some(""));
        assert_eq!(program.instructions()[1].operands, vec!["I0.0", ""]);
    }

    #[test]
    fn parse_when_no_operands_then_empty_operand_list() {
        let program = parse("NOT").unwrap();

        assert!(program.instructions()[0].operands.is_empty());
        assert_eq!(program.instructions()[0].operand(0), None);
    }

    #[test]
    fn parse_when_unknown_operator_then_error_with_line() {
        let result = parse("LD I0.0\nST Q0.0\nfoobar X");

        assert_eq!(
            result,
            Err(ParseError {
                line: 3,
                token: "FOOBAR".to_string()
            })
        );
    }

    #[test]
    fn parse_when_windows_line_endings_then_parsed() {
        let program = parse("LD I0.0\r\nST Q0.0\r\n").unwrap();

        assert_eq!(program.len(), 2);
        assert_eq!(program.instructions()[1].operands, vec!["Q0.0"]);
    }

    #[test]
    fn parse_when_empty_text_then_empty_program() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("// only a comment").unwrap().is_empty());
    }
}
