//! A32 encodings for the handful of instructions the built-in programs use.

use crate::assembler::{Encoder, Operand};
use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum Condition {
    Eq = 0,
    Ne,
    Cs,
    Cc,
    Mi,
    Pl,
    Vs,
    Vc,
    Hi,
    Ls,
    Ge,
    Lt,
    Gt,
    Le,
    Al,
}

#[rustfmt::skip]
const CONDITION_SUFFIXES: [(&str, Condition); 15] = [
    ("eq", Condition::Eq), ("ne", Condition::Ne), ("cs", Condition::Cs),
    ("cc", Condition::Cc), ("mi", Condition::Mi), ("pl", Condition::Pl),
    ("vs", Condition::Vs), ("vc", Condition::Vc), ("hi", Condition::Hi),
    ("ls", Condition::Ls), ("ge", Condition::Ge), ("lt", Condition::Lt),
    ("gt", Condition::Gt), ("le", Condition::Le), ("al", Condition::Al),
];

const MNEMONICS: [&str; 4] = ["mov", "movw", "movt", "svc"];

/// Splits `moveq` into `mov` and `Eq`. Bare mnemonics always execute.
fn split_condition(mnemonic: &str) -> Option<(&str, Condition)> {
    if MNEMONICS.contains(&mnemonic) {
        return Some((mnemonic, Condition::Al));
    }

    CONDITION_SUFFIXES.iter().find_map(|(suffix, cond)| {
        let base = mnemonic.strip_suffix(suffix)?;
        MNEMONICS.contains(&base).then_some((base, *cond))
    })
}

fn register(operands: &[Operand], i: usize) -> Result<u32> {
    let op = operands
        .get(i)
        .ok_or_else(|| Error::codec(format!("missing operand {}", i + 1)))?;
    let r = op.register()?;
    if r > 15 {
        return Err(Error::codec(format!("no register r{}", r)));
    }
    Ok(r as u32)
}

fn immediate(operands: &[Operand], i: usize, bits: u32) -> Result<u32> {
    let value = match operands.get(i) {
        Some(op) => op.immediate()?,
        None => return Err(Error::codec(format!("missing operand {}", i + 1))),
    };

    if value < 0 || value >= 1 << bits {
        return Err(Error::codec(format!(
            "immediate {:#x} does not fit in {} bits",
            value, bits
        )));
    }
    Ok(value as u32)
}

fn arity(mnemonic: &str, operands: &[Operand], expected: usize) -> Result<()> {
    if operands.len() != expected {
        return Err(Error::codec(format!(
            "`{}` takes {} operand(s), got {}",
            mnemonic,
            expected,
            operands.len()
        )));
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ArmEncoder;

impl ArmEncoder {
    pub fn new() -> ArmEncoder {
        ArmEncoder
    }
}

impl Encoder for ArmEncoder {
    fn encode(&self, mnemonic: &str, operands: &[Operand]) -> Result<u32> {
        let Some((base, condition)) = split_condition(mnemonic) else {
            return Err(Error::codec(format!("unknown mnemonic `{}`", mnemonic)));
        };
        let cond = (condition as u32) << 28;

        match base {
            "mov" => {
                arity(base, operands, 2)?;
                let rd = register(operands, 0)?;
                let value = immediate(operands, 1, 32)?;
                let rotation = (0..16u32)
                    .find(|r| value.rotate_left(2 * r) <= 0xff)
                    .ok_or_else(|| {
                        Error::codec(format!("immediate {:#x} is not a rotated 8-bit value", value))
                    })?;
                let imm8 = value.rotate_left(2 * rotation);
                Ok(cond | 0x03a0_0000 | rd << 12 | rotation << 8 | imm8)
            }
            "movw" | "movt" => {
                arity(base, operands, 2)?;
                let opcode = if base == "movw" { 0x30 } else { 0x34 };
                let rd = register(operands, 0)?;
                let imm16 = immediate(operands, 1, 16)?;
                let imm4 = imm16 >> 12;
                let imm12 = imm16 & 0xfff;
                Ok(cond | opcode << 20 | imm4 << 16 | rd << 12 | imm12)
            }
            "svc" => {
                let imm24 = match operands.len() {
                    0 => 0,
                    _ => immediate(operands, 0, 24)?,
                };
                Ok(cond | 0x0f00_0000 | imm24)
            }
            _ => Err(Error::codec(format!("unknown mnemonic `{}`", mnemonic))),
        }
    }
}
