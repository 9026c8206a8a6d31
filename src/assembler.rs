use crate::deferred::Deferred;
use crate::error::{Error, Result};
use crate::layout::{Sizable, Writable};
use std::fmt;
use std::io::Write;

pub const INSTRUCTION_SIZE: usize = 4;

#[derive(Clone, Debug)]
pub enum Operand {
    Register(u8),
    Immediate(Deferred),
}

impl Operand {
    pub fn imm(value: impl Into<Deferred>) -> Operand {
        Operand::Immediate(value.into())
    }

    pub fn register(&self) -> Result<u8> {
        match self {
            Operand::Register(r) => Ok(*r),
            Operand::Immediate(_) => Err(Error::codec("expected a register operand")),
        }
    }

    /// Forces an immediate operand.
    pub fn immediate(&self) -> Result<i128> {
        match self {
            Operand::Immediate(value) => value.force_int(),
            Operand::Register(r) => Err(Error::codec(format!(
                "expected an immediate operand, found r{}",
                r
            ))),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Register(r) => write!(f, "r{}", r),
            Operand::Immediate(Deferred::Concrete(value)) => write!(f, "#{}", value),
            Operand::Immediate(Deferred::Pending(_)) => write!(f, "#?"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Instruction {
    pub mnemonic: String,
    pub operands: Vec<Operand>,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic)?;
        for (i, operand) in self.operands.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{}{}", sep, operand)?;
        }
        Ok(())
    }
}

/// Turns a mnemonic and its operands into one instruction word.
pub trait Encoder {
    fn encode(&self, mnemonic: &str, operands: &[Operand]) -> Result<u32>;
}

/// A list of instructions encoded when written. Operands may be deferred
/// values; they are only forced by `write_to`.
pub struct Assembler {
    encoder: Box<dyn Encoder>,
    instructions: Vec<Instruction>,
}

impl Assembler {
    pub fn new(encoder: impl Encoder + 'static) -> Assembler {
        Assembler {
            encoder: Box::new(encoder),
            instructions: Vec::new(),
        }
    }

    pub fn push(&mut self, mnemonic: &str, operands: Vec<Operand>) -> &mut Self {
        self.instructions.push(Instruction {
            mnemonic: mnemonic.to_string(),
            operands,
        });
        self
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn encode(&self) -> Result<Vec<u32>> {
        self.instructions
            .iter()
            .map(|i| self.encoder.encode(&i.mnemonic, &i.operands))
            .collect()
    }

    pub fn listing(&self) -> Vec<String> {
        self.instructions.iter().map(|i| i.to_string()).collect()
    }
}

impl Sizable for Assembler {
    fn size(&self) -> Result<usize> {
        Ok(self.instructions.len() * INSTRUCTION_SIZE)
    }
}

impl Writable for Assembler {
    fn write_to(&self, out: &mut dyn Write) -> Result<()> {
        for word in self.encode()? {
            out.write_all(&word.to_le_bytes())?;
        }
        Ok(())
    }

    fn as_sizable(&self) -> Option<&dyn Sizable> {
        Some(self)
    }
}
