use crate::arm::ArmEncoder;
use crate::assembler::{Assembler, Operand};
use crate::data_section::DataSection;
use crate::error::Result;
use std::rc::Rc;

use Operand::Register;

pub const MESSAGES: [(&str, &str); 2] = [
    ("miaou", "The best cochon d'inde of the ze planet !\n"),
    ("hello_world", "It's me POUIPPOUIPOSAURUSREX ! Catch me !\n"),
];

const SYS_EXIT: i32 = 1;
const SYS_WRITE: i32 = 4;
const STDOUT: i32 = 1;

/// Writes both messages to stdout with the Linux `write` syscall, then exits
/// with status 0.
pub fn hello_world(data: &Rc<DataSection>) -> Result<Assembler> {
    for (label, text) in MESSAGES {
        data.insert(label, text);
    }

    let mut asm = Assembler::new(ArmEncoder::new());

    for (label, _) in MESSAGES.iter().rev() {
        let address = data.address_of(label)?;
        asm.push("mov", vec![Register(0), Operand::imm(STDOUT)])
            .push("movw", vec![Register(1), Operand::Immediate(address.slice(0, 16))])
            .push("movt", vec![Register(1), Operand::Immediate(address.slice(16, 32))])
            .push("mov", vec![Register(2), Operand::imm(data.packed_size(label)?)])
            .push("mov", vec![Register(7), Operand::imm(SYS_WRITE)])
            .push("svc", vec![Operand::imm(0)]);
    }

    asm.push("mov", vec![Register(0), Operand::imm(0)])
        .push("mov", vec![Register(7), Operand::imm(SYS_EXIT)])
        .push("svc", vec![Operand::imm(0)]);

    Ok(asm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Sizable;

    #[test]
    fn hello_world_fills_the_data_section() {
        let data = Rc::new(DataSection::new(4, 0x20000));
        let asm = hello_world(&data).unwrap();

        assert_eq!(data.labels(), vec!["miaou", "hello_world"]);
        assert_eq!(asm.len(), 15);
        assert_eq!(asm.size().unwrap(), 60);
        assert_eq!(asm.listing()[0], "mov r0, #1");

        let words = asm.encode().unwrap();
        // movw r1, #0x002c: "hello_world" sits after the 42 byte "miaou"
        assert_eq!(words[1], 0xe300_102c);
        assert_eq!(words[2], 0xe340_1002);
        assert_eq!(words[14], 0xef00_0000);
    }
}
