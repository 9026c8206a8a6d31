use crate::elf::{EF_ARM_DEFAULT, EM_ARM};

/// Load addresses and header values of a generated executable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildOptions {
    pub text_base: u32,
    pub data_base: u32,
    pub segment_align: u32,
    pub data_alignment: usize,
    pub machine: u16,
    pub flags: u32,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            text_base: 0x10000,
            data_base: 0x20000,
            segment_align: 0x10000,
            data_alignment: 4,
            machine: EM_ARM,
            flags: EF_ARM_DEFAULT,
        }
    }
}
