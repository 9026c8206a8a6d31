pub mod primitive;

pub mod deferred;
pub mod record;
pub mod sequence;

pub mod data_section;
pub mod layout;
pub mod string_table;

pub mod elf;
pub mod elf_builder;
pub mod reader;

pub mod arm;
pub mod assembler;
pub mod program;

pub mod config;
pub mod error;
