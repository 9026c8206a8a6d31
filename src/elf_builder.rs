use crate::assembler::Assembler;
use crate::config::BuildOptions;
use crate::data_section::DataSection;
use crate::deferred::Deferred;
use crate::elf::*;
use crate::error::{Error, Result};
use crate::layout::Layout;
use crate::record::RecordInstance;
use crate::sequence::RecordSequence;
use crate::string_table::{deferred_offset, StringTable};
use std::cell::RefCell;
use std::rc::Rc;

pub const PARTS: [&str; 6] = [
    "header",
    "program_headers",
    ".text",
    ".data",
    "section_headers",
    ".shstrtab",
];

pub const SECTIONS: [&str; 4] = ["", ".data", ".text", ".shstrtab"];

/// An ARM ELF32 executable with one loadable segment for `.text` (which also
/// maps the headers in front of it) and one for `.data`. Every offset,
/// address and size in the headers is a deferred value over the layout, so
/// code and data may be changed freely until `generate` is called.
pub struct ElfBuilder {
    options: BuildOptions,
    types: ElfTypes,
    layout: Rc<Layout>,
    header: Rc<RecordInstance>,
    program_headers: Rc<RefCell<RecordSequence>>,
    section_headers: Rc<RefCell<RecordSequence>>,
    names: Rc<RefCell<StringTable>>,
    data: Rc<DataSection>,
}

impl ElfBuilder {
    pub fn new(options: BuildOptions) -> Result<ElfBuilder> {
        let types = ElfTypes::new()?;
        let layout = Layout::new(0, &PARTS)?;

        let data_offset = layout.offset_of(".data")?;
        let data_vaddr = data_offset.clone() + options.data_base as i128;
        let text_offset = layout.offset_of(".text")?;
        let text_vaddr = text_offset.clone() + options.text_base as i128;

        let data = Rc::new(DataSection::new(options.data_alignment, data_vaddr.clone()));
        let names = Rc::new(RefCell::new(StringTable::new()));

        let ph = &types.program_header;
        let pt_load = ph
            .constant("PT_LOAD")
            .ok_or_else(|| Error::UnknownLabel("PT_LOAD".to_string()))?
            .value;

        let text_segment = RecordInstance::new(ph);
        text_segment.set_all([
            ("p_type", Deferred::from(pt_load)),
            ("p_offset", Deferred::from(0)),
            ("p_vaddr", Deferred::from(options.text_base)),
            ("p_paddr", Deferred::from(options.text_base)),
            ("p_filesz", layout.end_of(".text")?),
            ("p_memsz", layout.end_of(".text")?),
            ("p_flags", Deferred::from(PF_R | PF_X)),
            ("p_align", Deferred::from(options.segment_align)),
        ])?;

        let data_segment = RecordInstance::new(ph);
        data_segment.set_all([
            ("p_type", Deferred::from(pt_load)),
            ("p_offset", data_offset.clone()),
            ("p_vaddr", data_vaddr.clone()),
            ("p_paddr", data_vaddr.clone()),
            ("p_filesz", layout.deferred_size(".data")?),
            ("p_memsz", layout.deferred_size(".data")?),
            ("p_flags", Deferred::from(PF_R | PF_W)),
            ("p_align", Deferred::from(options.segment_align)),
        ])?;

        let mut program_headers = RecordSequence::new(ph);
        program_headers.insert(".text", Rc::new(text_segment))?;
        program_headers.insert(".data", Rc::new(data_segment))?;

        let sh = &types.section_header;
        let section = |fields: [(&str, Deferred); 7]| -> Result<Rc<RecordInstance>> {
            let record = RecordInstance::new(sh);
            record.set_all([
                ("sh_name", Deferred::from(0)),
                ("sh_link", Deferred::from(0)),
                ("sh_info", Deferred::from(0)),
            ])?;
            record.set_all(fields)?;
            Ok(Rc::new(record))
        };

        let mut section_headers = RecordSequence::new(sh);
        section_headers.insert(
            "",
            section([
                ("sh_type", Deferred::from(SHT_NULL)),
                ("sh_flags", Deferred::from(0)),
                ("sh_addr", Deferred::from(0)),
                ("sh_offset", Deferred::from(0)),
                ("sh_size", Deferred::from(0)),
                ("sh_addralign", Deferred::from(0)),
                ("sh_entsize", Deferred::from(0)),
            ])?,
        )?;
        section_headers.insert(
            ".data",
            section([
                ("sh_type", Deferred::from(SHT_PROGBITS)),
                ("sh_flags", Deferred::from(SHF_ALLOC | SHF_WRITE)),
                ("sh_addr", data_vaddr),
                ("sh_offset", data_offset),
                ("sh_size", layout.deferred_size(".data")?),
                ("sh_addralign", Deferred::from(options.data_alignment)),
                ("sh_entsize", Deferred::from(0)),
            ])?,
        )?;
        section_headers.insert(
            ".text",
            section([
                ("sh_type", Deferred::from(SHT_PROGBITS)),
                ("sh_flags", Deferred::from(SHF_ALLOC | SHF_EXECINSTR)),
                ("sh_addr", text_vaddr.clone()),
                ("sh_offset", text_offset),
                ("sh_size", layout.deferred_size(".text")?),
                ("sh_addralign", Deferred::from(4)),
                ("sh_entsize", Deferred::from(0)),
            ])?,
        )?;
        section_headers.insert(
            ".shstrtab",
            section([
                ("sh_type", Deferred::from(SHT_STRTAB)),
                ("sh_flags", Deferred::from(0)),
                ("sh_addr", Deferred::from(0)),
                ("sh_offset", layout.offset_of(".shstrtab")?),
                ("sh_size", layout.deferred_size(".shstrtab")?),
                ("sh_addralign", Deferred::from(1)),
                ("sh_entsize", Deferred::from(0)),
            ])?,
        )?;
        for (label, record) in section_headers.iter() {
            record.set("sh_name", deferred_offset(&names, label))?;
        }

        let header = RecordInstance::new(&types.header);
        header.set_all([
            ("e_ident", Deferred::from(ident(ELFCLASS32))),
            ("e_type", Deferred::from(ET_EXEC)),
            ("e_machine", Deferred::from(options.machine)),
            ("e_version", Deferred::from(EV_CURRENT)),
            ("e_entry", text_vaddr),
            ("e_phoff", layout.offset_of("program_headers")?),
            ("e_shoff", layout.offset_of("section_headers")?),
            ("e_flags", Deferred::from(options.flags)),
            ("e_ehsize", Deferred::from(types.header.size()?)),
            ("e_phentsize", Deferred::from(ph.size()?)),
            ("e_shentsize", Deferred::from(sh.size()?)),
        ])?;

        let header = Rc::new(header);
        let program_headers = Rc::new(RefCell::new(program_headers));
        let section_headers = Rc::new(RefCell::new(section_headers));

        layout.set_part("header", header.clone())?;
        layout.set_part("program_headers", program_headers.clone())?;
        layout.set_part(".data", data.clone())?;
        layout.set_part("section_headers", section_headers.clone())?;
        layout.set_part(".shstrtab", names.clone())?;

        Ok(ElfBuilder {
            options,
            types,
            layout,
            header,
            program_headers,
            section_headers,
            names,
            data,
        })
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn types(&self) -> &ElfTypes {
        &self.types
    }

    pub fn set_text(&self, text: Assembler) -> Result<()> {
        self.layout.set_part(".text", Rc::new(text))
    }

    pub fn data(&self) -> &Rc<DataSection> {
        &self.data
    }

    pub fn layout(&self) -> &Rc<Layout> {
        &self.layout
    }

    pub fn header(&self) -> &Rc<RecordInstance> {
        &self.header
    }

    pub fn section_header(&self, name: &str) -> Option<Rc<RecordInstance>> {
        self.section_headers.borrow().get(name).cloned()
    }

    pub fn program_header(&self, name: &str) -> Option<Rc<RecordInstance>> {
        self.program_headers.borrow().get(name).cloned()
    }

    /// Lays out and serializes the whole image.
    pub fn generate(&self) -> Result<Vec<u8>> {
        {
            let mut names = self.names.borrow_mut();
            for label in self.section_headers.borrow().labels() {
                names.add(label);
            }
        }

        let sections = self.section_headers.borrow();
        let shstrndx = sections
            .index_of(".shstrtab")
            .ok_or_else(|| Error::UnknownLabel(".shstrtab".to_string()))?;
        self.header.set_all([
            ("e_phnum", self.program_headers.borrow().len()),
            ("e_shnum", sections.len()),
            ("e_shstrndx", shstrndx),
        ])?;
        drop(sections);

        let mut image = Vec::with_capacity(self.layout.total_size()?);
        self.layout.write_to(&mut image)?;
        Ok(image)
    }
}
