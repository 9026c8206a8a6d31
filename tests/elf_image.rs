use insta::assert_snapshot;
use rasm::config::BuildOptions;
use rasm::elf::{EM_ARM, ET_EXEC};
use rasm::elf_builder::{ElfBuilder, SECTIONS};
use rasm::program::{hello_world, MESSAGES};
use rasm::reader::{ElfReader, SegmentSummary};
use std::io::Cursor;

fn hello_world_image() -> (ElfBuilder, Vec<u8>) {
    let builder = ElfBuilder::new(BuildOptions::default()).unwrap();
    let text = hello_world(builder.data()).unwrap();
    builder.set_text(text).unwrap();
    let image = builder.generate().unwrap();
    (builder, image)
}

fn word(bytes: &[u8], i: usize) -> u32 {
    u32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap())
}

#[test]
fn hello_world_layout() {
    let (builder, image) = hello_world_image();

    let table = builder
        .layout()
        .describe()
        .unwrap()
        .iter()
        .map(|p| format!("{} {:#x} {:?}", p.name, p.offset, p.size))
        .collect::<Vec<_>>()
        .join("\n");

    assert_snapshot!(table, @r###"
    header 0x0 Some(52)
    program_headers 0x34 Some(64)
    .text 0x74 Some(60)
    .data 0xb0 Some(88)
    section_headers 0x108 Some(160)
    .shstrtab 0x1a8 Some(24)
    "###);

    assert_eq!(image.len(), 0x1a8 + 24);
}

#[test]
fn header_counts_and_indexes() {
    let (builder, _) = hello_world_image();
    let header = builder.header();

    assert_eq!(header.get_int("e_phnum").unwrap(), 2);
    assert_eq!(header.get_int("e_shnum").unwrap(), 4);
    assert_eq!(header.get_int("e_shstrndx").unwrap(), 3);
    assert_eq!(header.get_int("e_entry").unwrap(), 0x10074);
    assert_eq!(header.get_int("e_ehsize").unwrap(), 52);
    assert_eq!(header.get_int("e_phentsize").unwrap(), 32);
    assert_eq!(header.get_int("e_shentsize").unwrap(), 40);
}

#[test]
fn reparsing_reproduces_the_image() {
    let (_, image) = hello_world_image();
    let reader = ElfReader::parse(&mut Cursor::new(image)).unwrap();

    let header = reader.header();
    assert_eq!(header.get_int("e_type").unwrap(), ET_EXEC as i128);
    assert_eq!(header.get_int("e_machine").unwrap(), EM_ARM as i128);
    assert_eq!(header.get_int("e_phnum").unwrap(), 2);
    assert_eq!(header.get_int("e_shnum").unwrap(), 4);

    let names: Vec<&str> = reader.sections().iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, SECTIONS[1..]);

    let sizes: Vec<i128> = reader
        .sections()
        .iter()
        .map(|s| s.header.get_int("sh_size").unwrap())
        .collect();
    assert_eq!(sizes, vec![88, 60, 24]);

    let data = reader.section(".data").unwrap().data.bytes().unwrap();
    let (miaou, hello) = (MESSAGES[0].1.as_bytes(), MESSAGES[1].1.as_bytes());
    assert_eq!(&data[..miaou.len()], miaou);
    assert_eq!(&data[44..44 + hello.len()], hello);

    let summary = reader.summary().unwrap();
    assert_eq!(
        summary.segments,
        vec![
            SegmentSummary {
                p_type: 1,
                offset: 0,
                vaddr: 0x10000,
                filesz: 176,
                flags: 5,
            },
            SegmentSummary {
                p_type: 1,
                offset: 176,
                vaddr: 0x200b0,
                filesz: 88,
                flags: 6,
            },
        ]
    );
}

#[test]
fn truncated_tables_keep_the_entries_that_fit() {
    let (_, mut image) = hello_world_image();
    image.truncate(0x108 + 50);
    let reader = ElfReader::parse(&mut Cursor::new(image)).unwrap();

    assert_eq!(reader.header().get_int("e_shnum").unwrap(), 4);
    assert_eq!(reader.program_headers().len(), 2);
    assert_eq!(reader.section_headers().len(), 1);
    assert!(reader.sections().is_empty());
}

#[test]
fn instructions_load_data_addresses() {
    let (_, image) = hello_world_image();
    let reader = ElfReader::parse(&mut Cursor::new(image)).unwrap();
    let text = reader.section(".text").unwrap().data.bytes().unwrap();

    // hello_world is written first, at 0x200b0 + 44
    assert_eq!(word(text, 0), 0xe3a0_0001);
    assert_eq!(word(text, 1), 0xe300_10dc);
    assert_eq!(word(text, 2), 0xe340_1002);
    assert_eq!(word(text, 3), 0xe3a0_202a);
    assert_eq!(word(text, 4), 0xe3a0_7004);
    assert_eq!(word(text, 5), 0xef00_0000);
    assert_eq!(word(text, 7), 0xe300_10b0);
    assert_eq!(word(text, 12), 0xe3a0_0000);
    assert_eq!(word(text, 13), 0xe3a0_7001);
}

#[test]
fn load_addresses_follow_the_options() {
    let options = BuildOptions {
        text_base: 0x8000,
        data_base: 0x40000,
        ..BuildOptions::default()
    };
    let builder = ElfBuilder::new(options).unwrap();
    let text = hello_world(builder.data()).unwrap();
    builder.set_text(text).unwrap();
    builder.generate().unwrap();

    assert_eq!(builder.header().get_int("e_entry").unwrap(), 0x8074);
    let miaou = builder.data().address_of("miaou").unwrap();
    assert_eq!(miaou.force_int().unwrap(), 0x400b0);
}
