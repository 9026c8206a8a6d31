use anyhow::{Context, Result};
use clap::{Parser as ClapParser, Subcommand};
use rasm::config::BuildOptions;
use rasm::elf_builder::ElfBuilder;
use rasm::program::hello_world;
use rasm::reader::ElfReader;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::PathBuf;

fn parse_address(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid address `{}`: {}", s, e))
}

#[derive(ClapParser, Debug)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Assemble the built-in hello world program into an ARM executable.
    Build {
        output: PathBuf,

        #[arg(long, value_parser = parse_address)]
        text_base: Option<u32>,

        #[arg(long, value_parser = parse_address)]
        data_base: Option<u32>,

        #[arg(short, long, default_value_t = false)]
        verbose: bool,
    },

    /// Print a summary of an ELF32 image.
    Inspect { input: PathBuf },
}

fn build(output: PathBuf, options: BuildOptions, verbose: bool) -> Result<()> {
    let builder = ElfBuilder::new(options)?;
    let text = hello_world(builder.data())?;

    if verbose {
        for line in text.listing() {
            println!("    {}", line);
        }
    }

    builder.set_text(text)?;
    let image = builder.generate()?;

    if verbose {
        for part in builder.layout().describe()? {
            match part.size {
                Some(size) => println!("{:>16} {:#08x} {:#06x}", part.name, part.offset, size),
                None => println!("{:>16} {:#08x} ?", part.name, part.offset),
            }
        }
    }

    fs::write(&output, &image)
        .with_context(|| format!("could not write {}", output.display()))?;

    println!("Wrote {} bytes to {}", image.len(), output.display());

    Ok(())
}

fn inspect(input: PathBuf) -> Result<()> {
    let file = File::open(&input).with_context(|| format!("could not open {}", input.display()))?;
    let reader = ElfReader::parse(&mut BufReader::new(file))?;

    let summary = reader.summary()?;
    let pretty = ron::ser::PrettyConfig::new().struct_names(true);
    println!("{}", ron::ser::to_string_pretty(&summary, pretty)?);

    Ok(())
}

fn main() -> Result<()> {
    let Args { command } = Args::parse();

    match command {
        Command::Build {
            output,
            text_base,
            data_base,
            verbose,
        } => {
            let defaults = BuildOptions::default();
            let options = BuildOptions {
                text_base: text_base.unwrap_or(defaults.text_base),
                data_base: data_base.unwrap_or(defaults.data_base),
                ..defaults
            };
            build(output, options, verbose)
        }
        Command::Inspect { input } => inspect(input),
    }
}
