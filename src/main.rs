//! blendef - inspects .blend files and generates struct dispatch code from their DNA.

use anyhow::{Context, Result};
use blendef::{
    body::code_str,
    codegen::{self, GENERATED_FILE_NAME},
    BlendFile,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "blendef", version, about = "Block body decoding for Blender's .blend files")]
struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the struct dispatch for the Blender version that saved FILE
    Gen {
        file: PathBuf,
        /// Directory the generated source is written to
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Print the layout of every struct in the DNA of FILE
    Types { file: PathBuf },
    /// List the block headers of FILE
    Blocks { file: PathBuf },
}

fn open(path: &Path) -> Result<BlendFile> {
    BlendFile::from_path(path).with_context(|| format!("could not read {}", path.display()))
}

fn cmd_gen(file: &Path, out_dir: &Path) -> Result<()> {
    let blend = open(file)?;
    let version = blend.header.version_number();
    let type_names = blend.dna.struct_type_names();

    let path = codegen::write_dispatch(out_dir, &type_names, version)
        .with_context(|| format!("could not write {}", out_dir.join(GENERATED_FILE_NAME).display()))?;

    println!(
        "{}: {} struct types for Blender v{}",
        path.display(),
        type_names.len(),
        version
    );
    Ok(())
}

fn cmd_types(file: &Path) -> Result<()> {
    let blend = open(file)?;

    for index in 0..blend.dna.structs.len() {
        let entry = blend
            .dna
            .schema_entry(index, blend.header.pointer_size)
            .with_context(|| format!("invalid layout for struct {}", index))?;

        println!("(i:{}) {} ({} bytes) {{", index, entry.type_name, entry.size);
        for (name, field) in &entry.fields {
            println!(
                "\t{} {} ({} bytes @ {}) {:?};",
                field.type_name, name, field.size, field.offset, field.kind
            );
        }
        println!("}}\n");
    }

    Ok(())
}

fn cmd_blocks(file: &Path) -> Result<()> {
    let blend = open(file)?;
    info!(blocks = blend.blocks.len(), "scanned file");

    for block in &blend.blocks {
        let header = &block.header;
        let type_name = match header.sdna_index {
            0 => "-",
            index => blend.dna.type_name(index).unwrap_or("?"),
        };
        println!(
            "{:<4} {:>10} bytes  @{:#x}  {} x{}",
            code_str(&header.code),
            header.size,
            header.old_memory_address,
            type_name,
            header.count
        );
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Gen { file, out_dir } => cmd_gen(&file, &out_dir),
        Commands::Types { file } => cmd_types(&file),
        Commands::Blocks { file } => cmd_blocks(&file),
    }
}
