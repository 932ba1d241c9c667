use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

use mfs::client::{ClientError, MfsClient};
use mfs::dir;
use mfs::disk::FileKind;
use mfs::{BSIZE, NDIRECT};

/// Poke a running file server.
#[derive(Parser)]
struct Cli {
    /// Server host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Server port
    #[arg(long, short, default_value_t = 3000)]
    port: u16,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    File,
    Dir,
}

#[derive(Subcommand)]
enum Cmd {
    /// Resolve a name under a directory inode
    Lookup { pinum: u32, name: String },
    /// Print an inode's kind and size
    Stat { inum: u32 },
    /// Copy one block of a file to stdout
    Read { inum: u32, block: usize },
    /// Write one block of a file from a local file, zero-padded
    Write {
        inum: u32,
        block: usize,
        file: PathBuf,
    },
    /// Create a file or directory
    Creat {
        pinum: u32,
        name: String,
        #[arg(long, value_enum, default_value = "file")]
        kind: KindArg,
    },
    /// Remove a name (directories must be empty)
    Unlink { pinum: u32, name: String },
    /// List the live entries of a directory
    Ls { inum: u32 },
    /// Flush the image and stop the server
    Shutdown,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(err) = run(&cli) {
        eprintln!("error: {err}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let client = MfsClient::init(&cli.host, cli.port)?;
    match &cli.cmd {
        Cmd::Lookup { pinum, name } => {
            println!("{}", client.lookup(*pinum, name)?);
        }
        Cmd::Stat { inum } => {
            let st = client.stat(*inum)?;
            let kind = match st.kind {
                FileKind::Regular => "file",
                FileKind::Directory => "directory",
                FileKind::Unused => "unused",
            };
            println!("{kind} {} bytes", st.size);
        }
        Cmd::Read { inum, block } => {
            let data = client.read(*inum, *block)?;
            io::stdout().write_all(&data)?;
        }
        Cmd::Write { inum, block, file } => {
            let bytes = fs::read(file)?;
            if bytes.len() > BSIZE {
                return Err(format!("{} exceeds one block ({BSIZE} bytes)", file.display()).into());
            }
            let mut data = [0u8; BSIZE];
            data[..bytes.len()].copy_from_slice(&bytes);
            client.write(*inum, *block, &data)?;
        }
        Cmd::Creat { pinum, name, kind } => {
            let kind = match kind {
                KindArg::File => FileKind::Regular,
                KindArg::Dir => FileKind::Directory,
            };
            println!("{}", client.create(*pinum, kind, name)?);
        }
        Cmd::Unlink { pinum, name } => {
            client.unlink(*pinum, name)?;
        }
        Cmd::Ls { inum } => {
            let st = client.stat(*inum)?;
            if st.kind != FileKind::Directory {
                return Err("not a directory".into());
            }
            // directory blocks fill in address order, so stop at the first
            // unassigned slot
            for block in 0..=NDIRECT {
                let data = match client.read(*inum, block) {
                    Ok(data) => data,
                    Err(ClientError::Server(_)) => break,
                    Err(err) => return Err(err.into()),
                };
                for slot in 0..dir::DENTS_PER_BLOCK {
                    let ent = dir::entry_at(&data, slot);
                    if let Some(child) = ent.inum {
                        println!("{:>6}  {}", child, ent.name_str());
                    }
                }
            }
        }
        Cmd::Shutdown => client.shutdown()?,
    }
    Ok(())
}
