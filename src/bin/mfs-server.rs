use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use mfs::block_device::FileDisk;
use mfs::fs::MfsStore;
use mfs::server::Server;
use mfs::udp::UdpTransport;
use mfs::FSSIZE;

/// Serve a file-system image over UDP.
#[derive(Parser)]
struct Cli {
    /// Listening port
    port: u16,

    /// File-system image; created and formatted when missing
    image: PathBuf,
}

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let store = if cli.image.exists() {
        let disk = Arc::new(FileDisk::open(&cli.image)?);
        MfsStore::open(disk).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?
    } else {
        let disk = Arc::new(FileDisk::create(&cli.image, FSSIZE)?);
        MfsStore::format(disk)
    };

    let transport = UdpTransport::open(cli.port)?;
    Server::new(store, transport).run()
}
