mod cli;

use std::fs;
use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use cli::{Cli, Command};
use sector_fs::config::FLUSH_INTERVAL;
use sector_fs::{
    BlockDevice, FreeMap, InodeKind, SECTOR_SIZE, SectorAllocator, SectorCache, SectorFs, SectorId,
    spawn_periodic_flush,
};
use sector_fs_fuse::{BlockFile, inode_kind_at};

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Pack {
            size,
            reserved,
            files,
        } => pack(&cli.image, size, reserved, &files),
        Command::Cat { inode } => cat(&cli.image, SectorId::new(inode)),
    }
}

fn pack(image: &Path, size: usize, reserved: usize, files: &[PathBuf]) -> io::Result<()> {
    if reserved == 0 || reserved > size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "reserved sectors must be within 1..=size",
        ));
    }
    println!("image={image:?} sectors={size}");

    let block_file = Arc::new(BlockFile::new({
        let fd = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(image)?;
        fd.set_len((size * SECTOR_SIZE) as u64)?;

        fd
    })?);

    let cache = Arc::new(SectorCache::new(block_file));
    let free_map = Arc::new(FreeMap::new(size, reserved));
    let fs = SectorFs::new(cache.clone(), free_map.clone());
    let flusher = spawn_periodic_flush(cache, FLUSH_INTERVAL);

    for path in files {
        let data = fs::read(path)?;

        let sector = free_map
            .allocate(1)
            .ok_or_else(|| io::Error::other("no free sector for inode"))?;
        fs.create(sector, 0, InodeKind::File)
            .map_err(io::Error::other)?;

        let inode = fs.open(sector);
        let written = inode.write_at(0, &data);
        fs.close(inode);

        if written < data.len() {
            log::warn!("{path:?}: only {written} of {} bytes fit", data.len());
        }
        println!("file: {path:?} inode={sector} bytes={written}");
    }

    flusher.stop();
    fs.sync();
    println!("free sectors: {}", free_map.free_count());

    Ok(())
}

fn cat(image: &Path, sector: SectorId) -> io::Result<()> {
    let block_file = Arc::new(BlockFile::new(File::open(image)?)?);
    let blocks = block_file.num_blocks();
    let kind = inode_kind_at(&*block_file, sector)?;
    log::debug!("cat inode {sector}: {kind:?}");

    // 只读，不分配任何扇区
    let free_map = Arc::new(FreeMap::new(blocks, blocks));
    let fs = SectorFs::new(Arc::new(SectorCache::new(block_file)), free_map);

    let inode = fs.open(sector);
    let mut data = vec![0u8; inode.len()];
    let read = inode.read_at(0, &mut data);
    fs.close(inode);

    io::stdout().write_all(&data[..read])
}
