
use std::fs::File;
use std::io;
use std::io::{Read, Write};
use std::io::{Seek, SeekFrom};
use std::sync::Mutex;

use sector_fs::BlockDevice;
use sector_fs::SECTOR_SIZE;
use sector_fs::SectorId;
use sector_fs::layout::{DiskInode, InodeKind};

/// 以宿主机上的文件充当块设备
#[derive(Debug)]
pub struct BlockFile {
    file: Mutex<File>,
    blocks: usize,
}

impl BlockFile {
    pub fn new(file: File) -> io::Result<Self> {
        let blocks = (file.metadata()?.len() / SECTOR_SIZE as u64) as usize;

        Ok(Self {
            file: Mutex::new(file),
            blocks,
        })
    }
}

impl BlockDevice for BlockFile {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start((block_id * SECTOR_SIZE) as u64))
            .expect("seeking error");
        file.read_exact(buf).expect("not a complete block!");
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start((block_id * SECTOR_SIZE) as u64))
            .expect("seeking error");
        file.write_all(buf).expect("not a complete block!");
    }

    fn num_blocks(&self) -> usize {
        self.blocks
    }
}

/// 读出 `sector` 上的 inode 记录并确认类型标记，不是 inode 就报错
pub fn inode_kind_at(dev: &dyn BlockDevice, sector: SectorId) -> io::Result<InodeKind> {
    if sector.is_null() || sector.raw() >= dev.num_blocks() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("inode sector {sector} outside the image"),
        ));
    }

    let mut buf = [0u8; SECTOR_SIZE];
    dev.read_block(sector.raw(), &mut buf);
    let disk = DiskInode::decode(&buf);

    InodeKind::from_magic(disk.magic).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("no inode at sector {sector}: magic {:#x}", disk.magic),
        )
    })
}
