#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;

use sector_fs::{BlockDevice, FreeMap, SECTOR_SIZE, SectorCache, SectorFs, SectorId};

/// 内存盘，记录每次设备读写的扇区号
pub struct RamDisk {
    sectors: Mutex<Vec<[u8; SECTOR_SIZE]>>,
    reads: Mutex<Vec<usize>>,
    writes: Mutex<Vec<usize>>,
}

impl RamDisk {
    pub fn new(num_sectors: usize) -> Arc<Self> {
        Arc::new(Self {
            sectors: Mutex::new(vec![[0; SECTOR_SIZE]; num_sectors]),
            reads: Mutex::default(),
            writes: Mutex::default(),
        })
    }

    /// 绕过缓存直接读设备，不计入读次数
    pub fn peek(&self, sector: usize) -> [u8; SECTOR_SIZE] {
        self.sectors.lock().unwrap()[sector]
    }

    pub fn poke(&self, sector: usize, data: &[u8; SECTOR_SIZE]) {
        self.sectors.lock().unwrap()[sector] = *data;
    }

    pub fn reads(&self) -> Vec<usize> {
        self.reads.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<usize> {
        self.writes.lock().unwrap().clone()
    }

    pub fn reads_of(&self, sector: usize) -> usize {
        self.reads
            .lock()
            .unwrap()
            .iter()
            .filter(|&&s| s == sector)
            .count()
    }

    pub fn reset_counters(&self) {
        self.reads.lock().unwrap().clear();
        self.writes.lock().unwrap().clear();
    }
}

impl BlockDevice for RamDisk {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        self.reads.lock().unwrap().push(block_id);
        buf.copy_from_slice(&self.sectors.lock().unwrap()[block_id]);
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        self.writes.lock().unwrap().push(block_id);
        self.sectors.lock().unwrap()[block_id].copy_from_slice(buf);
    }

    fn num_blocks(&self) -> usize {
        self.sectors.lock().unwrap().len()
    }
}

pub struct Harness {
    pub disk: Arc<RamDisk>,
    pub free_map: Arc<FreeMap>,
    pub fs: SectorFs,
}

/// `num_sectors` 个扇区的内存盘，前 `reserved` 个扇区不参与分配
pub fn harness(num_sectors: usize, reserved: usize) -> Harness {
    let disk = RamDisk::new(num_sectors);
    let free_map = Arc::new(FreeMap::new(num_sectors, reserved));
    let cache = Arc::new(SectorCache::new(disk.clone()));
    let fs = SectorFs::new(cache, free_map.clone());

    Harness { disk, free_map, fs }
}

#[inline]
pub fn sid(raw: usize) -> SectorId {
    SectorId::new(raw)
}

/// 可复现的伪随机字节
pub fn pattern(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as u8
        })
        .collect()
}
