mod common;

use std::sync::Arc;

use common::{RamDisk, sid};
use sector_fs::{SECTOR_SIZE, SectorCache};

fn filled(byte: u8) -> [u8; SECTOR_SIZE] {
    [byte; SECTOR_SIZE]
}

#[test]
fn repeated_read_hits_cache() {
    let disk = RamDisk::new(128);
    disk.poke(7, &filled(0x77));
    let cache = SectorCache::new(disk.clone());

    let mut first = [0u8; SECTOR_SIZE];
    let mut second = [0u8; SECTOR_SIZE];
    cache.read(sid(7), &mut first);
    cache.read(sid(7), &mut second);

    assert_eq!(first, second);
    assert_eq!(filled(0x77), first);
    assert_eq!(1, disk.reads_of(7));
}

#[test]
fn write_back_on_flush() {
    let disk = RamDisk::new(128);
    let cache = SectorCache::new(disk.clone());

    cache.write(sid(3), &filled(0xAB));
    // 写入不落盘，但随后的读能看到
    assert_eq!(filled(0), disk.peek(3));
    let mut buf = [0u8; SECTOR_SIZE];
    cache.read(sid(3), &mut buf);
    assert_eq!(filled(0xAB), buf);
    // 整扇区写入无需先读设备
    assert_eq!(0, disk.reads_of(3));

    cache.flush(sid(3));
    assert!(!cache.contains(sid(3)));
    assert_eq!(filled(0xAB), disk.peek(3));
    assert_eq!(vec![3], disk.writes());
}

#[test]
fn clean_eviction_skips_device_write() {
    let disk = RamDisk::new(128);
    let cache = SectorCache::with_capacity(disk.clone(), 2);
    let mut buf = [0u8; SECTOR_SIZE];

    cache.read(sid(1), &mut buf);
    cache.read(sid(2), &mut buf);
    cache.read(sid(3), &mut buf);
    cache.flush(sid(42));

    assert!(!cache.contains(sid(1)));
    assert!(disk.writes().is_empty());
}

#[test]
fn round_robin_eviction() {
    let disk = RamDisk::new(256);
    let cache = SectorCache::new(disk.clone());
    assert_eq!(64, cache.capacity());
    let mut buf = [0u8; SECTOR_SIZE];

    for sector in 0..64 {
        cache.read(sid(sector), &mut buf);
        assert_eq!(Some(sector), cache.slot_of(sid(sector)));
    }

    // 第 65 个扇区逐出 0 号槽位
    cache.read(sid(64), &mut buf);
    assert!(!cache.contains(sid(0)));
    assert_eq!(Some(0), cache.slot_of(sid(64)));
    for sector in 1..64 {
        assert!(cache.contains(sid(sector)));
    }

    // 最近访问过的 1 号扇区照样被逐出：按位置轮转，而不是 LRU
    cache.read(sid(1), &mut buf);
    cache.read(sid(65), &mut buf);
    assert!(!cache.contains(sid(1)));
    assert_eq!(Some(1), cache.slot_of(sid(65)));
    assert_eq!(1, disk.reads_of(1));

    // 下一个牺牲者是 2 号槽位
    cache.read(sid(0), &mut buf);
    assert_eq!(Some(2), cache.slot_of(sid(0)));
    assert_eq!(2, disk.reads_of(0));
}

#[test]
fn dirty_victim_written_back_in_position_order() {
    let disk = RamDisk::new(256);
    let cache = SectorCache::with_capacity(disk.clone(), 4);

    for sector in 10..14 {
        cache.write(sid(sector), &filled(sector as u8));
    }
    assert!(disk.writes().is_empty());

    let mut buf = [0u8; SECTOR_SIZE];
    cache.read(sid(20), &mut buf);
    cache.read(sid(21), &mut buf);

    assert_eq!(vec![10, 11], disk.writes());
    assert_eq!(filled(10), disk.peek(10));
    assert_eq!(filled(11), disk.peek(11));
}

#[test]
fn flush_all_in_slot_order() {
    let disk = RamDisk::new(64);
    let cache = SectorCache::with_capacity(disk.clone(), 8);
    let mut buf = [0u8; SECTOR_SIZE];

    cache.write(sid(30), &filled(1));
    cache.read(sid(5), &mut buf);
    cache.write(sid(20), &filled(2));
    cache.write(sid(10), &filled(3));

    cache.flush_all();

    assert_eq!(vec![30, 20, 10], disk.writes());
    for sector in [30, 5, 20, 10] {
        assert!(!cache.contains(sid(sector)));
    }
}

#[test]
fn freed_slot_is_reused_before_eviction() {
    let disk = RamDisk::new(64);
    let cache = SectorCache::with_capacity(disk.clone(), 3);
    let mut buf = [0u8; SECTOR_SIZE];

    for sector in 0..3 {
        cache.read(sid(sector), &mut buf);
    }
    cache.flush(sid(1));
    cache.read(sid(9), &mut buf);

    assert_eq!(Some(1), cache.slot_of(sid(9)));
    assert!(cache.contains(sid(0)));
    assert!(cache.contains(sid(2)));
}

#[test]
fn drop_writes_back_dirty_slots() {
    let disk = RamDisk::new(16);
    {
        let cache = SectorCache::new(disk.clone());
        cache.write(sid(4), &filled(0x44));
    }
    assert_eq!(filled(0x44), disk.peek(4));
}

#[test]
fn concurrent_readers_load_once() {
    let disk = RamDisk::new(64);
    for sector in 0..16 {
        disk.poke(sector, &filled(sector as u8));
    }
    let cache = Arc::new(SectorCache::new(disk.clone()));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let cache = cache.clone();
            std::thread::spawn(move || {
                let mut buf = [0u8; SECTOR_SIZE];
                for sector in 0..16 {
                    cache.read(sid(sector), &mut buf);
                    assert_eq!(filled(sector as u8), buf);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for sector in 0..16 {
        assert_eq!(1, disk.reads_of(sector));
    }
}

#[test]
fn prefetch_ignores_device_end() {
    let disk = RamDisk::new(8);
    let cache = SectorCache::new(disk.clone());

    cache.prefetch(sid(8));
    assert!(!cache.contains(sid(8)));

    cache.prefetch(sid(7));
    assert!(cache.contains(sid(7)));
    assert_eq!(vec![7], disk.reads());
}
