//! # 扇区缓存层
//!
//! 块设备读写速度一般慢于内存读写速度，因此我们在内存中开辟固定数量的槽位，
//! 把即将操作的扇区复制到槽位中；所有设备读写都经过这一层。
//!
//! - 读：命中则直接复制，未命中才从设备加载；
//! - 写：只写入槽位并标脏，逐出时才写回设备；
//! - 逐出：优先使用空闲槽位，槽位用尽时按**位置**轮转选择牺牲者，
//!   与最近访问无关（即不带引用位的时钟算法）。
//!
//! 查找、加载、逐出全程持有同一把锁，两个并发的未命中不会选中同一个牺牲者，
//! 也不会重复加载同一个扇区。代价是设备 I/O 也在锁内进行。

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;

use enumflags2::{BitFlags, bitflags};
use spin::Mutex;

use crate::agent::ReadAhead;
use crate::config::{CACHE_CAPACITY, SECTOR_SIZE};
use crate::{BlockDevice, SectorId};

pub struct SectorCache {
    /// 底层块设备的引用
    dev: Arc<dyn BlockDevice>,
    state: Mutex<CacheState>,
    read_ahead: ReadAhead,
}

#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotFlag {
    Used = 0b01,
    Dirty = 0b10,
}

/// 一个槽位，缓存一个扇区
struct Slot {
    sector: SectorId,
    flags: BitFlags<SlotFlag>,
    data: Box<[u8; SECTOR_SIZE]>,
}

struct CacheState {
    slots: Vec<Slot>,
    /// 扇区号到槽位下标的映射，只包含在用的槽位
    index: BTreeMap<SectorId, usize>,
    /// 轮转逐出的游标，指向下一个牺牲者的位置
    cursor: usize,
}

impl SectorCache {
    #[inline]
    pub fn new(dev: Arc<dyn BlockDevice>) -> Self {
        Self::with_capacity(dev, CACHE_CAPACITY)
    }

    pub fn with_capacity(dev: Arc<dyn BlockDevice>, capacity: usize) -> Self {
        assert!(capacity > 0, "sector cache needs at least one slot");

        Self {
            dev,
            state: Mutex::new(CacheState::new(capacity)),
            read_ahead: ReadAhead::new(),
        }
    }

    /// 读出扇区的当前内容；随后把下一个扇区登记为预读目标
    pub fn read(&self, sector: SectorId, buf: &mut [u8]) {
        assert_eq!(buf.len(), SECTOR_SIZE, "not a complete sector!");

        {
            let mut state = self.state.lock();
            let slot = state.load(sector, self.dev.as_ref(), true);
            buf.copy_from_slice(&state.slots[slot].data[..]);
        }

        self.read_ahead.request(sector + 1);
    }

    /// 整个扇区写入缓存并标脏，不立即落盘
    pub fn write(&self, sector: SectorId, buf: &[u8]) {
        assert_eq!(buf.len(), SECTOR_SIZE, "not a complete sector!");

        let mut state = self.state.lock();
        // 整扇区覆盖，无需先从设备加载
        let slot = state.load(sector, self.dev.as_ref(), false);
        let slot = &mut state.slots[slot];
        slot.data.copy_from_slice(buf);
        slot.flags |= SlotFlag::Dirty;
    }

    /// 逐出指定扇区（脏则写回），释放其槽位；未缓存时什么也不做
    pub fn flush(&self, sector: SectorId) {
        let mut state = self.state.lock();
        if let Some(&slot) = state.index.get(&sector) {
            state.evict(slot, self.dev.as_ref());
        }
    }

    /// 按槽位下标顺序逐出所有在用槽位
    pub fn flush_all(&self) {
        let mut state = self.state.lock();
        for slot in 0..state.slots.len() {
            if state.slots[slot].flags.contains(SlotFlag::Used) {
                state.evict(slot, self.dev.as_ref());
            }
        }
    }

    /// 尽力而为地把扇区载入缓存，不再触发新的预读；越过设备末尾则忽略
    pub fn prefetch(&self, sector: SectorId) {
        if sector.raw() >= self.dev.num_blocks() {
            return;
        }
        self.state.lock().load(sector, self.dev.as_ref(), true);
    }

    pub fn contains(&self, sector: SectorId) -> bool {
        self.state.lock().index.contains_key(&sector)
    }

    /// 扇区所在的槽位
    pub fn slot_of(&self, sector: SectorId) -> Option<usize> {
        self.state.lock().index.get(&sector).copied()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.state.lock().slots.len()
    }

    #[inline]
    pub fn read_ahead(&self) -> &ReadAhead {
        &self.read_ahead
    }
}

impl Drop for SectorCache {
    fn drop(&mut self) {
        self.flush_all();
    }
}

impl Slot {
    fn empty() -> Self {
        Self {
            sector: SectorId::NULL,
            flags: BitFlags::empty(),
            data: Box::new([0; SECTOR_SIZE]),
        }
    }
}

impl CacheState {
    fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| Slot::empty()).collect(),
            index: BTreeMap::new(),
            cursor: 0,
        }
    }

    /// 找到或载入扇区，返回槽位下标。
    /// `fill` 为假时不从设备读取，由调用者随即覆盖整个扇区。
    fn load(&mut self, sector: SectorId, dev: &dyn BlockDevice, fill: bool) -> usize {
        if let Some(&slot) = self.index.get(&sector) {
            log::trace!("cache hit: sector={sector} slot={slot}");
            return slot;
        }

        let slot = self.claim(dev);
        log::trace!("cache miss: sector={sector} slot={slot}");

        let entry = &mut self.slots[slot];
        if fill {
            dev.read_block(sector.raw(), &mut entry.data[..]);
        }
        entry.sector = sector;
        entry.flags = SlotFlag::Used.into();
        self.index.insert(sector, slot);

        slot
    }

    /// 取得一个空闲槽位：有空位用下标最小的空位，否则轮转逐出
    fn claim(&mut self, dev: &dyn BlockDevice) -> usize {
        if self.index.len() < self.slots.len() {
            let free = self
                .slots
                .iter()
                .position(|slot| !slot.flags.contains(SlotFlag::Used));
            if let Some(slot) = free {
                return slot;
            }
        }

        let victim = self.cursor;
        self.cursor = (self.cursor + 1) % self.slots.len();
        self.evict(victim, dev);

        victim
    }

    fn evict(&mut self, slot: usize, dev: &dyn BlockDevice) {
        let entry = &mut self.slots[slot];
        debug_assert!(entry.flags.contains(SlotFlag::Used));

        if entry.flags.contains(SlotFlag::Dirty) {
            dev.write_block(entry.sector.raw(), &entry.data[..]);
        }
        log::debug!(
            "evict: sector={} slot={slot} dirty={}",
            entry.sector,
            entry.flags.contains(SlotFlag::Dirty)
        );

        self.index.remove(&entry.sector);
        entry.flags = BitFlags::empty();
    }
}
