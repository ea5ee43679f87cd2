//! # 索引节点层
//!
//! 把文件的字节区间 [0, length) 映射到设备扇区上；写入越过文件末尾时，
//! 透明地分配扇区并增长文件。
//!
//! 同一扇区上的 inode 在内存中只有一份，由 [`SectorFs`](crate::SectorFs)
//! 的已打开 inode 表维护；本层只负责单个 inode 的读写与增长。

use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use crate::free_map::Reservation;
use crate::layout::extent::{self, ExtentPos, INDIRECT_COUNT, MAX_SECTORS};
use crate::layout::{DiskInode, IndirectBlock, InodeKind};
use crate::{SECTOR_SIZE, SectorAllocator, SectorCache, SectorId};

/// 内存中的 inode
pub struct Inode {
    /// inode 记录所在扇区，同时也是 inode 编号
    sector: SectorId,
    cache: Arc<SectorCache>,
    alloc: Arc<dyn SectorAllocator>,
    inner: Mutex<InodeInner>,
}

struct InodeInner {
    /// 打开者个数
    open_count: usize,
    /// 最后一个打开者关闭时释放所有扇区
    removed: bool,
    /// 大于 0 时禁止写入
    deny_write_count: usize,
    /// 磁盘记录的副本
    disk: DiskInode,
}

impl Inode {
    pub(crate) fn new(
        sector: SectorId,
        disk: DiskInode,
        cache: Arc<SectorCache>,
        alloc: Arc<dyn SectorAllocator>,
    ) -> Self {
        Self {
            sector,
            cache,
            alloc,
            inner: Mutex::new(InodeInner {
                open_count: 1,
                removed: false,
                deny_write_count: 0,
                disk,
            }),
        }
    }

    #[inline]
    pub fn inumber(&self) -> SectorId {
        self.sector
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.lock().disk.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().disk.is_empty()
    }

    #[inline]
    pub fn kind(&self) -> InodeKind {
        self.inner.lock().disk.kind()
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind() == InodeKind::Directory
    }

    #[inline]
    pub fn open_count(&self) -> usize {
        self.inner.lock().open_count
    }

    #[inline]
    pub fn is_removed(&self) -> bool {
        self.inner.lock().removed
    }

    /// 标记删除，最后一个打开者关闭时才真正释放
    pub fn remove(&self) {
        self.inner.lock().removed = true;
    }

    /// 磁盘记录的副本
    pub fn disk_inode(&self) -> DiskInode {
        self.inner.lock().disk.clone()
    }

    /// 禁止写入。每个打开者最多调用一次。
    pub fn deny_write(&self) {
        let mut inner = self.inner.lock();
        inner.deny_write_count += 1;
        assert!(inner.deny_write_count <= inner.open_count);
    }

    /// 恢复写入。必须与此前的 [`Inode::deny_write`] 一一配对。
    pub fn allow_write(&self) {
        let mut inner = self.inner.lock();
        assert!(inner.deny_write_count > 0, "allow_write without deny_write");
        assert!(inner.deny_write_count <= inner.open_count);
        inner.deny_write_count -= 1;
    }

    /// 字节偏移所在的设备扇区。
    ///
    /// 读时偏移越过文件末尾返回空；写时越过末尾即增长文件，
    /// 分配失败或超出最大长度也返回空。
    pub fn resolve(&self, offset: usize, size: usize, is_write: bool) -> Option<SectorId> {
        let mut inner = self.inner.lock();
        self.resolve_locked(&mut inner.disk, offset, size, is_write)
    }

    /// 从指定位置(字节偏移)读出数据填充`buf`，返回读到的字节数；
    /// 只会因为到达文件末尾而读不满
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> usize {
        let mut inner = self.inner.lock();
        let mut bounce = [0u8; SECTOR_SIZE];
        let mut offset = offset;
        let mut read_size = 0;

        while read_size < buf.len() {
            let remaining = buf.len() - read_size;
            let Some(sector) = self.resolve_locked(&mut inner.disk, offset, remaining, false)
            else {
                break;
            };

            let sector_ofs = offset % SECTOR_SIZE;
            let inode_left = inner.disk.len() - offset;
            let sector_left = SECTOR_SIZE - sector_ofs;
            let chunk = remaining.min(inode_left).min(sector_left);
            if chunk == 0 {
                break;
            }

            let dest = &mut buf[read_size..read_size + chunk];
            if chunk == SECTOR_SIZE {
                // 整扇区直接读进调用者的缓冲区
                self.cache.read(sector, dest);
            } else {
                self.cache.read(sector, &mut bounce);
                dest.copy_from_slice(&bounce[sector_ofs..sector_ofs + chunk]);
            }

            offset += chunk;
            read_size += chunk;
        }

        read_size
    }

    /// 把`buf`写到指定位置，必要时增长文件，返回写入的字节数；
    /// 只会因为分配失败或触及最大长度而写不满。禁止写入期间什么也不做。
    pub fn write_at(&self, offset: usize, buf: &[u8]) -> usize {
        let mut inner = self.inner.lock();
        if inner.deny_write_count > 0 {
            return 0;
        }

        let mut bounce = [0u8; SECTOR_SIZE];
        let mut offset = offset;
        let mut written_size = 0;

        while written_size < buf.len() {
            let remaining = buf.len() - written_size;
            let Some(sector) = self.resolve_locked(&mut inner.disk, offset, remaining, true)
            else {
                break;
            };

            let sector_ofs = offset % SECTOR_SIZE;
            let inode_left = inner.disk.len() - offset;
            let sector_left = SECTOR_SIZE - sector_ofs;
            let chunk = remaining.min(inode_left).min(sector_left);
            if chunk == 0 {
                break;
            }

            let src = &buf[written_size..written_size + chunk];
            if chunk == SECTOR_SIZE {
                self.cache.write(sector, src);
            } else {
                // 扇区内还有块外的数据就先读出来，否则从全零开始
                if sector_ofs > 0 || chunk < sector_left {
                    self.cache.read(sector, &mut bounce);
                } else {
                    bounce.fill(0);
                }
                bounce[sector_ofs..sector_ofs + chunk].copy_from_slice(src);
                self.cache.write(sector, &bounce);
            }

            offset += chunk;
            written_size += chunk;
        }

        written_size
    }
}

impl Inode {
    /// 打开者加一
    pub(crate) fn acquire(&self) {
        self.inner.lock().open_count += 1;
    }

    /// 打开者减一，返回是否是最后一个
    pub(crate) fn release(&self) -> bool {
        let mut inner = self.inner.lock();
        assert!(inner.open_count > 0, "inode {} closed too many times", self.sector);
        inner.open_count -= 1;
        debug_assert!(inner.deny_write_count <= inner.open_count);
        inner.open_count == 0
    }

    /// 把 inode 自身、所有数据扇区和间接块归还给分配器
    pub(crate) fn release_sectors(&self) {
        let inner = self.inner.lock();
        let disk = &inner.disk;

        let mut freed = Vec::with_capacity(extent::total_sectors_for(disk.len()) + 1);
        freed.push(self.sector);
        freed.extend(disk.direct.iter().copied().filter_map(SectorId::from_disk));
        for table in disk.indirect.iter().copied().filter_map(SectorId::from_disk) {
            let block = load_indirect(&self.cache, table);
            freed.extend(block.allocated().filter_map(SectorId::from_disk));
            freed.push(table);
        }
        debug_assert_eq!(freed.len(), extent::total_sectors_for(disk.len()) + 1);

        log::debug!("inode {}: release {} sectors", self.sector, freed.len());
        for sector in freed {
            self.alloc.release(sector, 1);
        }
    }

    fn resolve_locked(
        &self,
        disk: &mut DiskInode,
        offset: usize,
        size: usize,
        is_write: bool,
    ) -> Option<SectorId> {
        if offset >= disk.len() {
            if !is_write {
                return None;
            }
            self.grow(disk, offset, size)?;
        }

        self.lookup(disk, offset / SECTOR_SIZE)
    }

    /// 逻辑扇区下标对应的设备扇区，未分配则为空
    fn lookup(&self, disk: &DiskInode, index: usize) -> Option<SectorId> {
        let ptr = match extent::locate(index)? {
            ExtentPos::Direct(i) => disk.direct[i],
            ExtentPos::Indirect { block, entry } => {
                let table = SectorId::from_disk(disk.indirect[block])?;
                load_indirect(&self.cache, table).entries[entry]
            }
        };

        SectorId::from_disk(ptr)
    }

    /// 增长到能容纳 `offset` 起落在同一扇区内的数据
    fn grow(&self, disk: &mut DiskInode, offset: usize, size: usize) -> Option<()> {
        let index = offset / SECTOR_SIZE;
        if index >= MAX_SECTORS {
            log::warn!("inode {}: offset {offset} beyond max file size", self.sector);
            return None;
        }
        let sector_left = SECTOR_SIZE - offset % SECTOR_SIZE;
        let length = offset + size.min(sector_left);
        if index >= extent::sectors_for(length) {
            // 扇区边界上的零长度写不占用新扇区
            return None;
        }

        let mut extender = Extender::new(disk.clone(), &self.cache, self.alloc.as_ref());
        // 从目标扇区向下回填，直到遇见已分配的扇区，长度以内不留空洞
        for cursor in (0..=index).rev() {
            if extender.is_allocated(cursor) {
                break;
            }
            if extender.allocate(cursor).is_none() {
                log::warn!("inode {}: out of space growing to {length}", self.sector);
                return None;
            }
        }

        *disk = extender.commit(length);
        self.persist(disk);
        log::debug!("inode {}: grow to {length}", self.sector);

        Some(())
    }

    fn persist(&self, disk: &DiskInode) {
        write_record(&self.cache, self.sector, disk);
    }
}

/// 在 inode 记录的工作副本上分配扇区，全部成功后才提交；
/// 中途放弃时已分配的扇区随 [`Reservation`] 一起归还
pub(crate) struct Extender<'a> {
    disk: DiskInode,
    cache: &'a SectorCache,
    reservation: Reservation<'a>,
    /// 已读入或新建的间接块
    blocks: [Option<IndirectBlock>; INDIRECT_COUNT],
    /// 被修改过的间接块，提交时写回
    touched: [bool; INDIRECT_COUNT],
    /// 新分配的数据扇区，提交时清零
    fresh: Vec<SectorId>,
}

impl<'a> Extender<'a> {
    pub fn new(disk: DiskInode, cache: &'a SectorCache, alloc: &'a dyn SectorAllocator) -> Self {
        Self {
            disk,
            cache,
            reservation: Reservation::new(alloc),
            blocks: Default::default(),
            touched: [false; INDIRECT_COUNT],
            fresh: Vec::new(),
        }
    }

    pub fn is_allocated(&mut self, index: usize) -> bool {
        let Some(pos) = extent::locate(index) else {
            return false;
        };

        match pos {
            ExtentPos::Direct(i) => self.disk.direct[i] != 0,
            ExtentPos::Indirect { block, entry } => {
                self.disk.indirect[block] != 0 && self.table(block).entries[entry] != 0
            }
        }
    }

    /// 为逻辑扇区分配数据扇区，需要时先分配间接块
    pub fn allocate(&mut self, index: usize) -> Option<()> {
        match extent::locate(index)? {
            ExtentPos::Direct(i) => {
                let data = self.reservation.take()?;
                self.disk.direct[i] = data.to_disk();
                self.fresh.push(data);
            }
            ExtentPos::Indirect { block, entry } => {
                if self.disk.indirect[block] == 0 {
                    let table = self.reservation.take()?;
                    // 先落下类型标记，再填数据指针
                    let new_block = IndirectBlock::new();
                    write_indirect(self.cache, table, &new_block);
                    self.disk.indirect[block] = table.to_disk();
                    self.blocks[block] = Some(new_block);
                }

                let data = self.reservation.take()?;
                self.table(block).entries[entry] = data.to_disk();
                self.touched[block] = true;
                self.fresh.push(data);
            }
        }

        Some(())
    }

    /// 清零新数据扇区、写回间接块，返回长度为 `length` 的新记录
    pub fn commit(self, length: usize) -> DiskInode {
        let Self {
            mut disk,
            cache,
            reservation,
            blocks,
            touched,
            fresh,
        } = self;

        let zeros = [0u8; SECTOR_SIZE];
        for &sector in &fresh {
            cache.write(sector, &zeros);
        }

        for (block, table) in blocks.iter().enumerate() {
            if let (true, Some(table)) = (touched[block], table) {
                write_indirect(cache, SectorId::new(disk.indirect[block] as usize), table);
            }
        }

        reservation.commit();
        disk.set_len(length);
        disk
    }

    fn table(&mut self, block: usize) -> &mut IndirectBlock {
        let cache = self.cache;
        let table = SectorId::new(self.disk.indirect[block] as usize);
        self.blocks[block].get_or_insert_with(|| load_indirect(cache, table))
    }
}

/// 经缓存读出间接块；类型标记不符说明磁盘不可信，直接 panic
fn load_indirect(cache: &SectorCache, sector: SectorId) -> IndirectBlock {
    let mut buf = [0u8; SECTOR_SIZE];
    cache.read(sector, &mut buf);
    let block = IndirectBlock::decode(&buf);
    assert!(
        block.is_valid(),
        "malformed indirect block at sector {sector}: magic {:#x}",
        block.magic
    );
    block
}

fn write_indirect(cache: &SectorCache, sector: SectorId, block: &IndirectBlock) {
    let mut buf = [0u8; SECTOR_SIZE];
    block.encode(&mut buf);
    cache.write(sector, &buf);
}

pub(crate) fn write_record(cache: &SectorCache, sector: SectorId, disk: &DiskInode) {
    let mut buf = [0u8; SECTOR_SIZE];
    disk.encode(&mut buf);
    cache.write(sector, &buf);
}

pub(crate) fn read_record(cache: &SectorCache, sector: SectorId) -> DiskInode {
    let mut buf = [0u8; SECTOR_SIZE];
    cache.read(sector, &mut buf);
    DiskInode::decode(&buf)
}
