//! # 文件系统门面
//!
//! 持有扇区缓存、空闲扇区分配器和已打开 inode 表。
//! 同一扇区上的 inode 被多次打开时共享同一个 [`Inode`]，
//! 查找与插入、计数归零与移除都在表锁内完成。

use alloc::collections::BTreeMap;
use alloc::sync::Arc;

use spin::Mutex;

use crate::inode::{self, Extender, Inode};
use crate::layout::extent::{self, MAX_FILE_SIZE};
use crate::layout::{DiskInode, InodeKind};
use crate::{Error, SectorAllocator, SectorCache, SectorId};

pub struct SectorFs {
    cache: Arc<SectorCache>,
    alloc: Arc<dyn SectorAllocator>,
    /// 已打开 inode 表
    open_inodes: Mutex<BTreeMap<SectorId, Arc<Inode>>>,
}

impl SectorFs {
    pub fn new(cache: Arc<SectorCache>, alloc: Arc<dyn SectorAllocator>) -> Self {
        Self {
            cache,
            alloc,
            open_inodes: Mutex::new(BTreeMap::new()),
        }
    }

    /// 在 `sector` 上创建长度为 `length` 的 inode，数据扇区全部清零。
    /// 空间不足时归还已分配的扇区。
    pub fn create(&self, sector: SectorId, length: usize, kind: InodeKind) -> Result<(), Error> {
        if length > MAX_FILE_SIZE {
            return Err(Error::TooLarge);
        }

        let mut extender = Extender::new(DiskInode::new(kind), &self.cache, self.alloc.as_ref());
        for index in 0..extent::sectors_for(length) {
            if extender.allocate(index).is_none() {
                log::warn!("create inode {sector}: out of space at sector index {index}");
                return Err(Error::NoSpace);
            }
        }

        let disk = extender.commit(length);
        inode::write_record(&self.cache, sector, &disk);
        log::debug!("create inode {sector}: kind={kind:?} length={length}");

        Ok(())
    }

    /// 打开 `sector` 上的 inode；已打开则共享同一个并增加打开计数
    pub fn open(&self, sector: SectorId) -> Arc<Inode> {
        let mut open_inodes = self.open_inodes.lock();

        if let Some(inode) = open_inodes.get(&sector) {
            inode.acquire();
            return Arc::clone(inode);
        }

        let disk = inode::read_record(&self.cache, sector);
        assert!(
            InodeKind::from_magic(disk.magic).is_some(),
            "no inode at sector {sector}: magic {:#x}",
            disk.magic
        );

        let inode = Arc::new(Inode::new(
            sector,
            disk,
            self.cache.clone(),
            self.alloc.clone(),
        ));
        open_inodes.insert(sector, inode.clone());
        log::debug!("open inode {sector}");

        inode
    }

    /// 再打开一次
    pub fn reopen(&self, inode: &Arc<Inode>) -> Arc<Inode> {
        let _open_inodes = self.open_inodes.lock();
        inode.acquire();
        Arc::clone(inode)
    }

    /// 关闭 inode。最后一个打开者关闭时将其移出表，若已标记删除则归还全部扇区。
    pub fn close(&self, inode: Arc<Inode>) {
        let mut open_inodes = self.open_inodes.lock();
        if !inode.release() {
            return;
        }

        // 移出表与归还扇区在同一把锁下完成，期间无法重新打开
        open_inodes.remove(&inode.inumber());
        log::debug!("close inode {}", inode.inumber());

        if inode.is_removed() {
            inode.release_sectors();
        }
    }

    /// 已打开的 inode 个数
    pub fn open_inode_count(&self) -> usize {
        self.open_inodes.lock().len()
    }

    /// 把缓存中的脏扇区全部写回
    pub fn sync(&self) {
        self.cache.flush_all();
    }

    #[inline]
    pub fn cache(&self) -> &Arc<SectorCache> {
        &self.cache
    }
}
