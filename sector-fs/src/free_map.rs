//! # 空闲扇区分配器
//!
//! inode 层只依赖 [`SectorAllocator`]；[`FreeMap`] 是它的一个内存位图实现，
//! 每个 bit 对应一个扇区，置 1 表示已分配。

use alloc::vec;
use alloc::vec::Vec;

use spin::Mutex;

use crate::SectorId;

/// 空闲扇区分配器特质
pub trait SectorAllocator: Send + Sync {
    /// 分配连续的 `count` 个扇区，返回首个扇区号；空间不足则返回空
    fn allocate(&self, count: usize) -> Option<SectorId>;

    /// 归还从 `sector` 起连续的 `count` 个扇区
    fn release(&self, sector: SectorId, count: usize);
}

/// 一次增长过程中取得的扇区，未提交就被丢弃时全部归还
pub(crate) struct Reservation<'a> {
    alloc: &'a dyn SectorAllocator,
    taken: Vec<SectorId>,
}

impl<'a> Reservation<'a> {
    #[inline]
    pub fn new(alloc: &'a dyn SectorAllocator) -> Self {
        Self {
            alloc,
            taken: Vec::new(),
        }
    }

    pub fn take(&mut self) -> Option<SectorId> {
        let sector = self.alloc.allocate(1)?;
        self.taken.push(sector);
        Some(sector)
    }

    /// 确认保留这些扇区，返回个数
    #[inline]
    pub fn commit(mut self) -> usize {
        core::mem::take(&mut self.taken).len()
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.taken.is_empty() {
            return;
        }

        log::debug!("roll back {} reserved sectors", self.taken.len());
        for sector in self.taken.drain(..) {
            self.alloc.release(sector, 1);
        }
    }
}

/// 位图内的一组 bit
type BitGroup = u64;
const GROUP_BITS: usize = BitGroup::BITS as usize;

#[derive(Debug)]
pub struct FreeMap {
    inner: Mutex<Bitmap>,
}

#[derive(Debug)]
struct Bitmap {
    groups: Vec<BitGroup>,
    /// 位图指示的扇区总数
    len: usize,
    free: usize,
}

impl FreeMap {
    /// `total` 个扇区，其中前 `reserved` 个永不分配。
    /// 0 号扇区是“未分配”指针，所以至少保留一个。
    pub fn new(total: usize, reserved: usize) -> Self {
        assert!(reserved >= 1, "sector 0 must stay reserved");
        assert!(reserved <= total);

        let mut bitmap = Bitmap {
            groups: vec![0; total.div_ceil(GROUP_BITS)],
            len: total,
            free: total,
        };
        // 位图末尾多出来的 bit 也标记为已用，免得被分配出去
        for bit in total..bitmap.groups.len() * GROUP_BITS {
            bitmap.set(bit);
        }
        for bit in 0..reserved {
            bitmap.set(bit);
            bitmap.free -= 1;
        }

        Self {
            inner: Mutex::new(bitmap),
        }
    }

    #[inline]
    pub fn free_count(&self) -> usize {
        self.inner.lock().free
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.lock().len
    }

    pub fn is_allocated(&self, sector: SectorId) -> bool {
        let bitmap = self.inner.lock();
        sector.raw() < bitmap.len && bitmap.test(sector.raw())
    }
}

impl SectorAllocator for FreeMap {
    fn allocate(&self, count: usize) -> Option<SectorId> {
        assert!(count > 0);

        let mut bitmap = self.inner.lock();
        let start = if count == 1 {
            bitmap.first_free()
        } else {
            bitmap.first_run(count)
        }?;

        for bit in start..start + count {
            bitmap.set(bit);
        }
        bitmap.free -= count;

        Some(SectorId::new(start))
    }

    fn release(&self, sector: SectorId, count: usize) {
        let mut bitmap = self.inner.lock();
        let start = sector.raw();
        assert!(start + count <= bitmap.len, "release out of range");

        for bit in start..start + count {
            // 编号一定得有对应的位
            assert!(bitmap.test(bit), "double release of sector {bit}");
            bitmap.clear(bit);
        }
        bitmap.free += count;
    }
}

impl Bitmap {
    #[inline]
    fn test(&self, bit: usize) -> bool {
        self.groups[bit / GROUP_BITS] & (1 << (bit % GROUP_BITS)) != 0
    }

    #[inline]
    fn set(&mut self, bit: usize) {
        self.groups[bit / GROUP_BITS] |= 1 << (bit % GROUP_BITS);
    }

    #[inline]
    fn clear(&mut self, bit: usize) {
        self.groups[bit / GROUP_BITS] &= !(1 << (bit % GROUP_BITS));
    }

    /// 寻找还有 0 的 bit 组，组号 * 组宽 + 组内第一个 0 即为扇区号
    fn first_free(&self) -> Option<usize> {
        self.groups
            .iter()
            .enumerate()
            .find_map(|(group_index, &bits)| {
                (bits != BitGroup::MAX)
                    .then(|| group_index * GROUP_BITS + bits.trailing_ones() as usize)
            })
    }

    /// 寻找长度为 `count` 的连续空闲区间
    fn first_run(&self, count: usize) -> Option<usize> {
        let mut run_start = 0;
        let mut run_len = 0;

        for bit in 0..self.len {
            if self.test(bit) {
                run_start = bit + 1;
                run_len = 0;
            } else {
                run_len += 1;
                if run_len == count {
                    return Some(run_start);
                }
            }
        }

        None
    }
}
