//! 区段映射：文件内扇区下标到 inode 指针位置的换算
//!
//! - 直接指针：前 [`DIRECT_COUNT`] 个扇区；
//! - 间接块：之后每 [`ENTRIES_PER_INDIRECT`] 个扇区占用一个间接块，
//!   最多 [`INDIRECT_COUNT`] 个。

use crate::SECTOR_SIZE;

/// 直接指针个数
pub const DIRECT_COUNT: usize = 123;
/// 间接块指针个数
pub const INDIRECT_COUNT: usize = 3;
/// 每个间接块可编号的数据扇区数
pub const ENTRIES_PER_INDIRECT: usize = 127;
/// 所有间接块合计的编号容量
pub const INDIRECT_CAP: usize = INDIRECT_COUNT * ENTRIES_PER_INDIRECT;
/// 单个文件最多的数据扇区数
pub const MAX_SECTORS: usize = DIRECT_COUNT + INDIRECT_CAP;
/// 单个文件的最大字节数
pub const MAX_FILE_SIZE: usize = MAX_SECTORS * SECTOR_SIZE;

/// 文件内扇区对应的指针位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtentPos {
    Direct(usize),
    Indirect { block: usize, entry: usize },
}

/// 逻辑扇区下标所在的指针位置；超出容量则为空
pub fn locate(index: usize) -> Option<ExtentPos> {
    if index < DIRECT_COUNT {
        Some(ExtentPos::Direct(index))
    } else if index < MAX_SECTORS {
        // 剔去直接指针的部分
        let index = index - DIRECT_COUNT;
        Some(ExtentPos::Indirect {
            block: index / ENTRIES_PER_INDIRECT,
            entry: index % ENTRIES_PER_INDIRECT,
        })
    } else {
        None
    }
}

/// 容纳指定字节数需要多少个**数据扇区**
#[inline]
pub fn sectors_for(length: usize) -> usize {
    length.div_ceil(SECTOR_SIZE)
}

/// 容纳指定数量的数据扇区需要多少个**间接块**
#[inline]
pub fn indirect_blocks_for(sectors: usize) -> usize {
    sectors
        .saturating_sub(DIRECT_COUNT)
        .div_ceil(ENTRIES_PER_INDIRECT)
}

/// 容纳指定字节数需要的**数据扇区**与**间接块**总数
#[inline]
pub fn total_sectors_for(length: usize) -> usize {
    let sectors = sectors_for(length);
    sectors + indirect_blocks_for(sectors)
}
