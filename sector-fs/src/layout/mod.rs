//! # 磁盘数据结构层
//!
//! 每个 inode 独占一个扇区：
//! 长度 | 类型标记 | 123 个直接指针 | 3 个间接块指针
//!
//! 每个间接块同样独占一个扇区：类型标记 | 127 个数据扇区指针。
//! 所有字段均为 4 字节小端序，指针为 0 表示未分配。

pub mod extent;

mod indirect;
pub use indirect::IndirectBlock;

mod inode;
pub use inode::{DIR_MAGIC, DiskInode, FILE_MAGIC, InodeKind};

use crate::SECTOR_SIZE;

/// 扇区内第 `index` 个 4 字节字
#[inline]
fn word(buf: &[u8], index: usize) -> u32 {
    let at = index * 4;
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

#[inline]
fn put_word(buf: &mut [u8], index: usize, value: u32) {
    let at = index * 4;
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

/// 一个扇区能放下的字数
const SECTOR_WORDS: usize = SECTOR_SIZE / 4;
