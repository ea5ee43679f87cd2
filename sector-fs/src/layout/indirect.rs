use super::extent::ENTRIES_PER_INDIRECT;
use super::{FILE_MAGIC, SECTOR_WORDS, put_word, word};
use crate::SECTOR_SIZE;

/// 间接块：连续存储数据扇区的编号
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndirectBlock {
    pub magic: u32,
    pub entries: [u32; ENTRIES_PER_INDIRECT],
}

const _: () = assert!(1 + ENTRIES_PER_INDIRECT == SECTOR_WORDS);

impl IndirectBlock {
    /// 只带类型标记的空间接块
    #[inline]
    pub fn new() -> Self {
        Self {
            magic: FILE_MAGIC,
            entries: [0; ENTRIES_PER_INDIRECT],
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == FILE_MAGIC
    }

    /// 已分配的数据扇区指针
    pub fn allocated(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.iter().copied().filter(|&ptr| ptr != 0)
    }

    pub fn decode(buf: &[u8]) -> Self {
        assert_eq!(buf.len(), SECTOR_SIZE);

        let mut block = Self {
            magic: word(buf, 0),
            entries: [0; ENTRIES_PER_INDIRECT],
        };
        for (i, entry) in block.entries.iter_mut().enumerate() {
            *entry = word(buf, 1 + i);
        }

        block
    }

    pub fn encode(&self, buf: &mut [u8]) {
        assert_eq!(buf.len(), SECTOR_SIZE);

        put_word(buf, 0, self.magic);
        for (i, &entry) in self.entries.iter().enumerate() {
            put_word(buf, 1 + i, entry);
        }
    }
}

impl Default for IndirectBlock {
    fn default() -> Self {
        Self::new()
    }
}
