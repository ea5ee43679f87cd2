use super::extent::{DIRECT_COUNT, INDIRECT_COUNT};
use super::{SECTOR_WORDS, put_word, word};
use crate::SECTOR_SIZE;

/// 普通文件与间接块的类型标记
pub const FILE_MAGIC: u32 = 0x494e_4f44;
/// 目录的类型标记
pub const DIR_MAGIC: u32 = 0x494d_4f34;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum InodeKind {
    #[default]
    File,
    Directory,
}

impl InodeKind {
    #[inline]
    pub fn magic(self) -> u32 {
        match self {
            Self::File => FILE_MAGIC,
            Self::Directory => DIR_MAGIC,
        }
    }

    #[inline]
    pub fn from_magic(magic: u32) -> Option<Self> {
        match magic {
            FILE_MAGIC => Some(Self::File),
            DIR_MAGIC => Some(Self::Directory),
            _ => None,
        }
    }
}

/// 磁盘上的 inode，恰好占满一个扇区
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskInode {
    /// 文件字节数
    pub length: i32,
    /// 类型标记
    pub magic: u32,
    /// 直接指针，指向数据扇区
    pub direct: [u32; DIRECT_COUNT],
    /// 间接块指针
    pub indirect: [u32; INDIRECT_COUNT],
}

const _: () = assert!(2 + DIRECT_COUNT + INDIRECT_COUNT == SECTOR_WORDS);

impl DiskInode {
    #[inline]
    pub fn new(kind: InodeKind) -> Self {
        Self {
            length: 0,
            magic: kind.magic(),
            direct: [0; DIRECT_COUNT],
            indirect: [0; INDIRECT_COUNT],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.length as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    #[inline]
    pub fn set_len(&mut self, length: usize) {
        self.length = i32::try_from(length).expect("inode length overflows i32");
    }

    /// 类型标记损坏视为磁盘不可信，直接 panic
    pub fn kind(&self) -> InodeKind {
        InodeKind::from_magic(self.magic)
            .unwrap_or_else(|| panic!("malformed inode magic {:#x}", self.magic))
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind() == InodeKind::Directory
    }

    pub fn decode(buf: &[u8]) -> Self {
        assert_eq!(buf.len(), SECTOR_SIZE);

        let mut inode = Self {
            length: word(buf, 0) as i32,
            magic: word(buf, 1),
            direct: [0; DIRECT_COUNT],
            indirect: [0; INDIRECT_COUNT],
        };
        for (i, ptr) in inode.direct.iter_mut().enumerate() {
            *ptr = word(buf, 2 + i);
        }
        for (i, ptr) in inode.indirect.iter_mut().enumerate() {
            *ptr = word(buf, 2 + DIRECT_COUNT + i);
        }

        inode
    }

    pub fn encode(&self, buf: &mut [u8]) {
        assert_eq!(buf.len(), SECTOR_SIZE);

        put_word(buf, 0, self.length as u32);
        put_word(buf, 1, self.magic);
        for (i, &ptr) in self.direct.iter().enumerate() {
            put_word(buf, 2 + i, ptr);
        }
        for (i, &ptr) in self.indirect.iter().enumerate() {
            put_word(buf, 2 + DIRECT_COUNT + i, ptr);
        }
    }
}
