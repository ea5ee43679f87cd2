//! 扇区号

use derive_more::{Add, Display, From, Into};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Add, From, Into, Display,
)]
#[repr(transparent)]
pub struct SectorId(usize);

impl core::ops::Add<usize> for SectorId {
    type Output = Self;

    fn add(self, rhs: usize) -> Self::Output {
        self + Self(rhs)
    }
}

impl SectorId {
    /// 磁盘上的 0 号指针表示“未分配”
    pub const NULL: Self = Self(0);

    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> usize {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// 磁盘指针转扇区号，0 即为空
    #[inline]
    pub fn from_disk(ptr: u32) -> Option<Self> {
        (ptr != 0).then_some(Self(ptr as usize))
    }

    /// 扇区号转磁盘指针，磁盘上只有 32 位
    #[inline]
    pub fn to_disk(self) -> u32 {
        assert!(self.0 <= u32::MAX as usize, "sector {} out of disk range", self.0);
        self.0 as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_pointer() {
        assert_eq!(None, SectorId::from_disk(0));
        assert_eq!(Some(SectorId::new(7)), SectorId::from_disk(7));
        assert!(SectorId::NULL.is_null());
        assert_eq!(SectorId::new(8), SectorId::new(7) + 1);
    }
}
