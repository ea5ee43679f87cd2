use core::fmt;

/// 可恢复的错误：空间不足与超出最大长度；设备故障、磁盘记录损坏直接 panic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// 分配器已无空闲扇区
    NoSpace,
    /// 超出单个文件的最大长度
    TooLarge,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSpace => f.write_str("no free sector left"),
            Self::TooLarge => f.write_str("file size exceeds the extent capacity"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
