//! sector-fs 用到的常量

use core::time::Duration;

/// 扇区大小，也是缓存、inode 记录与间接块的大小
pub const SECTOR_SIZE: usize = 512;

/// 扇区缓存的槽位数
pub const CACHE_CAPACITY: usize = 64;

/// 定期刷盘的间隔
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(10);
