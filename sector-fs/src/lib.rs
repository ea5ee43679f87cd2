#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

/* sector-fs 的整体架构，自上而下 */

// 文件系统门面：创建、打开、关闭 inode，维护已打开 inode 表
mod fs;

// 索引节点层：按字节偏移读写文件，写时自动增长
mod inode;

// 磁盘数据结构层：inode 记录、间接块以及区段映射的容量计算
pub mod layout;

// 空闲扇区分配器
mod free_map;

// 后台代理：预读与定期刷盘
mod agent;

// 扇区缓存层：所有设备读写的唯一入口
mod cache;

mod error;
mod sector;

pub mod config;

pub use block_dev::BlockDevice;

pub use self::{
    agent::ReadAhead,
    cache::SectorCache,
    config::SECTOR_SIZE,
    error::Error,
    free_map::{FreeMap, SectorAllocator},
    fs::SectorFs,
    inode::Inode,
    layout::InodeKind,
    sector::SectorId,
};

#[cfg(feature = "std")]
pub use self::agent::{AgentHandle, spawn_periodic_flush, spawn_read_ahead};
