//! 虚拟内存子系统
//!
//! 为每个进程提供按需分页：页在首次访问时才分配物理帧并填充内容，
//! 物理内存不足时按二次机会策略换出其他页（匿名页写入交换分区，文件页写回文件），
//! 并支持文件映射与 fork 时的地址空间复制。
//!
//! # 组成
//!
//! - [`SupplementalPageTable`]：每个地址空间一个，虚拟页到 [`Page`] 的映射
//! - [`Page`]：未初始化 / 匿名 / 文件 / 页缓存四种变体
//! - [`FrameTable`]：全局帧表与换出策略
//! - [`SwapTable`]：交换分区槽位
//! - [`handle_fault`]：缺页处理与栈增长
//! - [`AddressSpace`]：面向进程层的入口
//!
//! # 架构解耦
//!
//! 通过 trait 抽象与外部组件解耦：
//! - [`ArchVmOps`]：物理地址与直接映射区域之间的转换
//! - [`VmConfig`]：内存布局常量
//! - [`FrameAllocator`]、[`PageTable`]、[`VmFile`]、[`BlockDevice`]：物理帧、硬件页表、文件与交换设备
//!
//! 使用前必须调用 [`register_arch_ops`] 和 [`register_config`] 注册实现。

#![no_std]

extern crate alloc;

mod arch_ops;
mod config;
mod error;
mod file;
mod registry;
mod vm;

pub mod address;
pub mod fault;
pub mod frame_table;
mod mmap;
pub mod page;
pub mod page_table;
pub mod space;
pub mod spt;
pub mod swap;

#[cfg(test)]
mod tests;

pub use arch_ops::{arch_ops, register_arch_ops, ArchVmOps};
pub use config::{register_config, vm_config, VmConfig};
pub use error::{VmError, VmResult};
pub use file::VmFile;
pub use vm::Vm;

pub use address::{Address, PageNum, Paddr, Ppn, UsizeConvert, Vaddr, Vpn, VpnRange};
pub use fault::{handle_fault, FaultError, PageFault};
pub use frame_table::{FrameAllocator, FrameHandle, FrameId, FrameTable};
pub use page::{
    FileSegment, Page, PageInitializer, PageKind, PageRef, PageType, PageVariant,
};
pub use page_table::{PageTable, PteFlags};
pub use space::AddressSpace;
pub use spt::SupplementalPageTable;
pub use swap::{BlockDevice, SwapSlot, SwapTable};
