//! 硬件页表接口
//!
//! 虚拟内存子系统只通过 [`PageTable`] 操作硬件地址转换结构，
//! 从而把“按需分页逻辑”与“页表硬件细节”解耦。每个地址空间有自己的实现实例。

use crate::address::{Ppn, Vpn};
use crate::error::VmResult;
use bitflags::bitflags;

bitflags! {
    /// 与架构无关的页表项标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PteFlags: usize {
        /// 表项有效
        const VALID = 1 << 0;
        /// 可读
        const READABLE = 1 << 1;
        /// 可写
        const WRITEABLE = 1 << 2;
        /// 可执行
        const EXECUTABLE = 1 << 3;
        /// 用户态可访问
        const USER = 1 << 4;
        /// 全局映射
        const GLOBAL = 1 << 5;
        /// 自上次清除以来被访问过（硬件置位）
        const ACCESSED = 1 << 6;
        /// 自上次清除以来被写过（硬件置位）
        const DIRTY = 1 << 7;
    }
}

impl PteFlags {
    /// 用户页的标志
    pub fn user_page(writable: bool) -> Self {
        let flags = PteFlags::VALID | PteFlags::READABLE | PteFlags::USER;
        if writable {
            flags | PteFlags::WRITEABLE
        } else {
            flags
        }
    }
}

/// 一个地址空间的硬件页表
///
/// 方法都取 `&self`，实现需要自行保证内部可变性：
/// 换出时会从另一个进程的上下文操作本页表。
pub trait PageTable: Send + Sync {
    /// 映射虚拟页到物理页，已存在映射时返回 `AlreadyMapped`
    fn map(&self, vpn: Vpn, ppn: Ppn, flags: PteFlags) -> VmResult<()>;

    /// 解除映射，不存在映射时返回 `NotMapped`
    fn unmap(&self, vpn: Vpn) -> VmResult<()>;

    /// 翻译虚拟页
    fn translate(&self, vpn: Vpn) -> Option<Ppn>;

    /// 读取页表项标志
    fn flags(&self, vpn: Vpn) -> Option<PteFlags>;

    /// 覆盖页表项标志
    fn update_flags(&self, vpn: Vpn, flags: PteFlags) -> VmResult<()>;

    /// 页是否被访问过
    fn is_accessed(&self, vpn: Vpn) -> bool {
        self.flags(vpn)
            .is_some_and(|f| f.contains(PteFlags::ACCESSED))
    }

    /// 清除访问位
    fn clear_accessed(&self, vpn: Vpn) {
        if let Some(flags) = self.flags(vpn) {
            let _ = self.update_flags(vpn, flags - PteFlags::ACCESSED);
        }
    }

    /// 页是否被写过
    fn is_dirty(&self, vpn: Vpn) -> bool {
        self.flags(vpn).is_some_and(|f| f.contains(PteFlags::DIRTY))
    }

    /// 清除脏位
    fn clear_dirty(&self, vpn: Vpn) {
        if let Some(flags) = self.flags(vpn) {
            let _ = self.update_flags(vpn, flags - PteFlags::DIRTY);
        }
    }
}
