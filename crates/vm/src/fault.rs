//! 缺页处理
//!
//! 缺页按如下顺序判定：
//!
//! 1. 空地址或内核地址：致命
//! 2. 页存在但访问违反权限（写保护）：致命
//! 3. 页不存在：
//!    - 地址落在栈增长窗口内且尚无页时，在该处新建可写匿名页
//!    - 在 SPT 中查找页，找不到则致命
//!    - 写访问只读页：致命
//!    - 让页驻留，失败则致命
//!
//! 致命缺页由调用者终止进程，本模块不做重试。

use crate::address::{Address, UsizeConvert, Vaddr};
use crate::config::vm_config;
use crate::error::VmError;
use crate::page::PageType;
use crate::spt::SupplementalPageTable;
use core::fmt;

/// 压栈指令在移动栈指针之前可能探测的字节数
const STACK_PUSH_SLACK: usize = 8;

/// 一次缺页的描述
#[derive(Clone, Copy, Debug)]
pub struct PageFault {
    /// 触发缺页的地址
    pub addr: Vaddr,
    /// 是否来自用户态
    pub user: bool,
    /// 是否为写访问
    pub write: bool,
    /// 硬件页表中是否没有该页的映射
    pub not_present: bool,
    /// 用户栈指针：用户态缺页取自陷入帧，内核态缺页取自进入内核时保存的值
    pub rsp: usize,
}

/// 致命缺页的原因
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultError {
    /// 空地址或内核地址
    BadAddress,
    /// 页存在但访问违反权限
    ProtectionViolation,
    /// SPT 中没有该地址的页
    NotFound,
    /// 写只读页
    WriteToReadOnly,
    /// 让页驻留失败
    Claim(VmError),
}

impl fmt::Display for FaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultError::BadAddress => f.write_str("bad address"),
            FaultError::ProtectionViolation => f.write_str("protection violation"),
            FaultError::NotFound => f.write_str("no page at address"),
            FaultError::WriteToReadOnly => f.write_str("write to read-only page"),
            FaultError::Claim(e) => write!(f, "claim failed: {}", e),
        }
    }
}

/// `addr` 是否可以作为栈增长处理
///
/// 窗口为 `[stack_top - max_stack_size, stack_top)`，并且地址不低于 `rsp - 8`。
pub fn is_stack_growth(addr: Vaddr, rsp: usize) -> bool {
    let config = vm_config();
    let top = config.user_stack_top();
    let limit = top.saturating_sub(config.max_stack_size());
    let addr = addr.as_usize();
    addr >= limit && addr < top && addr >= rsp.saturating_sub(STACK_PUSH_SLACK)
}

/// 处理一次缺页，成功时被中断的指令可以重新执行
pub fn handle_fault(spt: &mut SupplementalPageTable, fault: &PageFault) -> Result<(), FaultError> {
    let result = resolve(spt, fault);
    if let Err(e) = result {
        log::warn!(
            "fatal page fault at {:#x} ({} {} {}): {}",
            fault.addr,
            if fault.user { "user" } else { "kernel" },
            if fault.write { "write" } else { "read" },
            if fault.not_present { "not-present" } else { "present" },
            e
        );
    }
    result
}

fn resolve(spt: &mut SupplementalPageTable, fault: &PageFault) -> Result<(), FaultError> {
    let addr = fault.addr;
    if addr.is_null() || addr.as_usize() >= vm_config().user_space_end() {
        return Err(FaultError::BadAddress);
    }
    if !fault.not_present {
        return Err(FaultError::ProtectionViolation);
    }

    if spt.find(addr).is_none() && is_stack_growth(addr, fault.rsp) {
        let va = addr.align_down_to_page();
        spt.allocate_page(PageType::Anon, va, true, None)
            .map_err(FaultError::Claim)?;
        log::debug!("stack grown to {:#x}", va);
    }

    let page = spt.find(addr).ok_or(FaultError::NotFound)?;
    if fault.write && !page.lock().writable() {
        return Err(FaultError::WriteToReadOnly);
    }
    spt.vm().claim(&page).map_err(FaultError::Claim)
}
