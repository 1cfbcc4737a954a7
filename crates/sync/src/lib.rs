//! 同步原语
//!
//! 向虚拟内存子系统提供自旋锁与中断保护。
//!
//! # 架构依赖
//!
//! 此 crate 通过 [`ArchOps`] trait 抽象本地中断的开关。
//! 内核启动时调用 [`register_arch_ops`] 注册实现后，持锁期间会屏蔽本地中断；
//! 未注册时（例如宿主机单元测试）锁退化为纯自旋锁。

#![no_std]

mod intr_guard;
mod raw_spin_lock;
mod spin_lock;

pub use intr_guard::IntrGuard;
pub use raw_spin_lock::RawSpinLock;
pub use spin_lock::{SpinLock, SpinLockGuard};

use core::sync::atomic::{AtomicUsize, Ordering};

/// 本地中断控制，由内核按架构实现
pub trait ArchOps: Send + Sync {
    /// 关闭本地中断，返回关闭前的状态
    ///
    /// # Safety
    /// 返回值必须原样交给 [`ArchOps::restore_interrupts`]
    unsafe fn read_and_disable_interrupts(&self) -> usize;

    /// 恢复到 `flags` 描述的中断状态
    ///
    /// # Safety
    /// `flags` 必须来自 [`ArchOps::read_and_disable_interrupts`]
    unsafe fn restore_interrupts(&self, flags: usize);
}

/// `&'static dyn ArchOps` 拆成 data 与 vtable 保存，data 为 0 表示未注册
struct ArchOpsSlot {
    data: AtomicUsize,
    vtable: AtomicUsize,
}

impl ArchOpsSlot {
    const fn new() -> Self {
        Self {
            data: AtomicUsize::new(0),
            vtable: AtomicUsize::new(0),
        }
    }

    fn set(&self, ops: &'static dyn ArchOps) {
        // SAFETY: `*const dyn ArchOps` 由 (data, vtable) 两个 usize 组成
        let [data, vtable] =
            unsafe { core::mem::transmute::<*const dyn ArchOps, [usize; 2]>(ops as *const dyn ArchOps) };
        self.vtable.store(vtable, Ordering::Release);
        self.data.store(data, Ordering::Release);
    }

    fn get(&self) -> Option<&'static dyn ArchOps> {
        let data = self.data.load(Ordering::Acquire);
        if data == 0 {
            return None;
        }
        let vtable = self.vtable.load(Ordering::Acquire);
        // SAFETY: 两部分来自 `set` 保存的 'static 引用
        Some(unsafe { &*core::mem::transmute::<[usize; 2], *const dyn ArchOps>([data, vtable]) })
    }
}

static ARCH_OPS: ArchOpsSlot = ArchOpsSlot::new();

/// 注册中断控制实现
///
/// # Safety
/// 只能在启动阶段单线程调用一次，且早于任何锁的使用
pub unsafe fn register_arch_ops(ops: &'static dyn ArchOps) {
    ARCH_OPS.set(ops);
}

#[inline]
pub(crate) fn arch_ops() -> Option<&'static dyn ArchOps> {
    ARCH_OPS.get()
}
