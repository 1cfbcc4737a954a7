//! 本地中断屏蔽
//!
//! 屏蔽中断只排除同一 CPU 上的中断处理程序，跨 CPU 的互斥仍由自旋锁负责。

use crate::arch_ops;

/// 存活期间屏蔽本地中断，drop 时恢复进入前的状态
///
/// 未注册 [`crate::ArchOps`] 时不做任何事。
pub struct IntrGuard {
    flags: Option<usize>,
}

impl IntrGuard {
    /// 屏蔽本地中断
    pub fn new() -> Self {
        // SAFETY: 保存的状态只会在 drop 时被恢复一次
        let flags = arch_ops().map(|ops| unsafe { ops.read_and_disable_interrupts() });
        Self { flags }
    }

    /// 放弃恢复责任，返回保存的中断状态。
    ///
    /// 供锁在 `lock`/`unlock` 分离的场景下自行保存状态。
    pub(crate) fn into_flags(self) -> Option<usize> {
        let flags = self.flags;
        core::mem::forget(self);
        flags
    }

    /// 用之前保存的状态恢复中断
    pub(crate) fn restore(flags: Option<usize>) {
        if let (Some(flags), Some(ops)) = (flags, arch_ops()) {
            // SAFETY: flags 来自 read_and_disable_interrupts
            unsafe { ops.restore_interrupts(flags) };
        }
    }
}

impl Default for IntrGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IntrGuard {
    fn drop(&mut self) {
        Self::restore(self.flags);
    }
}
