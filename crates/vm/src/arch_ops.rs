//! 物理地址与内核直接映射之间的转换

use crate::registry::trait_object_slot;

/// 架构相关的地址转换
///
/// 帧的内容通过内核直接映射访问，换入换出和 fork 复制都依赖它。
pub trait ArchVmOps: Send + Sync {
    /// 直接映射中的内核虚拟地址转为物理地址
    ///
    /// # Safety
    /// `vaddr` 必须位于直接映射区域
    unsafe fn vaddr_to_paddr(&self, vaddr: usize) -> usize;

    /// 物理地址在直接映射中的内核虚拟地址
    fn paddr_to_vaddr(&self, paddr: usize) -> usize;
}

trait_object_slot!(ArchOpsSlot, ArchVmOps);

static ARCH_OPS: ArchOpsSlot = ArchOpsSlot::new();

/// 注册地址转换实现
///
/// # Safety
/// 只能在启动阶段单线程调用一次
pub unsafe fn register_arch_ops(ops: &'static dyn ArchVmOps) {
    ARCH_OPS.set(ops);
}

/// 已注册的地址转换实现
///
/// # Panics
/// 尚未调用 [`register_arch_ops`] 时 panic
#[inline]
pub fn arch_ops() -> &'static dyn ArchVmOps {
    match ARCH_OPS.get() {
        Some(ops) => ops,
        None => panic!("vm: ArchVmOps not registered"),
    }
}
