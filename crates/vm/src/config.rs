//! 内存布局配置

use crate::registry::trait_object_slot;

/// 虚拟内存布局常量，由内核在启动时注册
pub trait VmConfig: Send + Sync {
    /// 页大小，必须是 2 的幂
    fn page_size(&self) -> usize;

    /// 用户栈顶（不包含），初始栈页位于其下方
    fn user_stack_top(&self) -> usize;

    /// 用户栈最大尺寸，栈增长不会越过 `user_stack_top - max_stack_size`
    fn max_stack_size(&self) -> usize;

    /// 用户地址空间上界（不包含），其上为内核地址
    fn user_space_end(&self) -> usize;
}

trait_object_slot!(ConfigSlot, VmConfig);

static CONFIG: ConfigSlot = ConfigSlot::new();

/// 注册布局配置
///
/// # Safety
/// 只能在启动阶段单线程调用一次，且必须早于任何其他 vm 接口
pub unsafe fn register_config(config: &'static dyn VmConfig) {
    CONFIG.set(config);
}

/// 已注册的布局配置
///
/// # Panics
/// 尚未调用 [`register_config`] 时 panic
#[inline]
pub fn vm_config() -> &'static dyn VmConfig {
    match CONFIG.get() {
        Some(config) => config,
        None => panic!("vm: VmConfig not registered"),
    }
}

#[inline]
pub(crate) fn page_size() -> usize {
    vm_config().page_size()
}
