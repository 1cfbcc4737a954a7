//! 中断控制的 Mock 实现

use core::sync::atomic::{AtomicBool, Ordering};

/// 用一个全局布尔值代替本地中断使能位
pub struct MockArchOps {
    enabled: AtomicBool,
}

impl MockArchOps {
    pub const fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
        }
    }
}

impl sync::ArchOps for MockArchOps {
    unsafe fn read_and_disable_interrupts(&self) -> usize {
        usize::from(self.enabled.swap(false, Ordering::SeqCst))
    }

    unsafe fn restore_interrupts(&self, flags: usize) {
        self.enabled.store(flags != 0, Ordering::SeqCst);
    }
}

/// 全局 Mock 实例
pub static MOCK_ARCH_OPS: MockArchOps = MockArchOps::new();
