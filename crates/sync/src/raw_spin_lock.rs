//! 原始自旋锁
//!
//! 实现 [`lock_api::RawMutex`]，获取锁时屏蔽本地中断，释放锁时恢复。

use crate::intr_guard::IntrGuard;
use core::{
    hint,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

/// 未保存中断状态时的占位值
const NO_FLAGS: usize = usize::MAX;

/// 原始自旋锁，不可重入。
///
/// 持锁者保存的中断状态存放在锁内部，只有持锁者会读写它。
#[derive(Debug)]
pub struct RawSpinLock {
    locked: AtomicBool,
    saved_flags: AtomicUsize,
}

impl RawSpinLock {
    /// 创建一个未上锁的实例
    pub const fn new() -> Self {
        RawSpinLock {
            locked: AtomicBool::new(false),
            saved_flags: AtomicUsize::new(NO_FLAGS),
        }
    }

    fn try_acquire(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    fn save(&self, guard: IntrGuard) {
        let flags = guard.into_flags().unwrap_or(NO_FLAGS);
        self.saved_flags.store(flags, Ordering::Relaxed);
    }
}

impl Default for RawSpinLock {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: 同一时刻只有一个持有者能把 locked 从 false 置为 true
unsafe impl lock_api::RawMutex for RawSpinLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = RawSpinLock::new();

    type GuardMarker = lock_api::GuardNoSend;

    fn lock(&self) {
        loop {
            let guard = IntrGuard::new();
            if self.try_acquire() {
                self.save(guard);
                return;
            }
            // 自旋等待期间允许本地中断
            drop(guard);
            while self.locked.load(Ordering::Relaxed) {
                hint::spin_loop();
            }
        }
    }

    fn try_lock(&self) -> bool {
        let guard = IntrGuard::new();
        if self.try_acquire() {
            self.save(guard);
            true
        } else {
            false
        }
    }

    unsafe fn unlock(&self) {
        let flags = self.saved_flags.swap(NO_FLAGS, Ordering::Relaxed);
        self.locked.store(false, Ordering::Release);
        IntrGuard::restore((flags != NO_FLAGS).then_some(flags));
    }

    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}
