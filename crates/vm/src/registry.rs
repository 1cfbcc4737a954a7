//! 全局 trait 对象槽
//!
//! 内核在启动时注册 `&'static dyn Trait`，之后任意上下文都可以无锁读取。
//! fat pointer 拆成 data 与 vtable 两个原子量保存，data 为 0 表示尚未注册。

/// 定义一个保存 `&'static dyn $trait` 的槽类型 `$slot`
macro_rules! trait_object_slot {
    ($slot:ident, $trait:ident) => {
        struct $slot {
            data: core::sync::atomic::AtomicUsize,
            vtable: core::sync::atomic::AtomicUsize,
        }

        impl $slot {
            const fn new() -> Self {
                Self {
                    data: core::sync::atomic::AtomicUsize::new(0),
                    vtable: core::sync::atomic::AtomicUsize::new(0),
                }
            }

            fn set(&self, object: &'static dyn $trait) {
                use core::sync::atomic::Ordering;
                let ptr = object as *const dyn $trait;
                // SAFETY: `*const dyn Trait` 由 (data, vtable) 两个 usize 组成
                let [data, vtable] =
                    unsafe { core::mem::transmute::<*const dyn $trait, [usize; 2]>(ptr) };
                self.vtable.store(vtable, Ordering::Release);
                self.data.store(data, Ordering::Release);
            }

            fn get(&self) -> Option<&'static dyn $trait> {
                use core::sync::atomic::Ordering;
                let data = self.data.load(Ordering::Acquire);
                if data == 0 {
                    return None;
                }
                let vtable = self.vtable.load(Ordering::Acquire);
                // SAFETY: 两部分来自 `set` 保存的 `&'static dyn Trait`
                Some(unsafe {
                    &*core::mem::transmute::<[usize; 2], *const dyn $trait>([data, vtable])
                })
            }
        }
    };
}

pub(crate) use trait_object_slot;
