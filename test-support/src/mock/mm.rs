//! 内存管理相关操作的 Mock 实现
//!
//! 注意：这里不直接依赖 `vm` crate（避免循环依赖）。
//! `vm` crate 在 `cfg(test)` 下为这些类型实现其 trait
//! （例如 `ArchVmOps` / `VmConfig` / `FrameAllocator` / `PageTable`）。

use alloc::alloc::{alloc_zeroed, Layout};
use alloc::collections::BTreeMap;
use alloc::vec;
use alloc::vec::Vec;
use sync::SpinLock;

/// 测试使用的页大小
pub const MOCK_PAGE_SIZE: usize = 4096;

/// Mock 的内存管理架构操作
///
/// 采用“恒等映射”（vaddr == paddr），帧池中的物理地址就是宿主机上的指针。
pub struct MockVmOps;

impl MockVmOps {
    pub const fn new() -> Self {
        Self
    }

    /// 将虚拟地址转换为物理地址（测试默认：恒等映射）
    ///
    /// # Safety
    /// 仅用于测试环境的可控输入。
    pub unsafe fn vaddr_to_paddr(&self, vaddr: usize) -> usize {
        vaddr
    }

    /// 将物理地址转换为虚拟地址（测试默认：恒等映射）
    pub fn paddr_to_vaddr(&self, paddr: usize) -> usize {
        paddr
    }
}

/// 全局 Mock 实例
pub static MOCK_VM_OPS: MockVmOps = MockVmOps::new();

/// Mock 的内存布局配置
pub struct MockVmConfig;

impl MockVmConfig {
    pub const fn new() -> Self {
        Self
    }

    pub fn page_size(&self) -> usize {
        MOCK_PAGE_SIZE
    }

    pub fn user_stack_top(&self) -> usize {
        0x4748_0000
    }

    pub fn max_stack_size(&self) -> usize {
        1 << 20
    }

    pub fn user_space_end(&self) -> usize {
        0x80_0400_0000
    }
}

/// 全局 Mock 实例
pub static MOCK_VM_CONFIG: MockVmConfig = MockVmConfig::new();

/// 固定容量的物理帧池
///
/// 帧内存来自宿主机堆上一块页对齐、已清零的区域，生命周期与测试进程相同；
/// 分配状态用位图跟踪（0=空闲，1=已分配）。
pub struct MockFrameAllocator {
    base: usize,
    capacity: usize,
    bitmap: SpinLock<Vec<u64>>,
}

impl MockFrameAllocator {
    /// 创建包含 `frames` 个帧的帧池
    pub fn new(frames: usize) -> Self {
        let base = if frames == 0 {
            0
        } else {
            let layout = Layout::from_size_align(frames * MOCK_PAGE_SIZE, MOCK_PAGE_SIZE)
                .expect("frame pool layout");
            // SAFETY: layout 大小非零
            let ptr = unsafe { alloc_zeroed(layout) };
            assert!(!ptr.is_null(), "frame pool allocation failed");
            ptr as usize
        };
        Self {
            base,
            capacity: frames,
            bitmap: SpinLock::new(vec![0u64; frames.div_ceil(64)]),
        }
    }

    /// 分配一个帧，返回其物理地址
    pub fn alloc(&self) -> Option<usize> {
        let mut bitmap = self.bitmap.lock();
        for (word_idx, word) in bitmap.iter_mut().enumerate() {
            if *word == u64::MAX {
                continue;
            }
            let bit = word.trailing_ones() as usize;
            let idx = word_idx * 64 + bit;
            if idx >= self.capacity {
                return None;
            }
            *word |= 1 << bit;
            return Some(self.base + idx * MOCK_PAGE_SIZE);
        }
        None
    }

    /// 回收一个帧
    pub fn dealloc(&self, paddr: usize) {
        let idx = (paddr - self.base) / MOCK_PAGE_SIZE;
        assert!(idx < self.capacity, "frame {:#x} not from this pool", paddr);
        let mut bitmap = self.bitmap.lock();
        let mask = 1u64 << (idx % 64);
        assert!(bitmap[idx / 64] & mask != 0, "double free of frame {:#x}", paddr);
        bitmap[idx / 64] &= !mask;
    }

    /// 已分配的帧数
    pub fn allocated(&self) -> usize {
        self.bitmap
            .lock()
            .iter()
            .map(|w| w.count_ones() as usize)
            .sum()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// 页表项的原始位，取值与 `vm::PteFlags` 保持一致
pub mod pte_bits {
    pub const VALID: usize = 1 << 0;
    pub const WRITEABLE: usize = 1 << 2;
    pub const ACCESSED: usize = 1 << 6;
    pub const DIRTY: usize = 1 << 7;
}

/// 用 BTreeMap 模拟的单级硬件页表：vpn -> (ppn, flags)
pub struct MockPageTable {
    entries: SpinLock<BTreeMap<usize, (usize, usize)>>,
}

impl MockPageTable {
    pub fn new() -> Self {
        Self {
            entries: SpinLock::new(BTreeMap::new()),
        }
    }

    /// 建立映射，已存在时失败
    pub fn insert(&self, vpn: usize, ppn: usize, flags: usize) -> bool {
        let mut entries = self.entries.lock();
        if entries.contains_key(&vpn) {
            return false;
        }
        entries.insert(vpn, (ppn, flags));
        true
    }

    /// 解除映射，不存在时失败
    pub fn remove(&self, vpn: usize) -> bool {
        self.entries.lock().remove(&vpn).is_some()
    }

    pub fn lookup(&self, vpn: usize) -> Option<(usize, usize)> {
        self.entries.lock().get(&vpn).copied()
    }

    pub fn set_flags(&self, vpn: usize, flags: usize) -> bool {
        match self.entries.lock().get_mut(&vpn) {
            Some(entry) => {
                entry.1 = flags;
                true
            }
            None => false,
        }
    }

    /// 模拟 MMU 的一次访问：置 ACCESSED，写访问再置 DIRTY。
    ///
    /// 返回 false 表示会触发缺页（未映射或写只读页）。
    pub fn touch(&self, vpn: usize, write: bool) -> bool {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(&vpn) else {
            return false;
        };
        if write && entry.1 & pte_bits::WRITEABLE == 0 {
            return false;
        }
        entry.1 |= pte_bits::ACCESSED;
        if write {
            entry.1 |= pte_bits::DIRTY;
        }
        true
    }

    pub fn mapped_count(&self) -> usize {
        self.entries.lock().len()
    }
}

impl Default for MockPageTable {
    fn default() -> Self {
        Self::new()
    }
}
