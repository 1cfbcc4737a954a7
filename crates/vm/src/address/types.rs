//! 地址类型定义

use crate::arch_ops::arch_ops;
use crate::config::page_size;

/// 与 usize 之间的相互转换
pub trait UsizeConvert: Copy {
    /// 转换为 usize
    fn as_usize(&self) -> usize;
    /// 从 usize 构造
    fn from_usize(value: usize) -> Self;
}

/// 内存地址（物理或虚拟）
pub trait Address: UsizeConvert + Ord {
    /// 向下对齐到页边界
    fn align_down_to_page(self) -> Self {
        Self::from_usize(self.as_usize() & !(page_size() - 1))
    }

    /// 向上对齐到页边界，溢出时返回 `None`
    fn align_up_to_page(self) -> Option<Self> {
        let mask = page_size() - 1;
        self.as_usize()
            .checked_add(mask)
            .map(|v| Self::from_usize(v & !mask))
    }

    /// 页内偏移
    fn page_offset(self) -> usize {
        self.as_usize() & (page_size() - 1)
    }

    /// 是否页对齐
    fn is_page_aligned(self) -> bool {
        self.page_offset() == 0
    }
}

macro_rules! impl_address {
    ($type:ident) => {
        impl UsizeConvert for $type {
            fn as_usize(&self) -> usize {
                self.0
            }

            fn from_usize(value: usize) -> Self {
                Self(value)
            }
        }

        impl Address for $type {}

        impl core::fmt::LowerHex for $type {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::LowerHex::fmt(&self.0, f)
            }
        }
    };
}

/// 虚拟地址
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub struct Vaddr(pub usize);
impl_address!(Vaddr);

/// 物理地址
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub struct Paddr(pub usize);
impl_address!(Paddr);

impl Vaddr {
    /// 是否为空地址
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// 加上字节偏移，溢出时返回 `None`
    pub fn checked_add(self, bytes: usize) -> Option<Self> {
        self.0.checked_add(bytes).map(Self)
    }
}

impl Paddr {
    /// 通过直接映射区域得到内核可访问的虚拟地址
    pub fn to_kernel_vaddr(self) -> Vaddr {
        Vaddr(arch_ops().paddr_to_vaddr(self.0))
    }
}
