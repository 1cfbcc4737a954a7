//! 页码
//!
//! [`Vpn`] 是补充页表与硬件页表的键，[`Ppn`] 用于建立映射。

use crate::address::types::{Address, Paddr, UsizeConvert, Vaddr};
use crate::config::page_size;

/// 页码：地址除以页大小
pub trait PageNum: UsizeConvert + Ord {
    /// 对应的地址类型
    type TAddress: Address;

    /// 向后偏移 `pages` 页
    fn offset(self, pages: usize) -> Self {
        Self::from_usize(self.as_usize() + pages)
    }

    /// 包含 `addr` 的页
    fn from_addr_floor(addr: Self::TAddress) -> Self {
        Self::from_usize(addr.as_usize() / page_size())
    }

    /// 页的起始地址
    fn start_addr(self) -> Self::TAddress {
        Self::TAddress::from_usize(self.as_usize() * page_size())
    }
}

macro_rules! impl_page_num {
    ($type:ty, $addr_type:ty) => {
        impl UsizeConvert for $type {
            fn as_usize(&self) -> usize {
                self.0
            }

            fn from_usize(value: usize) -> Self {
                Self(value)
            }
        }

        impl PageNum for $type {
            type TAddress = $addr_type;
        }
    };
}

/// 物理页码
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Ppn(pub usize);
impl_page_num!(Ppn, Paddr);

/// 虚拟页码
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Vpn(pub usize);
impl_page_num!(Vpn, Vaddr);

/// 连续的虚拟页 `[start, end)`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VpnRange {
    /// 第一页
    pub start: Vpn,
    /// 最后一页之后
    pub end: Vpn,
}

impl VpnRange {
    /// 从 `start` 开始的 `pages` 页
    pub fn from_start_len(start: Vpn, pages: usize) -> Self {
        Self {
            start,
            end: start.offset(pages),
        }
    }

    /// 页数
    pub fn len(&self) -> usize {
        self.end.0.saturating_sub(self.start.0)
    }

    /// 是否不含任何页
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 是否包含 `vpn`
    pub fn contains(&self, vpn: Vpn) -> bool {
        (self.start..self.end).contains(&vpn)
    }
}

impl IntoIterator for VpnRange {
    type Item = Vpn;
    type IntoIter = core::iter::Map<core::ops::Range<usize>, fn(usize) -> Vpn>;

    fn into_iter(self) -> Self::IntoIter {
        (self.start.0..self.end.0).map(Vpn as fn(usize) -> Vpn)
    }
}
