//! 帧表
//!
//! 帧表登记从物理帧分配器取得的所有帧，以及当前驻留在每个帧上的页。
//! 它是所有地址空间共享的结构，由一把自旋锁保护。
//!
//! ## 帧的获取与换出
//!
//! [`FrameTable::acquire_frame`] 先向分配器要新帧；分配器耗尽时按分配顺序做
//! 二次机会（clock）扫描，每次都从头开始，最多两轮：
//!
//! 1. 没有存活页的帧直接作为牺牲帧
//! 2. 预留中的帧（刚分配、尚未与页关联）跳过
//! 3. 页锁被占用的帧跳过
//! 4. 第一轮中访问位被置的帧清除访问位后跳过，否则选为牺牲帧
//! 5. 第二轮无条件选择第一个可加锁的帧
//!
//! 两轮都找不到时返回 [`VmError::OutOfMemory`]。
//!
//! ## 加锁顺序
//!
//! 允许在持有页锁时获取帧表锁；帧表持锁扫描时对页只使用 `try_lock`，
//! 因此两个方向不会互相等待。
//!
//! ## 帧的回收
//!
//! 帧上最后一个页被销毁后，帧从帧表中移除并归还给分配器。

use crate::address::{Paddr, PageNum, Ppn, UsizeConvert};
use crate::config::page_size;
use crate::error::{VmError, VmResult};
use crate::page::{Page, PageRef};
use crate::swap::SwapTable;
use alloc::collections::BTreeMap;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use sync::SpinLock;

/// 物理帧分配器
pub trait FrameAllocator: Send + Sync {
    /// 分配一个物理帧，耗尽时返回 `None`
    fn alloc_frame(&self) -> Option<Paddr>;

    /// 归还一个物理帧
    fn dealloc_frame(&self, paddr: Paddr);
}

/// 帧在帧表中的编号，按分配顺序递增
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct FrameId(usize);

/// 交给调用者的帧：处于预留状态，内容已清零
#[derive(Clone, Copy, Debug)]
pub struct FrameHandle {
    /// 帧编号
    pub id: FrameId,
    /// 物理地址
    pub paddr: Paddr,
}

impl FrameHandle {
    /// 物理页号
    pub fn ppn(&self) -> Ppn {
        Ppn::from_addr_floor(self.paddr)
    }
}

/// 一个物理帧
struct Frame {
    paddr: Paddr,
    /// 刚被取出、尚未与页关联，扫描时跳过
    reserved: bool,
    /// 驻留在此帧上的页；第一个是拥有者，其余是 fork 后共享此帧的文件页
    mappings: Vec<Weak<SpinLock<Page>>>,
}

struct FrameTableInner {
    frames: BTreeMap<FrameId, Frame>,
    next_id: usize,
}

/// 全局帧表
pub struct FrameTable {
    allocator: Arc<dyn FrameAllocator>,
    inner: SpinLock<FrameTableInner>,
}

/// 通过直接映射区域访问帧的内容
pub(crate) fn frame_bytes<'a>(paddr: Paddr) -> &'a mut [u8] {
    let kva = paddr.to_kernel_vaddr().as_usize();
    // SAFETY: 帧由帧表跟踪，整页位于直接映射区域内且可读写
    unsafe { core::slice::from_raw_parts_mut(kva as *mut u8, page_size()) }
}

impl FrameTable {
    /// 创建空的帧表
    pub fn new(allocator: Arc<dyn FrameAllocator>) -> Self {
        Self {
            allocator,
            inner: SpinLock::new(FrameTableInner {
                frames: BTreeMap::new(),
                next_id: 0,
            }),
        }
    }

    /// 取得一个已清零、处于预留状态的帧
    ///
    /// 分配器耗尽时换出一个牺牲帧；没有可换出的帧时返回 `OutOfMemory`，
    /// 换出过程中的交换或写回失败原样返回。
    pub fn acquire_frame(&self, swap: &SwapTable) -> VmResult<FrameHandle> {
        let mut inner = self.inner.lock();
        if let Some(paddr) = self.allocator.alloc_frame() {
            frame_bytes(paddr).fill(0);
            let id = FrameId(inner.next_id);
            inner.next_id += 1;
            inner.frames.insert(
                id,
                Frame {
                    paddr,
                    reserved: true,
                    mappings: Vec::new(),
                },
            );
            return Ok(FrameHandle { id, paddr });
        }

        for second_chance_used in [false, true] {
            for (&id, frame) in inner.frames.iter_mut() {
                if frame.reserved {
                    continue;
                }
                let pages: Vec<PageRef> = frame.mappings.iter().filter_map(Weak::upgrade).collect();
                if pages.is_empty() {
                    frame.mappings.clear();
                    return Ok(Self::take(id, frame));
                }

                let mut guards = Vec::with_capacity(pages.len());
                for page in &pages {
                    match page.try_lock() {
                        Some(guard) => guards.push(guard),
                        None => break,
                    }
                }
                if guards.len() != pages.len() {
                    continue;
                }

                if !second_chance_used && guards.iter().any(|g| g.is_accessed()) {
                    guards.iter().for_each(|g| g.clear_accessed());
                    continue;
                }

                log::info!(
                    "evicting frame {:?} at {:#x} ({} mapping(s))",
                    id,
                    frame.paddr,
                    guards.len()
                );
                let bytes = frame_bytes(frame.paddr);
                let mut result = Ok(());
                for guard in guards.iter_mut() {
                    if let Err(e) = guard.swap_out(swap, bytes) {
                        result = Err(e);
                        break;
                    }
                }
                frame.mappings = pages
                    .iter()
                    .zip(&guards)
                    .filter(|(_, g)| g.is_resident())
                    .map(|(p, _)| Arc::downgrade(p))
                    .collect();
                if let Err(e) = result {
                    log::error!("eviction of frame {:?} failed: {}", id, e);
                    return Err(e);
                }
                return Ok(Self::take(id, frame));
            }
        }

        log::warn!("no evictable frame among {} frames", inner.frames.len());
        Err(VmError::OutOfMemory)
    }

    /// 把换出后的帧清零并预留给调用者
    fn take(id: FrameId, frame: &mut Frame) -> FrameHandle {
        frame_bytes(frame.paddr).fill(0);
        frame.reserved = true;
        FrameHandle {
            id,
            paddr: frame.paddr,
        }
    }

    /// 将预留帧交给 `page`，解除预留
    pub(crate) fn install(&self, id: FrameId, page: &PageRef) {
        let mut inner = self.inner.lock();
        if let Some(frame) = inner.frames.get_mut(&id) {
            frame.mappings.clear();
            frame.mappings.push(Arc::downgrade(page));
            frame.reserved = false;
        }
    }

    /// 让 `page` 与已有的页共享帧
    pub(crate) fn alias(&self, id: FrameId, page: &PageRef) -> VmResult<()> {
        let mut inner = self.inner.lock();
        let frame = inner.frames.get_mut(&id).ok_or(VmError::NotMapped)?;
        frame.mappings.push(Arc::downgrade(page));
        Ok(())
    }

    /// 断开 `page` 与帧的关联；帧上不再有页时回收帧
    pub(crate) fn unlink(&self, id: FrameId, page: &PageRef) {
        let mut inner = self.inner.lock();
        let Some(frame) = inner.frames.get_mut(&id) else {
            return;
        };
        let target = Arc::as_ptr(page);
        frame
            .mappings
            .retain(|w| w.strong_count() > 0 && !core::ptr::eq(w.as_ptr(), target));
        if frame.mappings.is_empty() && !frame.reserved {
            if let Some(frame) = inner.frames.remove(&id) {
                self.allocator.dealloc_frame(frame.paddr);
            }
        }
    }

    /// 归还一个预留后未能使用的帧
    pub(crate) fn release(&self, id: FrameId) {
        let mut inner = self.inner.lock();
        if let Some(frame) = inner.frames.remove(&id) {
            debug_assert!(frame.mappings.is_empty());
            self.allocator.dealloc_frame(frame.paddr);
        }
    }

    /// 帧的物理地址
    pub fn paddr(&self, id: FrameId) -> Option<Paddr> {
        self.inner.lock().frames.get(&id).map(|f| f.paddr)
    }

    /// 驻留在帧上的页（拥有者在前）
    pub fn resident_pages(&self, id: FrameId) -> Vec<PageRef> {
        self.inner
            .lock()
            .frames
            .get(&id)
            .map(|f| f.mappings.iter().filter_map(Weak::upgrade).collect())
            .unwrap_or_default()
    }

    /// 帧表中的帧编号，按分配顺序
    pub fn frame_ids(&self) -> Vec<FrameId> {
        self.inner.lock().frames.keys().copied().collect()
    }

    /// 帧表中的帧数
    pub fn len(&self) -> usize {
        self.inner.lock().frames.len()
    }

    /// 帧表是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
