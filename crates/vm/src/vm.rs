//! 虚拟内存上下文
//!
//! [`Vm`] 拥有所有地址空间共享的帧表和交换表，各页表通过 `Arc` 持有它。

use crate::error::VmResult;
use crate::frame_table::{frame_bytes, FrameAllocator, FrameTable};
use crate::page::PageRef;
use crate::swap::SwapTable;
use alloc::sync::Arc;

/// 帧表与交换表的持有者
pub struct Vm {
    frames: FrameTable,
    swap: SwapTable,
}

impl Vm {
    /// 创建上下文
    pub fn new(allocator: Arc<dyn FrameAllocator>, swap: SwapTable) -> Self {
        Self {
            frames: FrameTable::new(allocator),
            swap,
        }
    }

    /// 帧表
    pub fn frames(&self) -> &FrameTable {
        &self.frames
    }

    /// 交换表
    pub fn swap(&self) -> &SwapTable {
        &self.swap
    }

    /// 让页驻留：取得帧、建立硬件映射、换入内容，最后把帧交给页
    ///
    /// 页已驻留时什么也不做。任何一步失败都会撤销映射并归还帧。
    pub(crate) fn claim(&self, page_ref: &PageRef) -> VmResult<()> {
        if page_ref.lock().is_resident() {
            return Ok(());
        }
        let frame = self.frames.acquire_frame(&self.swap)?;

        let mut page = page_ref.lock();
        if page.is_resident() {
            self.frames.release(frame.id);
            return Ok(());
        }
        if let Err(e) = page.map_to(frame.ppn()) {
            self.frames.release(frame.id);
            return Err(e);
        }
        if let Err(e) = page.swap_in(&self.swap, frame_bytes(frame.paddr)) {
            let _ = page.page_table().unmap(page.vpn());
            self.frames.release(frame.id);
            return Err(e);
        }
        page.set_frame(Some(frame.id));
        self.frames.install(frame.id, page_ref);
        log::debug!("page {:#x} claimed frame {:?}", page.va(), frame.id);
        Ok(())
    }

    /// 销毁页：写回、释放槽位、解除映射，并断开与帧的关联
    pub(crate) fn destroy_page(&self, page_ref: &PageRef) {
        let mut page = page_ref.lock();
        let paddr = page.frame().and_then(|id| self.frames.paddr(id));
        let contents = paddr.map(|p| &*frame_bytes(p));
        if let Some(id) = page.destroy(&self.swap, contents) {
            self.frames.unlink(id, page_ref);
        }
    }
}
