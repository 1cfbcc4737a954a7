//! 匿名页

use super::{PageCtx, PageOperations};
use crate::error::VmResult;
use crate::swap::SwapSlot;

/// 没有文件后备的页，换出时写入交换槽位
pub struct AnonPage {
    slot: Option<SwapSlot>,
}

impl AnonPage {
    pub(crate) fn new() -> Self {
        Self { slot: None }
    }

    /// 内容所在的交换槽位，从未被换出时为 `None`
    pub fn slot(&self) -> Option<SwapSlot> {
        self.slot
    }
}

impl PageOperations for AnonPage {
    fn swap_in(&mut self, ctx: &PageCtx<'_>, frame: &mut [u8]) -> VmResult<()> {
        match self.slot {
            Some(slot) => {
                ctx.swap.read_slot(slot, frame)?;
                ctx.swap.free_slot(slot);
                self.slot = None;
            }
            None => frame.fill(0),
        }
        Ok(())
    }

    fn swap_out(&mut self, ctx: &PageCtx<'_>, frame: &[u8]) -> VmResult<()> {
        let slot = ctx.swap.allocate_slot()?;
        if let Err(e) = ctx.swap.write_slot(slot, frame) {
            ctx.swap.free_slot(slot);
            return Err(e);
        }
        self.slot = Some(slot);
        Ok(())
    }

    fn destroy(&mut self, ctx: &PageCtx<'_>, _frame: Option<&[u8]>) {
        if let Some(slot) = self.slot.take() {
            ctx.swap.free_slot(slot);
        }
    }
}
