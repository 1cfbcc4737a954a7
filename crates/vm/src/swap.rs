//! 交换分区
//!
//! 交换分区被划分为固定大小的槽位，每个槽位恰好存放一页，用整数编号寻址。
//! 槽位的占用状态用位图跟踪（0=空闲，1=已占用），由独立的自旋锁保护；
//! 设备读写在锁外进行，因此不会在 I/O 期间阻塞其他槽位的分配与释放。

use crate::config::page_size;
use crate::error::{VmError, VmResult};
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use sync::SpinLock;

/// 交换分区所在的块设备
pub trait BlockDevice: Send + Sync {
    /// 读取一个块，`buf` 长度必须等于块大小；成功返回 true
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> bool;

    /// 写入一个块，`buf` 长度必须等于块大小；成功返回 true
    fn write_block(&self, block_id: usize, buf: &[u8]) -> bool;

    /// 块大小（字节）
    fn block_size(&self) -> usize;

    /// 块总数
    fn total_blocks(&self) -> usize;
}

/// 交换槽位编号
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct SwapSlot(usize);

impl SwapSlot {
    /// 槽位下标
    pub fn index(self) -> usize {
        self.0
    }
}

struct SlotBitmap {
    bits: Vec<u64>,
    capacity: usize,
    used: usize,
}

impl SlotBitmap {
    fn new(capacity: usize) -> Self {
        Self {
            bits: vec![0; capacity.div_ceil(64)],
            capacity,
            used: 0,
        }
    }

    /// 找到编号最小的空闲槽位并占用
    fn alloc(&mut self) -> Option<usize> {
        for (word_idx, word) in self.bits.iter_mut().enumerate() {
            if *word == u64::MAX {
                continue;
            }
            let bit = word.trailing_ones() as usize;
            let idx = word_idx * 64 + bit;
            if idx >= self.capacity {
                return None;
            }
            *word |= 1 << bit;
            self.used += 1;
            return Some(idx);
        }
        None
    }

    fn free(&mut self, idx: usize) {
        let mask = 1u64 << (idx % 64);
        debug_assert!(self.bits[idx / 64] & mask != 0, "swap slot {} double free", idx);
        if self.bits[idx / 64] & mask != 0 {
            self.bits[idx / 64] &= !mask;
            self.used -= 1;
        }
    }
}

/// 交换表：槽位分配器加上槽位读写
pub struct SwapTable {
    device: Option<Arc<dyn BlockDevice>>,
    blocks_per_slot: usize,
    slots: SpinLock<SlotBitmap>,
}

impl SwapTable {
    /// 在块设备上建立交换表
    ///
    /// 槽位数 = 设备容量 / 页大小；页大小必须是块大小的整数倍。
    pub fn new(device: Arc<dyn BlockDevice>) -> VmResult<Self> {
        let block_size = device.block_size();
        if block_size == 0 || page_size() % block_size != 0 {
            return Err(VmError::InvalidArgument);
        }
        let blocks_per_slot = page_size() / block_size;
        let capacity = device.total_blocks() / blocks_per_slot;
        log::debug!("swap: {} slots of {} blocks", capacity, blocks_per_slot);
        Ok(Self {
            device: Some(device),
            blocks_per_slot,
            slots: SpinLock::new(SlotBitmap::new(capacity)),
        })
    }

    /// 没有交换设备时的交换表，所有分配都失败
    pub fn disabled() -> Self {
        Self {
            device: None,
            blocks_per_slot: 0,
            slots: SpinLock::new(SlotBitmap::new(0)),
        }
    }

    /// 分配一个空闲槽位
    pub fn allocate_slot(&self) -> VmResult<SwapSlot> {
        self.slots
            .lock()
            .alloc()
            .map(SwapSlot)
            .ok_or(VmError::SwapFull)
    }

    /// 释放槽位
    pub fn free_slot(&self, slot: SwapSlot) {
        self.slots.lock().free(slot.0);
    }

    /// 把一页内容写入槽位
    pub fn write_slot(&self, slot: SwapSlot, page: &[u8]) -> VmResult<()> {
        let device = self.device.as_ref().ok_or(VmError::IoError)?;
        let block_size = device.block_size();
        for (i, chunk) in page.chunks(block_size).take(self.blocks_per_slot).enumerate() {
            let block_id = slot.0 * self.blocks_per_slot + i;
            if !device.write_block(block_id, chunk) {
                log::error!("swap: write of block {} failed", block_id);
                return Err(VmError::IoError);
            }
        }
        Ok(())
    }

    /// 从槽位读出一页内容，不释放槽位
    pub fn read_slot(&self, slot: SwapSlot, page: &mut [u8]) -> VmResult<()> {
        let device = self.device.as_ref().ok_or(VmError::IoError)?;
        let block_size = device.block_size();
        for (i, chunk) in page
            .chunks_mut(block_size)
            .take(self.blocks_per_slot)
            .enumerate()
        {
            let block_id = slot.0 * self.blocks_per_slot + i;
            if !device.read_block(block_id, chunk) {
                log::error!("swap: read of block {} failed", block_id);
                return Err(VmError::IoError);
            }
        }
        Ok(())
    }

    /// 槽位总数
    pub fn capacity(&self) -> usize {
        self.slots.lock().capacity
    }

    /// 已占用的槽位数
    pub fn used_slots(&self) -> usize {
        self.slots.lock().used
    }

    /// 空闲槽位数
    pub fn free_slots(&self) -> usize {
        let slots = self.slots.lock();
        slots.capacity - slots.used
    }
}
