//! 块设备的 Mock 实现
//!
//! 注意：这里不直接依赖 `vm` crate（避免循环依赖）。
//! `vm` crate 在 `cfg(test)` 下为这些类型实现其 trait（例如 `BlockDevice`）。

use alloc::vec;
use alloc::vec::Vec;
use sync::SpinLock;

/// 内存模拟的块设备，用作交换分区
pub struct MockBlockDevice {
    data: SpinLock<Vec<u8>>,
    sector_size: usize,
}

impl MockBlockDevice {
    /// 创建 `sectors` 个扇区、每扇区 `sector_size` 字节的设备
    pub fn new(sectors: usize, sector_size: usize) -> Self {
        Self {
            data: SpinLock::new(vec![0u8; sectors * sector_size]),
            sector_size,
        }
    }

    pub fn read_sector(&self, sector: usize, buf: &mut [u8]) -> bool {
        if buf.len() != self.sector_size {
            return false;
        }
        let data = self.data.lock();
        let offset = sector * self.sector_size;
        if offset + self.sector_size > data.len() {
            return false;
        }
        buf.copy_from_slice(&data[offset..offset + self.sector_size]);
        true
    }

    pub fn write_sector(&self, sector: usize, buf: &[u8]) -> bool {
        if buf.len() != self.sector_size {
            return false;
        }
        let mut data = self.data.lock();
        let offset = sector * self.sector_size;
        if offset + self.sector_size > data.len() {
            return false;
        }
        data[offset..offset + self.sector_size].copy_from_slice(buf);
        true
    }

    pub fn sector_size(&self) -> usize {
        self.sector_size
    }

    pub fn sector_count(&self) -> usize {
        self.data.lock().len() / self.sector_size
    }
}
