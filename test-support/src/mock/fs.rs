//! 文件的 Mock 实现
//!
//! 注意：这里不直接依赖 `vm` crate（避免循环依赖）。
//! `vm` crate 在 `cfg(test)` 下为这些类型实现其 trait（例如 `VmFile`）。

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};
use sync::SpinLock;

/// 内存中的文件，复制出的句柄共享同一份内容
pub struct MockFile {
    data: Arc<SpinLock<Vec<u8>>>,
    open_handles: Arc<AtomicUsize>,
}

impl MockFile {
    pub fn new(contents: Vec<u8>) -> Self {
        Self {
            data: Arc::new(SpinLock::new(contents)),
            open_handles: Arc::new(AtomicUsize::new(1)),
        }
    }

    /// 复制句柄（对应 reopen）
    pub fn duplicate(&self) -> Self {
        self.open_handles.fetch_add(1, Ordering::SeqCst);
        Self {
            data: self.data.clone(),
            open_handles: self.open_handles.clone(),
        }
    }

    pub fn read_bytes(&self, offset: usize, buf: &mut [u8]) -> usize {
        let data = self.data.lock();
        if offset >= data.len() {
            return 0;
        }
        let n = buf.len().min(data.len() - offset);
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        n
    }

    /// 写入不会扩展文件
    pub fn write_bytes(&self, offset: usize, buf: &[u8]) -> usize {
        let mut data = self.data.lock();
        if offset >= data.len() {
            return 0;
        }
        let n = buf.len().min(data.len() - offset);
        data[offset..offset + n].copy_from_slice(&buf[..n]);
        n
    }

    pub fn size(&self) -> usize {
        self.data.lock().len()
    }

    /// 文件内容快照
    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    /// 仍然打开的句柄数
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }
}

impl Drop for MockFile {
    fn drop(&mut self) {
        self.open_handles.fetch_sub(1, Ordering::SeqCst);
    }
}
