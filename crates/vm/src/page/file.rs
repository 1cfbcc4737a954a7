//! 文件页

use super::{PageCtx, PageOperations};
use crate::error::{VmError, VmResult};
use crate::file::VmFile;
use alloc::sync::Arc;

/// 一页在文件中的位置：从 `offset` 读 `read_bytes` 字节，其余 `zero_bytes` 字节填零
#[derive(Clone)]
pub struct FileSegment {
    /// 文件句柄
    pub file: Arc<dyn VmFile>,
    /// 文件内偏移
    pub offset: usize,
    /// 从文件读取的字节数
    pub read_bytes: usize,
    /// 填零的字节数
    pub zero_bytes: usize,
}

/// 以文件为后备的页
pub struct FilePage {
    segment: FileSegment,
}

impl FilePage {
    pub(crate) fn new(segment: FileSegment) -> Self {
        Self { segment }
    }

    /// 文件区段
    pub fn segment(&self) -> &FileSegment {
        &self.segment
    }

    /// 页被写过时把前 `read_bytes` 字节写回文件并清除脏位
    fn write_back(&self, ctx: &PageCtx<'_>, frame: &[u8]) -> VmResult<()> {
        if !ctx.page_table.is_dirty(ctx.vpn) {
            return Ok(());
        }
        let seg = &self.segment;
        let written = seg.file.write_at(seg.offset, &frame[..seg.read_bytes])?;
        if written != seg.read_bytes {
            log::error!(
                "Partial write at offset {}: expected {}, got {}",
                seg.offset,
                seg.read_bytes,
                written
            );
            return Err(VmError::IoError);
        }
        ctx.page_table.clear_dirty(ctx.vpn);
        Ok(())
    }
}

impl PageOperations for FilePage {
    fn swap_in(&mut self, _ctx: &PageCtx<'_>, frame: &mut [u8]) -> VmResult<()> {
        let seg = &self.segment;
        let read = seg.file.read_at(seg.offset, &mut frame[..seg.read_bytes])?;
        if read < seg.read_bytes {
            log::warn!(
                "Partial read at offset {}: expected {}, got {}",
                seg.offset,
                seg.read_bytes,
                read
            );
        }
        frame[read..].fill(0);
        Ok(())
    }

    fn swap_out(&mut self, ctx: &PageCtx<'_>, frame: &[u8]) -> VmResult<()> {
        self.write_back(ctx, frame)
    }

    fn destroy(&mut self, ctx: &PageCtx<'_>, frame: Option<&[u8]>) {
        if let Some(frame) = frame {
            if let Err(e) = self.write_back(ctx, frame) {
                log::error!("write-back at offset {} failed: {}", self.segment.offset, e);
            }
        }
    }
}
