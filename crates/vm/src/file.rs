//! 文件映射接口 trait 定义

use crate::error::VmResult;
use alloc::sync::Arc;

/// 可映射到内存的文件句柄
///
/// 此 trait 抽象了文件映射和按需加载所需的最小接口。
/// 关闭句柄即释放最后一个 `Arc`。
pub trait VmFile: Send + Sync {
    /// 从指定偏移读取数据到缓冲区，返回实际读取的字节数
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> VmResult<usize>;

    /// 将缓冲区数据写入指定偏移，返回实际写入的字节数
    fn write_at(&self, offset: usize, buf: &[u8]) -> VmResult<usize>;

    /// 文件长度（字节）
    fn length(&self) -> usize;

    /// 复制一个独立的句柄，与原句柄共享底层文件
    fn reopen(&self) -> VmResult<Arc<dyn VmFile>>;
}
