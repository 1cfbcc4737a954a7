//! 虚拟内存子系统的错误类型

use core::fmt;

/// 虚拟内存操作中可能发生的错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    /// 地址为空、未对齐或不在用户地址空间内
    InvalidAddress,
    /// 该地址没有对应的页
    NotMapped,
    /// 该地址已经有页存在
    AlreadyMapped,
    /// 访问权限不足
    PermissionDenied,
    /// 物理帧耗尽且没有可换出的帧
    OutOfMemory,
    /// 交换分区没有空闲槽位
    SwapFull,
    /// 文件或块设备读写失败
    IoError,
    /// 参数不合法（长度为 0、偏移未对齐、空文件等）
    InvalidArgument,
    /// 此页类型不支持该操作
    Unsupported,
}

impl VmError {
    /// 转换为系统调用返回的负错误码
    pub fn to_errno(self) -> isize {
        match self {
            VmError::InvalidAddress => -14,  // EFAULT
            VmError::NotMapped => -22,       // EINVAL
            VmError::AlreadyMapped => -17,   // EEXIST
            VmError::PermissionDenied => -13, // EACCES
            VmError::OutOfMemory => -12,     // ENOMEM
            VmError::SwapFull => -12,        // ENOMEM
            VmError::IoError => -5,          // EIO
            VmError::InvalidArgument => -22, // EINVAL
            VmError::Unsupported => -95,     // EOPNOTSUPP
        }
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            VmError::InvalidAddress => "invalid address",
            VmError::NotMapped => "address not mapped",
            VmError::AlreadyMapped => "address already mapped",
            VmError::PermissionDenied => "permission denied",
            VmError::OutOfMemory => "out of physical frames",
            VmError::SwapFull => "swap space exhausted",
            VmError::IoError => "I/O error",
            VmError::InvalidArgument => "invalid argument",
            VmError::Unsupported => "operation not supported for this page type",
        };
        f.write_str(msg)
    }
}

/// 虚拟内存操作的结果类型
pub type VmResult<T> = Result<T, VmError>;
