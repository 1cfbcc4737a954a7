//! 测试支持 crate
//!
//! 提供虚拟内存子系统在宿主机上测试所需的 Mock 实现

#![no_std]

extern crate alloc;

pub mod mock;
