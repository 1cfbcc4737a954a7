//! 地址与页号
//!
//! [`Vaddr`]/[`Paddr`] 是字节地址，[`Vpn`]/[`Ppn`] 是页号，
//! 两者之间的换算都按已注册的页大小进行。

pub mod page_num;
pub mod types;

pub use page_num::{PageNum, Ppn, Vpn, VpnRange};
pub use types::{Address, Paddr, UsizeConvert, Vaddr};
