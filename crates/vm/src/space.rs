//! 进程地址空间
//!
//! [`AddressSpace`] 把进程名与它的补充页表组合在一起，
//! 为进程层提供分配、缺页、mmap、fork、建栈和退出等入口。

use crate::address::{Address, PageNum, Vaddr, Vpn};
use crate::config::{page_size, vm_config};
use crate::error::{VmError, VmResult};
use crate::fault::{handle_fault, FaultError, PageFault};
use crate::file::VmFile;
use crate::frame_table::frame_bytes;
use crate::page::{PageInitializer, PageType};
use crate::page_table::PageTable;
use crate::spt::SupplementalPageTable;
use crate::vm::Vm;
use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;

/// 一个进程的虚拟地址空间
pub struct AddressSpace {
    name: String,
    spt: SupplementalPageTable,
}

impl AddressSpace {
    /// 创建空的地址空间，页从 `vm` 取得帧与交换槽位
    ///
    /// 地址空间被 drop 时所有页都会被销毁，[`AddressSpace::exit`] 额外返回终止信息。
    pub fn new(name: &str, vm: Arc<Vm>, page_table: Arc<dyn PageTable>) -> Self {
        Self {
            name: String::from(name),
            spt: SupplementalPageTable::new(vm, page_table),
        }
    }

    /// 进程名
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 补充页表
    pub fn spt(&self) -> &SupplementalPageTable {
        &self.spt
    }

    /// 补充页表的可变引用
    pub fn spt_mut(&mut self) -> &mut SupplementalPageTable {
        &mut self.spt
    }

    /// 在 `va` 处预留一个延迟分配的页
    pub fn allocate_page(
        &mut self,
        ty: PageType,
        va: Vaddr,
        writable: bool,
        init: Option<PageInitializer>,
    ) -> VmResult<()> {
        self.spt.allocate_page(ty, va, writable, init)
    }

    /// 立即让 `va` 处的页驻留
    pub fn claim_page(&mut self, va: Vaddr) -> VmResult<()> {
        self.spt.claim_page(va)
    }

    /// 处理本地址空间内的缺页
    pub fn handle_fault(&mut self, fault: &PageFault) -> Result<(), FaultError> {
        handle_fault(&mut self.spt, fault)
    }

    /// 映射文件，见 [`SupplementalPageTable::mmap`]
    pub fn mmap(
        &mut self,
        addr: Vaddr,
        length: usize,
        writable: bool,
        file: &Arc<dyn VmFile>,
        offset: usize,
    ) -> VmResult<Vaddr> {
        self.spt.mmap(addr, length, writable, file, offset)
    }

    /// 解除映射，见 [`SupplementalPageTable::munmap`]
    pub fn munmap(&mut self, addr: Vaddr) -> VmResult<()> {
        self.spt.munmap(addr)
    }

    /// 建立初始用户栈：栈顶下方一个已驻留的可写匿名页，返回初始栈指针
    pub fn setup_stack(&mut self) -> VmResult<Vaddr> {
        let top = vm_config().user_stack_top();
        let va = Vaddr(top - page_size());
        self.spt.allocate_page(PageType::Anon, va, true, None)?;
        self.spt.claim_page(va)?;
        Ok(Vaddr(top))
    }

    /// 复制出子进程的地址空间
    ///
    /// 复制失败时销毁已经建立的部分并返回错误。
    pub fn fork(&self, name: &str, page_table: Arc<dyn PageTable>) -> VmResult<AddressSpace> {
        let mut child = AddressSpace::new(name, self.spt.vm().clone(), page_table);
        if let Err(e) = child.spt.copy_from(&self.spt) {
            log::warn!("fork of {} failed: {}", self.name, e);
            child.spt.kill();
            return Err(e);
        }
        Ok(child)
    }

    /// 进程退出：回收所有页、帧与交换槽位，返回终止信息
    pub fn exit(mut self, status: i32) -> String {
        self.spt.kill();
        let message = format!("{}: exit({})", self.name, status);
        log::info!("{}", message);
        message
    }

    /// 通过内核直接映射向已驻留的页写入字节序列（跨页安全）
    pub fn write_bytes_at(&self, va: Vaddr, bytes: &[u8]) -> VmResult<()> {
        let mut written = 0usize;
        while written < bytes.len() {
            let cur = va.checked_add(written).ok_or(VmError::InvalidAddress)?;
            let frame = self.resident_frame(cur)?;
            let off = cur.page_offset();
            let take = (bytes.len() - written).min(page_size() - off);
            frame[off..off + take].copy_from_slice(&bytes[written..written + take]);
            written += take;
        }
        Ok(())
    }

    /// 通过内核直接映射从已驻留的页读取字节序列（跨页安全）
    pub fn read_bytes_at(&self, va: Vaddr, out: &mut [u8]) -> VmResult<()> {
        let mut read = 0usize;
        while read < out.len() {
            let cur = va.checked_add(read).ok_or(VmError::InvalidAddress)?;
            let frame = self.resident_frame(cur)?;
            let off = cur.page_offset();
            let take = (out.len() - read).min(page_size() - off);
            out[read..read + take].copy_from_slice(&frame[off..off + take]);
            read += take;
        }
        Ok(())
    }

    fn resident_frame<'a>(&self, va: Vaddr) -> VmResult<&'a mut [u8]> {
        let ppn = self
            .spt
            .page_table()
            .translate(Vpn::from_addr_floor(va))
            .ok_or(VmError::NotMapped)?;
        Ok(frame_bytes(ppn.start_addr()))
    }
}

impl core::fmt::Debug for AddressSpace {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AddressSpace")
            .field("name", &self.name)
            .field("pages", &self.spt.len())
            .finish()
    }
}

