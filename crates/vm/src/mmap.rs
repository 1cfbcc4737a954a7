//! 文件映射
//!
//! [`SupplementalPageTable::mmap`] 为文件区域建立一组延迟加载的文件页，
//! [`SupplementalPageTable::munmap`] 写回并移除整个区域。

use crate::address::{PageNum, UsizeConvert, Vaddr, Vpn, VpnRange};
use crate::config::{page_size, vm_config};
use crate::error::{VmError, VmResult};
use crate::file::VmFile;
use crate::page::{FileSegment, Page, PageType, PageVariant};
use crate::spt::{check_page_aligned, SupplementalPageTable};
use alloc::sync::Arc;
use alloc::vec::Vec;

impl SupplementalPageTable {
    /// 把 `file` 从 `offset` 开始的内容映射到 `[addr, addr + length)`
    ///
    /// 所有前置条件都在产生任何副作用之前检查。映射使用复制出的文件句柄，
    /// 因此在原描述符关闭后仍然有效。文件在 `length` 之内的部分按页读入，
    /// 超出文件末尾的字节填零。返回映射起始地址。
    pub fn mmap(
        &mut self,
        addr: Vaddr,
        length: usize,
        writable: bool,
        file: &Arc<dyn VmFile>,
        offset: usize,
    ) -> VmResult<Vaddr> {
        if addr.is_null() {
            return Err(VmError::InvalidAddress);
        }
        check_page_aligned(addr)?;
        if length == 0 || offset % page_size() != 0 {
            return Err(VmError::InvalidArgument);
        }
        let end = addr.checked_add(length).ok_or(VmError::InvalidAddress)?;
        if end.as_usize() > vm_config().user_space_end() {
            return Err(VmError::InvalidAddress);
        }
        let file_len = file.length();
        if file_len == 0 {
            return Err(VmError::InvalidArgument);
        }

        let pages = length.div_ceil(page_size());
        // 最后一页的文件偏移也必须可表示
        pages
            .checked_mul(page_size())
            .and_then(|span| span.checked_add(offset))
            .ok_or(VmError::InvalidArgument)?;
        let range = VpnRange::from_start_len(Vpn::from_addr_floor(addr), pages);
        if range.into_iter().any(|vpn| self.contains(vpn)) {
            return Err(VmError::AlreadyMapped);
        }

        let handle = file.reopen()?;
        let mut remaining = length.min(file_len.saturating_sub(offset));
        let mut inserted: Vec<Vpn> = Vec::with_capacity(pages);
        for (i, vpn) in range.into_iter().enumerate() {
            let read_bytes = remaining.min(page_size());
            remaining -= read_bytes;
            let segment = FileSegment {
                file: handle.clone(),
                offset: offset + i * page_size(),
                read_bytes,
                zero_bytes: page_size() - read_bytes,
            };
            let mut page = Page::new_uninit(
                vpn,
                writable,
                PageType::File(segment),
                None,
                self.page_table().clone(),
            );
            if i == 0 {
                page.set_mapped_region_size(pages);
            }
            if let Err(e) = self.insert(page) {
                for vpn in inserted {
                    self.remove_entry(vpn);
                }
                return Err(e);
            }
            inserted.push(vpn);
        }

        log::debug!(
            "mmap {:#x}..{:#x} ({} pages, offset {})",
            addr,
            end,
            pages,
            offset
        );
        Ok(addr)
    }

    /// 解除以 `addr` 开头的映射区域
    ///
    /// 被写过的页写回文件，区域内仍存在的页全部从 SPT 中移除，已不存在的页跳过。
    pub fn munmap(&mut self, addr: Vaddr) -> VmResult<()> {
        check_page_aligned(addr)?;
        let head = self.find(addr).ok_or(VmError::NotMapped)?;
        let pages = {
            let head = head.lock();
            if head.target() != PageVariant::File || head.mapped_region_size() == 0 {
                return Err(VmError::InvalidArgument);
            }
            head.mapped_region_size()
        };

        let start = Vpn::from_addr_floor(addr);
        for vpn in VpnRange::from_start_len(start, pages) {
            match self.remove_entry(vpn) {
                Some(page) => self.vm().destroy_page(&page),
                None => log::debug!("munmap: page {:#x} already gone", vpn.start_addr()),
            }
        }
        log::debug!("munmap {:#x} ({} pages)", addr, pages);
        Ok(())
    }
}
