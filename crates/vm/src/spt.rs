//! 补充页表（SPT）
//!
//! 每个地址空间一个，记录虚拟页到 [`Page`] 的映射，独立于硬件页表。
//! SPT 拥有其中的所有页：移除页、[`SupplementalPageTable::kill`] 或 drop 时
//! 都会对页调用销毁操作，释放帧与交换槽位并写回文件页。

use crate::address::{Address, PageNum, Ppn, Vaddr, Vpn};
use crate::config::page_size;
use crate::error::{VmError, VmResult};
use crate::frame_table::frame_bytes;
use crate::page::{FilePage, Page, PageInitializer, PageKind, PageRef, PageType};
use crate::page_table::PageTable;
use crate::vm::Vm;
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec;
use sync::SpinLock;

/// 补充页表
pub struct SupplementalPageTable {
    pages: BTreeMap<Vpn, PageRef>,
    page_table: Arc<dyn PageTable>,
    vm: Arc<Vm>,
}

impl SupplementalPageTable {
    /// 为使用 `page_table` 的地址空间创建空的 SPT
    pub fn new(vm: Arc<Vm>, page_table: Arc<dyn PageTable>) -> Self {
        Self {
            pages: BTreeMap::new(),
            page_table,
            vm,
        }
    }

    /// 页所驻留的帧表与交换表
    pub fn vm(&self) -> &Arc<Vm> {
        &self.vm
    }

    /// 地址空间的硬件页表
    pub fn page_table(&self) -> &Arc<dyn PageTable> {
        &self.page_table
    }

    /// 查找包含 `va` 的页
    pub fn find(&self, va: Vaddr) -> Option<PageRef> {
        self.pages.get(&Vpn::from_addr_floor(va)).cloned()
    }

    /// 该虚拟页上是否有页
    pub fn contains(&self, vpn: Vpn) -> bool {
        self.pages.contains_key(&vpn)
    }

    /// 插入页，该地址已有页时返回 `AlreadyMapped`
    pub fn insert(&mut self, page: Page) -> VmResult<PageRef> {
        let vpn = page.vpn();
        if self.pages.contains_key(&vpn) {
            return Err(VmError::AlreadyMapped);
        }
        let page_ref = Arc::new(SpinLock::new(page));
        self.pages.insert(vpn, page_ref.clone());
        Ok(page_ref)
    }

    /// 移除并销毁包含 `va` 的页
    pub fn remove(&mut self, va: Vaddr) -> VmResult<()> {
        let page = self
            .pages
            .remove(&Vpn::from_addr_floor(va))
            .ok_or(VmError::NotMapped)?;
        self.vm.destroy_page(&page);
        Ok(())
    }

    /// 在 `va` 处预留一个未初始化页，首次访问时才分配帧
    pub fn allocate_page(
        &mut self,
        ty: PageType,
        va: Vaddr,
        writable: bool,
        init: Option<PageInitializer>,
    ) -> VmResult<()> {
        let page = Page::new_uninit(
            Vpn::from_addr_floor(va),
            writable,
            ty,
            init,
            self.page_table.clone(),
        );
        self.insert(page).map(|_| ())
    }

    /// 立即让 `va` 处的页驻留
    pub fn claim_page(&mut self, va: Vaddr) -> VmResult<()> {
        let page = self.find(va).ok_or(VmError::NotMapped)?;
        self.vm.claim(&page)
    }

    /// 把 `src` 中的每个页复制到本 SPT（fork）
    ///
    /// - 未初始化页：共享延迟初始化函数，仍保持未初始化
    /// - 文件页：驻留时与源页共享同一个帧，否则留待缺页时从文件读取
    /// - 匿名页：新建页并立即驻留，内容从源帧或源交换槽位复制
    ///
    /// 复制期间持有源页的锁，源帧因此不会被换出。
    ///
    /// 两个 SPT 必须共用同一个 [`Vm`]。出错时立即返回，已复制的页留给调用者销毁。
    pub fn copy_from(&mut self, src: &SupplementalPageTable) -> VmResult<()> {
        if !Arc::ptr_eq(&self.vm, &src.vm) {
            return Err(VmError::InvalidArgument);
        }
        let vm = self.vm.clone();
        for (&vpn, src_ref) in &src.pages {
            let src_page = src_ref.lock();
            let writable = src_page.writable();
            let region = src_page.mapped_region_size();
            let page_table = self.page_table.clone();

            match src_page.kind() {
                PageKind::Uninit(uninit) => {
                    let page = Page::with_kind(
                        vpn,
                        writable,
                        PageKind::Uninit(uninit.clone()),
                        page_table,
                    );
                    self.insert(page)?.lock().set_mapped_region_size(region);
                }
                PageKind::File(file) => {
                    if self.contains(vpn) {
                        return Err(VmError::AlreadyMapped);
                    }
                    let kind = PageKind::File(FilePage::new(file.segment().clone()));
                    let mut page = Page::with_kind(vpn, writable, kind, page_table);
                    page.set_mapped_region_size(region);
                    match src_page.frame() {
                        Some(id) => {
                            let paddr = vm.frames().paddr(id).ok_or(VmError::NotMapped)?;
                            page.map_to(Ppn::from_addr_floor(paddr))?;
                            page.set_frame(Some(id));
                            let dst_ref = self.insert(page)?;
                            vm.frames().alias(id, &dst_ref)?;
                        }
                        None => {
                            self.insert(page)?;
                        }
                    }
                }
                PageKind::Anon(anon) => {
                    let mut snapshot = vec![0u8; page_size()];
                    match (src_page.frame(), anon.slot()) {
                        (Some(id), _) => {
                            let paddr = vm.frames().paddr(id).ok_or(VmError::NotMapped)?;
                            snapshot.copy_from_slice(frame_bytes(paddr));
                        }
                        (None, Some(slot)) => vm.swap().read_slot(slot, &mut snapshot)?,
                        (None, None) => {}
                    }
                    let init: PageInitializer = Arc::new(move |frame: &mut [u8]| {
                        frame.copy_from_slice(&snapshot);
                        Ok(())
                    });
                    let page = Page::new_uninit(vpn, writable, PageType::Anon, Some(init), page_table);
                    let dst_ref = self.insert(page)?;
                    dst_ref.lock().set_mapped_region_size(region);
                    vm.claim(&dst_ref)?;
                }
                PageKind::PageCache => return Err(VmError::Unsupported),
            }
        }
        log::debug!("copied {} pages", src.pages.len());
        Ok(())
    }

    /// 销毁所有页，释放它们占用的帧和交换槽位
    pub fn kill(&mut self) {
        let pages = core::mem::take(&mut self.pages);
        for page in pages.into_values() {
            self.vm.destroy_page(&page);
        }
    }

    /// 页数
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// 按地址顺序遍历所有页
    pub fn iter(&self) -> impl Iterator<Item = (Vpn, &PageRef)> {
        self.pages.iter().map(|(&vpn, page)| (vpn, page))
    }

    pub(crate) fn remove_entry(&mut self, vpn: Vpn) -> Option<PageRef> {
        self.pages.remove(&vpn)
    }
}

impl Drop for SupplementalPageTable {
    fn drop(&mut self) {
        if !self.pages.is_empty() {
            log::debug!("dropping SPT with {} live pages", self.pages.len());
            self.kill();
        }
    }
}

/// 页对齐检查，供 mmap 等入口使用
pub(crate) fn check_page_aligned(va: Vaddr) -> VmResult<()> {
    if va.is_page_aligned() {
        Ok(())
    } else {
        Err(VmError::InvalidAddress)
    }
}
