//! 虚拟页
//!
//! 每个 [`Page`] 描述一个地址空间中的一个虚拟页。页的后备存储是一个封闭的变体集合
//! [`PageKind`]，各变体通过 [`PageOperations`] 提供统一的换入、换出、销毁操作：
//!
//! - 未初始化页：只记录延迟初始化函数和将要变成的类型，首次换入时原地变为真实类型
//! - 匿名页：零填充，被换出时内容保存在交换槽位中
//! - 文件页：从文件读入，换出时若被写过则写回文件
//! - 页缓存：保留变体，所有操作均返回 `Unsupported`
//!
//! 页本身不持有帧，只记录帧表中的 [`FrameId`]；帧与页的双向关联由帧表维护。

mod anon;
mod file;
mod uninit;

pub use anon::AnonPage;
pub use file::{FilePage, FileSegment};
pub use uninit::{PageInitializer, UninitPage};

use crate::address::{PageNum, Ppn, Vaddr, Vpn};
use crate::error::{VmError, VmResult};
use crate::frame_table::FrameId;
use crate::page_table::{PageTable, PteFlags};
use crate::swap::{SwapSlot, SwapTable};
use alloc::sync::Arc;
use sync::SpinLock;

/// 页在地址空间之间共享的句柄，SPT 持有它，帧表只持有弱引用
pub type PageRef = Arc<SpinLock<Page>>;

/// 新建页时选择的后备类型
#[derive(Clone)]
pub enum PageType {
    /// 匿名页
    Anon,
    /// 文件页，附带文件区段
    File(FileSegment),
    /// 页缓存（保留）
    PageCache,
}

impl PageType {
    fn variant(&self) -> PageVariant {
        match self {
            PageType::Anon => PageVariant::Anon,
            PageType::File(_) => PageVariant::File,
            PageType::PageCache => PageVariant::PageCache,
        }
    }
}

/// 页当前所处的变体
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageVariant {
    /// 尚未初始化
    Uninit,
    /// 匿名页
    Anon,
    /// 文件页
    File,
    /// 页缓存
    PageCache,
}

/// 页的后备存储状态
pub enum PageKind {
    /// 尚未初始化
    Uninit(UninitPage),
    /// 匿名页
    Anon(AnonPage),
    /// 文件页
    File(FilePage),
    /// 页缓存（保留）
    PageCache,
}

/// 各变体执行换入、换出、销毁时可用的上下文
pub struct PageCtx<'a> {
    /// 页的虚拟页号
    pub vpn: Vpn,
    /// 页所属地址空间的页表
    pub page_table: &'a dyn PageTable,
    /// 交换表
    pub swap: &'a SwapTable,
}

/// 页变体的统一操作
pub trait PageOperations {
    /// 从后备存储填充 `frame` 的内容
    fn swap_in(&mut self, ctx: &PageCtx<'_>, frame: &mut [u8]) -> VmResult<()>;

    /// 按需持久化 `frame` 的内容；硬件映射由调用者解除
    fn swap_out(&mut self, ctx: &PageCtx<'_>, frame: &[u8]) -> VmResult<()>;

    /// 释放变体持有的资源；`frame` 为驻留时的帧内容，不驻留时为 `None`
    fn destroy(&mut self, ctx: &PageCtx<'_>, frame: Option<&[u8]>);
}

impl PageOperations for PageKind {
    fn swap_in(&mut self, ctx: &PageCtx<'_>, frame: &mut [u8]) -> VmResult<()> {
        match self {
            PageKind::Uninit(_) => Err(VmError::Unsupported),
            PageKind::Anon(anon) => anon.swap_in(ctx, frame),
            PageKind::File(file) => file.swap_in(ctx, frame),
            PageKind::PageCache => Err(VmError::Unsupported),
        }
    }

    fn swap_out(&mut self, ctx: &PageCtx<'_>, frame: &[u8]) -> VmResult<()> {
        match self {
            PageKind::Uninit(_) | PageKind::PageCache => Err(VmError::Unsupported),
            PageKind::Anon(anon) => anon.swap_out(ctx, frame),
            PageKind::File(file) => file.swap_out(ctx, frame),
        }
    }

    fn destroy(&mut self, ctx: &PageCtx<'_>, frame: Option<&[u8]>) {
        match self {
            PageKind::Uninit(_) | PageKind::PageCache => {}
            PageKind::Anon(anon) => anon.destroy(ctx, frame),
            PageKind::File(file) => file.destroy(ctx, frame),
        }
    }
}

/// 一个地址空间中的一个虚拟页
pub struct Page {
    vpn: Vpn,
    writable: bool,
    frame: Option<FrameId>,
    kind: PageKind,
    mapped_region_size: usize,
    page_table: Arc<dyn PageTable>,
}

impl Page {
    /// 创建一个未初始化页，首次换入时变为 `target` 类型并运行 `init`
    pub fn new_uninit(
        vpn: Vpn,
        writable: bool,
        target: PageType,
        init: Option<PageInitializer>,
        page_table: Arc<dyn PageTable>,
    ) -> Self {
        Self::with_kind(
            vpn,
            writable,
            PageKind::Uninit(UninitPage::new(target, init)),
            page_table,
        )
    }

    pub(crate) fn with_kind(
        vpn: Vpn,
        writable: bool,
        kind: PageKind,
        page_table: Arc<dyn PageTable>,
    ) -> Self {
        Self {
            vpn,
            writable,
            frame: None,
            kind,
            mapped_region_size: 0,
            page_table,
        }
    }

    /// 虚拟页号
    pub fn vpn(&self) -> Vpn {
        self.vpn
    }

    /// 页起始虚拟地址
    pub fn va(&self) -> Vaddr {
        self.vpn.start_addr()
    }

    /// 是否可写
    pub fn writable(&self) -> bool {
        self.writable
    }

    /// 当前驻留的帧
    pub fn frame(&self) -> Option<FrameId> {
        self.frame
    }

    /// 是否驻留在物理内存中
    pub fn is_resident(&self) -> bool {
        self.frame.is_some()
    }

    /// 当前变体
    pub fn variant(&self) -> PageVariant {
        match &self.kind {
            PageKind::Uninit(_) => PageVariant::Uninit,
            PageKind::Anon(_) => PageVariant::Anon,
            PageKind::File(_) => PageVariant::File,
            PageKind::PageCache => PageVariant::PageCache,
        }
    }

    /// 页已经是或将要变成的类型
    pub fn target(&self) -> PageVariant {
        match &self.kind {
            PageKind::Uninit(uninit) => uninit.target().variant(),
            _ => self.variant(),
        }
    }

    /// 后备存储状态
    pub fn kind(&self) -> &PageKind {
        &self.kind
    }

    /// 匿名页被换出时占用的交换槽位
    pub fn swap_slot(&self) -> Option<SwapSlot> {
        match &self.kind {
            PageKind::Anon(anon) => anon.slot(),
            _ => None,
        }
    }

    /// mmap 区域首页记录的区域页数，其他页为 0
    pub fn mapped_region_size(&self) -> usize {
        self.mapped_region_size
    }

    pub(crate) fn set_mapped_region_size(&mut self, pages: usize) {
        self.mapped_region_size = pages;
    }

    /// 页所属地址空间的页表
    pub fn page_table(&self) -> &Arc<dyn PageTable> {
        &self.page_table
    }

    pub(crate) fn pte_flags(&self) -> PteFlags {
        PteFlags::user_page(self.writable)
    }

    pub(crate) fn set_frame(&mut self, frame: Option<FrameId>) {
        self.frame = frame;
    }

    pub(crate) fn map_to(&self, ppn: Ppn) -> VmResult<()> {
        self.page_table.map(self.vpn, ppn, self.pte_flags())
    }

    pub(crate) fn is_accessed(&self) -> bool {
        self.page_table.is_accessed(self.vpn)
    }

    pub(crate) fn clear_accessed(&self) {
        self.page_table.clear_accessed(self.vpn);
    }

    /// 填充新帧的内容
    ///
    /// 未初始化页先按目标类型填充，再运行延迟初始化函数；
    /// 全部成功后才原地替换为目标变体，失败时页保持未初始化。
    pub(crate) fn swap_in(&mut self, swap: &SwapTable, frame: &mut [u8]) -> VmResult<()> {
        let ctx = PageCtx {
            vpn: self.vpn,
            page_table: self.page_table.as_ref(),
            swap,
        };
        if let PageKind::Uninit(uninit) = &self.kind {
            let mut concrete = uninit.materialize()?;
            let init = uninit.initializer();
            concrete.swap_in(&ctx, frame)?;
            if let Some(init) = init {
                init(frame)?;
            }
            self.kind = concrete;
            return Ok(());
        }
        self.kind.swap_in(&ctx, frame)
    }

    /// 换出：持久化内容、解除硬件映射并与帧断开
    pub(crate) fn swap_out(&mut self, swap: &SwapTable, frame: &[u8]) -> VmResult<()> {
        let ctx = PageCtx {
            vpn: self.vpn,
            page_table: self.page_table.as_ref(),
            swap,
        };
        self.kind.swap_out(&ctx, frame)?;
        if let Err(e) = self.page_table.unmap(self.vpn) {
            log::debug!("swap out {:#x}: unmap failed: {:?}", self.va(), e);
        }
        self.frame = None;
        Ok(())
    }

    /// 释放页持有的资源并解除硬件映射，返回此前驻留的帧
    pub(crate) fn destroy(&mut self, swap: &SwapTable, frame: Option<&[u8]>) -> Option<FrameId> {
        let ctx = PageCtx {
            vpn: self.vpn,
            page_table: self.page_table.as_ref(),
            swap,
        };
        self.kind.destroy(&ctx, frame);
        let old = self.frame.take();
        if old.is_some() {
            if let Err(e) = self.page_table.unmap(self.vpn) {
                log::debug!("destroy {:#x}: unmap failed: {:?}", self.va(), e);
            }
        }
        old
    }
}
