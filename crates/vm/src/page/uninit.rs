//! 未初始化页

use super::{AnonPage, FilePage, PageKind, PageType};
use crate::error::{VmError, VmResult};
use alloc::sync::Arc;

/// 延迟初始化函数，首次换入时对帧内容调用；闭包捕获自己的参数
pub type PageInitializer = Arc<dyn Fn(&mut [u8]) -> VmResult<()> + Send + Sync>;

/// 尚未落地的页：记录目标类型与延迟初始化函数
#[derive(Clone)]
pub struct UninitPage {
    target: PageType,
    init: Option<PageInitializer>,
}

impl UninitPage {
    pub(crate) fn new(target: PageType, init: Option<PageInitializer>) -> Self {
        Self { target, init }
    }

    /// 将要变成的类型
    pub fn target(&self) -> &PageType {
        &self.target
    }

    pub(crate) fn initializer(&self) -> Option<PageInitializer> {
        self.init.clone()
    }

    /// 构造目标变体
    pub(crate) fn materialize(&self) -> VmResult<PageKind> {
        match &self.target {
            PageType::Anon => Ok(PageKind::Anon(AnonPage::new())),
            PageType::File(segment) => Ok(PageKind::File(FilePage::new(segment.clone()))),
            PageType::PageCache => Err(VmError::Unsupported),
        }
    }
}
