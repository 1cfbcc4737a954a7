use super::*;
use crate::page::{PageInitializer, PageType, PageVariant};

#[test]
fn test_anonymous_copy_is_distinct() {
    let t = TestVm::new(8, 0);
    let mut parent = TestSpace::new(&t.vm, "parent");
    parent
        .space
        .allocate_page(PageType::Anon, Vaddr(0x40_0000), true, None)
        .unwrap();
    parent.store(0x40_0000, b"content C");

    let child_pt = Arc::new(MockPageTable::new());
    let child_space = parent.space.fork("child", child_pt.clone()).unwrap();
    let mut child = TestSpace {
        space: child_space,
        pt: child_pt,
    };

    let src = parent.space.spt().find(Vaddr(0x40_0000)).unwrap();
    let dst = child.space.spt().find(Vaddr(0x40_0000)).unwrap();
    assert!(dst.lock().is_resident());
    assert_eq!(dst.lock().variant(), PageVariant::Anon);
    assert_ne!(src.lock().frame(), dst.lock().frame());
    assert_eq!(child.load(0x40_0000, 9), b"content C");

    child.store(0x40_0000, b"changed");
    assert_eq!(parent.load(0x40_0000, 9), b"content C");
    assert_mutually_consistent(&t.vm);
}

#[test]
fn test_swapped_out_anonymous_page_is_copied_from_slot() {
    let t = TestVm::new(2, 8);
    let mut parent = TestSpace::new(&t.vm, "swapped");
    for i in 0..3 {
        let va = 0x50_0000 + i * page_size();
        parent
            .space
            .allocate_page(PageType::Anon, Vaddr(va), true, None)
            .unwrap();
        parent.store(va, &[0xA0 + i as u8; 32]);
    }
    let first = parent.space.spt().find(Vaddr(0x50_0000)).unwrap();
    let slot = first.lock().swap_slot();
    assert!(slot.is_some());

    let child_pt = Arc::new(MockPageTable::new());
    let child_space = parent.space.fork("child", child_pt.clone()).unwrap();
    let mut child = TestSpace {
        space: child_space,
        pt: child_pt,
    };
    // 复制只读取源槽位，不释放它
    assert_eq!(first.lock().swap_slot(), slot);

    for i in 0..3 {
        let va = 0x50_0000 + i * page_size();
        assert_eq!(child.load(va, 32), [0xA0 + i as u8; 32]);
        assert_eq!(parent.load(va, 32), [0xA0 + i as u8; 32]);
    }
    assert_mutually_consistent(&t.vm);
}

#[test]
fn test_uninitialized_pages_stay_lazy() {
    let t = TestVm::new(4, 0);
    let mut parent = TestSpace::new(&t.vm, "lazy");
    let init: PageInitializer = Arc::new(|frame: &mut [u8]| {
        frame[0] = 0x7f;
        Ok(())
    });
    parent
        .space
        .allocate_page(PageType::Anon, Vaddr(0x60_0000), false, Some(init))
        .unwrap();

    let child_pt = Arc::new(MockPageTable::new());
    let child_space = parent.space.fork("child", child_pt.clone()).unwrap();
    let mut child = TestSpace {
        space: child_space,
        pt: child_pt,
    };

    let dst = child.space.spt().find(Vaddr(0x60_0000)).unwrap();
    assert_eq!(dst.lock().variant(), PageVariant::Uninit);
    assert!(!dst.lock().writable());
    assert_eq!(t.pool.allocated(), 0);

    assert_eq!(child.load(0x60_0000, 1), [0x7f]);
    let src = parent.space.spt().find(Vaddr(0x60_0000)).unwrap();
    assert_eq!(src.lock().variant(), PageVariant::Uninit);
}

#[test]
fn test_resident_file_page_shares_frame() {
    let t = TestVm::new(4, 0);
    let mut parent = TestSpace::new(&t.vm, "shared");
    let (file, mock) = mock_file(alloc::vec![b'f'; 64]);
    parent
        .space
        .mmap(Vaddr(0x7000_0000), 2 * page_size(), true, &file, 0)
        .unwrap();
    parent.load(0x7000_0000, 1);

    let child_pt = Arc::new(MockPageTable::new());
    let child_space = parent.space.fork("child", child_pt.clone()).unwrap();
    let mut child = TestSpace {
        space: child_space,
        pt: child_pt,
    };

    let src = parent.space.spt().find(Vaddr(0x7000_0000)).unwrap();
    let dst = child.space.spt().find(Vaddr(0x7000_0000)).unwrap();
    let frame = src.lock().frame().unwrap();
    assert_eq!(dst.lock().frame(), Some(frame));
    assert_eq!(dst.lock().mapped_region_size(), 2);
    assert_eq!(t.vm.frames().resident_pages(frame).len(), 2);
    assert_eq!(t.pool.allocated(), 1);

    // 共享帧：子进程写入对父进程可见
    child.store(0x7000_0000, b"xy");
    assert_eq!(parent.load(0x7000_0000, 3), b"xyf");

    // 第二页尚未驻留，子进程从文件读取
    let second = child.space.spt().find(Vaddr(0x7000_0000 + page_size())).unwrap();
    assert_eq!(second.lock().target(), PageVariant::File);
    assert!(!second.lock().is_resident());

    // 子进程退出：写回脏页，帧仍被父进程使用
    child.space.exit(0);
    assert_eq!(&mock.contents()[..3], b"xyf");
    assert_eq!(t.pool.allocated(), 1);
    assert!(src.lock().is_resident());
    assert_mutually_consistent(&t.vm);

    parent.space.munmap(Vaddr(0x7000_0000)).unwrap();
    assert_eq!(t.pool.allocated(), 0);
}

#[test]
fn test_eviction_detaches_all_sharers() {
    let t = TestVm::new(1, 4);
    let mut parent = TestSpace::new(&t.vm, "evshare");
    let (file, mock) = mock_file(alloc::vec![b'e'; 16]);
    parent
        .space
        .mmap(Vaddr(0x7000_0000), page_size(), true, &file, 0)
        .unwrap();
    parent.store(0x7000_0000, b"P");

    let child_pt = Arc::new(MockPageTable::new());
    let child_space = parent.space.fork("child", child_pt.clone()).unwrap();
    let mut child = TestSpace {
        space: child_space,
        pt: child_pt,
    };
    child
        .space
        .allocate_page(PageType::Anon, Vaddr(0x1000), true, None)
        .unwrap();
    child.access(0x1000, true).unwrap();

    let src = parent.space.spt().find(Vaddr(0x7000_0000)).unwrap();
    let dst = child.space.spt().find(Vaddr(0x7000_0000)).unwrap();
    assert!(!src.lock().is_resident());
    assert!(!dst.lock().is_resident());
    assert_eq!(parent.pt.mapped_count(), 0);
    assert_eq!(mock.contents()[0], b'P');
    assert_mutually_consistent(&t.vm);
}

#[test]
fn test_exit_of_parent_keeps_child_intact() {
    let t = TestVm::new(8, 0);
    let mut parent = TestSpace::new(&t.vm, "orphan");
    parent.space.setup_stack().unwrap();
    let top = MOCK_VM_CONFIG.user_stack_top();
    parent.store(top - 8, b"stack!!!");

    let child_pt = Arc::new(MockPageTable::new());
    let child_space = parent.space.fork("child", child_pt.clone()).unwrap();
    let mut child = TestSpace {
        space: child_space,
        pt: child_pt,
    };
    assert_eq!(t.pool.allocated(), 2);

    assert_eq!(parent.space.exit(0), "orphan: exit(0)");
    assert_eq!(t.pool.allocated(), 1);
    assert_eq!(child.load(top - 8, 8), b"stack!!!");
}

#[test]
fn test_failed_fork_is_torn_down() {
    // 一个帧、没有交换区：匿名页的复制无法取得帧
    let t = TestVm::new(1, 0);
    let mut parent = TestSpace::new(&t.vm, "nofork");
    parent.space.setup_stack().unwrap();

    let child_pt = Arc::new(MockPageTable::new());
    let result = parent.space.fork("child", child_pt.clone());
    assert_eq!(result.err(), Some(VmError::OutOfMemory));
    assert_eq!(child_pt.mapped_count(), 0);
    assert_eq!(t.pool.allocated(), 1);
}

#[test]
fn test_page_cache_pages_cannot_be_copied() {
    let t = TestVm::new(4, 0);
    let mut parent = TestSpace::new(&t.vm, "cache");
    parent
        .space
        .allocate_page(PageType::Anon, Vaddr(0x1000), true, None)
        .unwrap();
    let page = crate::page::Page::with_kind(
        Vpn::from_addr_floor(Vaddr(0x2000)),
        false,
        crate::page::PageKind::PageCache,
        parent.pt.clone(),
    );
    parent.space.spt_mut().insert(page).unwrap();

    let child_pt = Arc::new(MockPageTable::new());
    let result = parent.space.fork("child", child_pt.clone());
    assert_eq!(result.err(), Some(VmError::Unsupported));
    assert_eq!(t.pool.allocated(), 0);
}
