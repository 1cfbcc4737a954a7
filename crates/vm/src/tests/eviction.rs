use super::*;
use crate::page::{PageType, PageVariant};

const BASE: usize = 0x20_0000;

fn va(i: usize) -> usize {
    BASE + i * page_size()
}

fn fill(s: &mut TestSpace, n: usize) {
    for i in 0..n {
        s.space
            .allocate_page(PageType::Anon, Vaddr(va(i)), true, None)
            .unwrap();
    }
}

#[test]
fn test_anonymous_pages_survive_swap_round_trip() {
    let t = TestVm::new(3, 8);
    let mut s = TestSpace::new(&t.vm, "swap");
    fill(&mut s, 8);

    for i in 0..8 {
        let pattern = [i as u8 + 0x30; 64];
        s.store(va(i) + 100, &pattern);
    }
    assert_eq!(t.pool.allocated(), 3);
    assert_eq!(t.vm.frames().len(), 3);
    assert_eq!(t.vm.swap().used_slots(), 5);
    assert_mutually_consistent(&t.vm);

    for i in 0..8 {
        assert_eq!(s.load(va(i) + 100, 64), [i as u8 + 0x30; 64]);
        assert_mutually_consistent(&t.vm);
    }
    // 换入的页释放了自己的槽位，被换出的页占用新槽位
    assert_eq!(t.vm.swap().used_slots(), 5);
}

#[test]
fn test_second_chance_prefers_unaccessed_frame() {
    let t = TestVm::new(3, 8);
    let mut s = TestSpace::new(&t.vm, "clock");
    fill(&mut s, 4);
    for i in 0..3 {
        s.access(va(i), true).unwrap();
    }
    // 只有第一页保留访问位：它获得二次机会，第二页被换出
    for i in [1usize, 2] {
        let page = s.space.spt().find(Vaddr(va(i))).unwrap();
        page.lock().clear_accessed();
    }

    s.access(va(3), true).unwrap();

    let page = |i: usize| s.space.spt().find(Vaddr(va(i))).unwrap();
    assert!(page(0).lock().is_resident());
    assert!(!page(0).lock().is_accessed());
    assert!(!page(1).lock().is_resident());
    assert!(page(1).lock().swap_slot().is_some());
    assert!(page(2).lock().is_resident());
    assert!(page(3).lock().is_resident());
    assert_mutually_consistent(&t.vm);
}

#[test]
fn test_all_accessed_falls_back_to_first_frame() {
    let t = TestVm::new(2, 4);
    let mut s = TestSpace::new(&t.vm, "fallback");
    fill(&mut s, 3);
    s.access(va(0), true).unwrap();
    s.access(va(1), true).unwrap();

    s.access(va(2), true).unwrap();

    let page0 = s.space.spt().find(Vaddr(va(0))).unwrap();
    let page0 = page0.lock();
    assert!(!page0.is_resident());
    assert!(page0.swap_slot().is_some());
    assert_eq!(t.pool.allocated(), 2);
}

#[test]
fn test_busy_page_is_skipped() {
    let t = TestVm::new(2, 4);
    let mut s = TestSpace::new(&t.vm, "busy");
    fill(&mut s, 3);
    s.access(va(0), true).unwrap();
    s.access(va(1), true).unwrap();

    let page0 = s.space.spt().find(Vaddr(va(0))).unwrap();
    let guard = page0.lock();
    let handle = t.vm.frames().acquire_frame(t.vm.swap()).unwrap();
    assert!(guard.is_resident());
    drop(guard);

    let page1 = s.space.spt().find(Vaddr(va(1))).unwrap();
    assert!(!page1.lock().is_resident());
    t.vm.frames().release(handle.id);
}

#[test]
fn test_exhaustion_without_evictable_frame_is_out_of_memory() {
    let t = TestVm::new(1, 4);
    let mut s = TestSpace::new(&t.vm, "pinned");
    fill(&mut s, 2);
    s.access(va(0), true).unwrap();

    let page0 = s.space.spt().find(Vaddr(va(0))).unwrap();
    let _guard = page0.lock();
    assert_eq!(
        t.vm.frames().acquire_frame(t.vm.swap()).map(|h| h.id),
        Err(VmError::OutOfMemory)
    );
}

#[test]
fn test_reserved_frame_is_not_evicted() {
    let t = TestVm::new(1, 4);
    let handle = t.vm.frames().acquire_frame(t.vm.swap()).unwrap();
    assert_eq!(
        t.vm.frames().acquire_frame(t.vm.swap()).map(|h| h.id),
        Err(VmError::OutOfMemory)
    );
    t.vm.frames().release(handle.id);
    assert_eq!(t.pool.allocated(), 0);
}

#[test]
fn test_swap_exhaustion_fails_claim() {
    let t = TestVm::new(1, 0);
    let mut s = TestSpace::new(&t.vm, "noswap");
    fill(&mut s, 2);
    s.access(va(0), true).unwrap();

    assert_eq!(
        s.space.claim_page(Vaddr(va(1))),
        Err(VmError::SwapFull)
    );
    // 换出失败时原页保持驻留
    let page0 = s.space.spt().find(Vaddr(va(0))).unwrap();
    assert!(page0.lock().is_resident());
    assert_mutually_consistent(&t.vm);
}

#[test]
fn test_dirty_file_page_written_back_on_eviction() {
    let t = TestVm::new(1, 4);
    let mut s = TestSpace::new(&t.vm, "filevict");
    let (file, mock) = mock_file(alloc::vec![b'a'; page_size()]);
    s.space
        .mmap(Vaddr(0x1000_0000), page_size(), true, &file, 0)
        .unwrap();
    s.space
        .allocate_page(PageType::Anon, Vaddr(va(0)), true, None)
        .unwrap();

    s.store(0x1000_0000, b"zz");
    s.access(va(0), true).unwrap();

    assert_eq!(&mock.contents()[..3], b"zza");
    let page = s.space.spt().find(Vaddr(0x1000_0000)).unwrap();
    assert_eq!(page.lock().variant(), PageVariant::File);
    assert!(!page.lock().is_resident());
    // 文件页被换出不占用交换槽位
    assert_eq!(t.vm.swap().used_slots(), 0);

    assert_eq!(s.load(0x1000_0000, 3), b"zza");
}

#[test]
fn test_clean_file_page_is_not_written_back() {
    let t = TestVm::new(1, 4);
    let mut s = TestSpace::new(&t.vm, "clean");
    let (file, mock) = mock_file(alloc::vec![b'q'; 100]);
    s.space
        .mmap(Vaddr(0x1000_0000), page_size(), true, &file, 0)
        .unwrap();
    s.space
        .allocate_page(PageType::Anon, Vaddr(va(0)), true, None)
        .unwrap();

    s.load(0x1000_0000, 1);
    // 绕过页表直接改帧：没有脏位就不应写回
    s.space.write_bytes_at(Vaddr(0x1000_0000), b"X").unwrap();
    s.access(va(0), true).unwrap();
    assert_eq!(mock.contents(), alloc::vec![b'q'; 100]);
}
