// Scenario tests for the virtual memory subsystem.
//
// Collaborators (frame pool, page table, files, swap disk) come from `test-support`;
// this module implements the crate's traits for them and registers the global config once.

use crate::address::{PageNum, Paddr, Ppn, UsizeConvert, Vaddr, Vpn};
use crate::arch_ops::{register_arch_ops, ArchVmOps};
use crate::config::{page_size, register_config, VmConfig};
use crate::error::{VmError, VmResult};
use crate::fault::PageFault;
use crate::file::VmFile;
use crate::frame_table::FrameAllocator;
use crate::page_table::{PageTable, PteFlags};
use crate::space::AddressSpace;
use crate::swap::{BlockDevice, SwapTable};
use crate::vm::Vm;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};
use test_support::mock::arch::MOCK_ARCH_OPS;
use test_support::mock::device::MockBlockDevice;
use test_support::mock::fs::MockFile;
use test_support::mock::mm::{
    MockFrameAllocator, MockPageTable, MockVmConfig, MockVmOps, MOCK_VM_CONFIG, MOCK_VM_OPS,
};

mod eviction;
mod fork;

impl VmConfig for MockVmConfig {
    fn page_size(&self) -> usize {
        MockVmConfig::page_size(self)
    }

    fn user_stack_top(&self) -> usize {
        MockVmConfig::user_stack_top(self)
    }

    fn max_stack_size(&self) -> usize {
        MockVmConfig::max_stack_size(self)
    }

    fn user_space_end(&self) -> usize {
        MockVmConfig::user_space_end(self)
    }
}

impl ArchVmOps for MockVmOps {
    unsafe fn vaddr_to_paddr(&self, vaddr: usize) -> usize {
        unsafe { MockVmOps::vaddr_to_paddr(self, vaddr) }
    }

    fn paddr_to_vaddr(&self, paddr: usize) -> usize {
        MockVmOps::paddr_to_vaddr(self, paddr)
    }
}

impl FrameAllocator for MockFrameAllocator {
    fn alloc_frame(&self) -> Option<Paddr> {
        self.alloc().map(Paddr)
    }

    fn dealloc_frame(&self, paddr: Paddr) {
        self.dealloc(paddr.as_usize());
    }
}

impl PageTable for MockPageTable {
    fn map(&self, vpn: Vpn, ppn: Ppn, flags: PteFlags) -> VmResult<()> {
        if self.insert(vpn.0, ppn.0, flags.bits()) {
            Ok(())
        } else {
            Err(VmError::AlreadyMapped)
        }
    }

    fn unmap(&self, vpn: Vpn) -> VmResult<()> {
        if self.remove(vpn.0) {
            Ok(())
        } else {
            Err(VmError::NotMapped)
        }
    }

    fn translate(&self, vpn: Vpn) -> Option<Ppn> {
        self.lookup(vpn.0).map(|(ppn, _)| Ppn(ppn))
    }

    fn flags(&self, vpn: Vpn) -> Option<PteFlags> {
        self.lookup(vpn.0)
            .map(|(_, bits)| PteFlags::from_bits_truncate(bits))
    }

    fn update_flags(&self, vpn: Vpn, flags: PteFlags) -> VmResult<()> {
        if self.set_flags(vpn.0, flags.bits()) {
            Ok(())
        } else {
            Err(VmError::NotMapped)
        }
    }
}

impl VmFile for MockFile {
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> VmResult<usize> {
        Ok(self.read_bytes(offset, buf))
    }

    fn write_at(&self, offset: usize, buf: &[u8]) -> VmResult<usize> {
        Ok(self.write_bytes(offset, buf))
    }

    fn length(&self) -> usize {
        self.size()
    }

    fn reopen(&self) -> VmResult<Arc<dyn VmFile>> {
        Ok(Arc::new(self.duplicate()))
    }
}

impl BlockDevice for MockBlockDevice {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> bool {
        self.read_sector(block_id, buf)
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> bool {
        self.write_sector(block_id, buf)
    }

    fn block_size(&self) -> usize {
        self.sector_size()
    }

    fn total_blocks(&self) -> usize {
        self.sector_count()
    }
}

// 0 = uninit, 1 = initializing, 2 = ready
static TEST_ENV_INIT: AtomicUsize = AtomicUsize::new(0);

/// Registers the mock config and address conversion exactly once per test binary.
pub(crate) fn init_test_env() {
    match TEST_ENV_INIT.compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire) {
        Ok(_) => {
            // Safety: tests use single global mock instances.
            unsafe {
                register_config(&MOCK_VM_CONFIG);
                register_arch_ops(&MOCK_VM_OPS);
                sync::register_arch_ops(&MOCK_ARCH_OPS);
            }
            TEST_ENV_INIT.store(2, Ordering::Release);
        }
        Err(_) => {
            while TEST_ENV_INIT.load(Ordering::Acquire) != 2 {
                core::hint::spin_loop();
            }
        }
    }
}

/// Swap disk with `sectors` 512-byte sectors.
pub(crate) fn swap_device(sectors: usize) -> Arc<dyn BlockDevice> {
    Arc::new(MockBlockDevice::new(sectors, 512))
}

/// Test fixture: a VM context over its own frame pool and swap disk.
pub(crate) struct TestVm {
    pub vm: Arc<Vm>,
    pub pool: Arc<MockFrameAllocator>,
}

impl TestVm {
    pub fn new(frames: usize, swap_pages: usize) -> Self {
        init_test_env();
        let pool = Arc::new(MockFrameAllocator::new(frames));
        let swap = if swap_pages == 0 {
            SwapTable::disabled()
        } else {
            SwapTable::new(swap_device(swap_pages * page_size() / 512)).unwrap()
        };
        let vm = Arc::new(Vm::new(pool.clone(), swap));
        Self { vm, pool }
    }
}

/// A process address space plus a handle to its mock hardware page table.
pub(crate) struct TestSpace {
    pub space: AddressSpace,
    pub pt: Arc<MockPageTable>,
}

impl TestSpace {
    pub fn new(vm: &Arc<Vm>, name: &str) -> Self {
        init_test_env();
        let pt = Arc::new(MockPageTable::new());
        let space = AddressSpace::new(name, vm.clone(), pt.clone());
        Self { space, pt }
    }

    /// Emulates a user access: faults the page in if the MMU would trap, then sets
    /// the accessed/dirty bits like hardware does.
    pub fn access(&mut self, va: usize, write: bool) -> Result<(), crate::fault::FaultError> {
        let vpn = Vpn::from_addr_floor(Vaddr(va)).as_usize();
        if self.pt.touch(vpn, write) {
            return Ok(());
        }
        let not_present = self.pt.lookup(vpn).is_none();
        let fault = user_fault(va, write, not_present, va);
        self.space.handle_fault(&fault)?;
        assert!(self.pt.touch(vpn, write));
        Ok(())
    }

    /// Writes `bytes` at `va` as a user store would.
    pub fn store(&mut self, va: usize, bytes: &[u8]) {
        let page = page_size();
        let mut cur = va;
        while cur < va + bytes.len() {
            self.access(cur, true).unwrap();
            cur = (cur / page + 1) * page;
        }
        self.space.write_bytes_at(Vaddr(va), bytes).unwrap();
    }

    /// Reads `len` bytes at `va` as a user load would.
    pub fn load(&mut self, va: usize, len: usize) -> Vec<u8> {
        let page = page_size();
        let mut cur = va;
        while cur < va + len {
            self.access(cur, false).unwrap();
            cur = (cur / page + 1) * page;
        }
        let mut out = alloc::vec![0u8; len];
        self.space.read_bytes_at(Vaddr(va), &mut out).unwrap();
        out
    }
}

pub(crate) fn user_fault(addr: usize, write: bool, not_present: bool, rsp: usize) -> PageFault {
    PageFault {
        addr: Vaddr(addr),
        user: true,
        write,
        not_present,
        rsp,
    }
}

/// Creates a mock file and returns it both as the trait object and as the mock.
pub(crate) fn mock_file(contents: Vec<u8>) -> (Arc<dyn VmFile>, Arc<MockFile>) {
    let file = Arc::new(MockFile::new(contents));
    (file.clone(), file)
}

/// Checks that every tracked frame and the pages resident on it point at each other.
pub(crate) fn assert_mutually_consistent(vm: &Vm) {
    for id in vm.frames().frame_ids() {
        for page in vm.frames().resident_pages(id) {
            assert_eq!(page.lock().frame(), Some(id));
        }
    }
}
