//! Append-only storage for interned symbols.
//!
//! Ids are allocated with an atomic counter; the payload lives in lazily
//! installed fixed-size blocks so that a reference to a stored symbol stays
//! valid for the lifetime of the store. A separate watermark tracks how many
//! slots are fully written, which is what [`SymbolStore::size`] reports.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

/// Symbol slots per block.
const BLOCK_SIZE: usize = 1 << 16;

/// Block pointers in the directory.
const BLOCK_COUNT: usize = 1 << 16;

/// Upper bound on allocatable ids. The top `u32` value is reserved as the
/// index's claim sentinel and must never become a valid id.
const MAX_SYMBOLS: usize = u32::MAX as usize;

struct Slot(UnsafeCell<MaybeUninit<String>>);

impl Slot {
    fn new() -> Self {
        Slot(UnsafeCell::new(MaybeUninit::uninit()))
    }
}

/// Append-only indexed vector of interned strings.
///
/// `append` is callable from any number of threads; each id is handed out
/// exactly once and its slot is written by the allocating thread before the
/// watermark moves past it (release ordering), so readers that observe
/// `size() > id` observe the full symbol bytes.
pub(crate) struct SymbolStore {
    blocks: Box<[AtomicPtr<Slot>]>,
    /// Id allocator.
    next: AtomicUsize,
    /// Count of fully written slots; trails `next` while writes are in flight.
    published: AtomicUsize,
}

// Safety: a slot is written exactly once, by the thread that allocated its id,
// before `published` is advanced past it; readers only dereference slots below
// an acquire-loaded `published`.
unsafe impl Send for SymbolStore {}
unsafe impl Sync for SymbolStore {}

impl SymbolStore {
    pub(crate) fn new() -> Self {
        SymbolStore {
            blocks: (0..BLOCK_COUNT).map(|_| AtomicPtr::new(ptr::null_mut())).collect(),
            next: AtomicUsize::new(0),
            published: AtomicUsize::new(0),
        }
    }

    /// Store `symbol` under a fresh id and return the id.
    ///
    /// # Panics
    ///
    /// Panics when the id space is exhausted. There is no way to recover the
    /// table at that point.
    pub(crate) fn append(&self, symbol: String) -> u32 {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        assert!(id < MAX_SYMBOLS, "symbol store capacity exhausted");

        let slot = self.slot_for(id);
        unsafe {
            (*slot.0.get()).write(symbol);
        }

        // Advance the watermark in allocation order so that every id below it
        // refers to a fully written slot.
        while self
            .published
            .compare_exchange_weak(id, id + 1, Ordering::Release, Ordering::Relaxed)
            .is_err()
        {
            std::hint::spin_loop();
        }

        id as u32
    }

    /// Borrow the symbol stored under `id`. The caller must have checked
    /// `id < size()`.
    pub(crate) fn get(&self, id: usize) -> &str {
        debug_assert!(id < self.size(), "unpublished symbol id");
        let block = self.blocks[id / BLOCK_SIZE].load(Ordering::Acquire);
        assert!(!block.is_null(), "unpublished symbol id");
        unsafe { (*(*block.add(id % BLOCK_SIZE)).0.get()).assume_init_ref().as_str() }
    }

    /// Number of fully published symbols.
    pub(crate) fn size(&self) -> usize {
        self.published.load(Ordering::Acquire)
    }

    fn slot_for(&self, id: usize) -> &Slot {
        let entry = &self.blocks[id / BLOCK_SIZE];
        let mut block = entry.load(Ordering::Acquire);
        if block.is_null() {
            let fresh = Self::alloc_block();
            match entry.compare_exchange(ptr::null_mut(), fresh, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => block = fresh,
                Err(winner) => {
                    // Lost the installation race; free the speculative block.
                    unsafe { Self::free_block(fresh, 0) };
                    block = winner;
                }
            }
        }
        unsafe { &*block.add(id % BLOCK_SIZE) }
    }

    fn alloc_block() -> *mut Slot {
        let block: Box<[Slot]> = (0..BLOCK_SIZE).map(|_| Slot::new()).collect();
        Box::into_raw(block).cast::<Slot>()
    }

    /// Drop `initialized` leading slots and free the block allocation.
    unsafe fn free_block(block: *mut Slot, initialized: usize) {
        for i in 0..initialized {
            ptr::drop_in_place((*block.add(i)).0.get().cast::<String>());
        }
        drop(Box::from_raw(ptr::slice_from_raw_parts_mut(block, BLOCK_SIZE)));
    }
}

impl Drop for SymbolStore {
    fn drop(&mut self) {
        let published = *self.published.get_mut();
        for (index, entry) in self.blocks.iter_mut().enumerate() {
            let block = *entry.get_mut();
            if block.is_null() {
                continue;
            }
            let initialized = published.saturating_sub(index * BLOCK_SIZE).min(BLOCK_SIZE);
            unsafe { Self::free_block(block, initialized) };
        }
    }
}
