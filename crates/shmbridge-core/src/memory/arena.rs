//! Sandboxed address space backed by owned buffers.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::AddressSpace;
use crate::error::Fault;
use crate::types::Address;

/// Spacing between string handles.
const STRING_STRIDE: u64 = 0x10;

struct Arena
{
    base: Address,
    bytes: Vec<u8>,
    strings: BTreeMap<Address, String>,
    next_string: Address,
}

impl Arena
{
    fn offset(&self, address: Address, len: usize) -> Result<usize, Fault>
    {
        let invalid = || Fault::InvalidAddress { address, len };
        let offset = address.value().checked_sub(self.base.value()).ok_or_else(invalid)?;
        let offset = usize::try_from(offset).map_err(|_| invalid())?;
        match offset.checked_add(len) {
            Some(end) if end <= self.bytes.len() => Ok(offset),
            _ => Err(invalid()),
        }
    }
}

/// A bounded region of fake agent memory plus a table of text buffers
///
/// Byte accesses outside `[base, base + size)` fail with `InvalidAddress`
/// instead of faulting the process. Text buffers get handles above the byte
/// region. Clones share the same arena, so a test can keep one handle and
/// inspect what the agent wrote through another.
///
/// ## Example
///
/// ```rust
/// use shmbridge_core::memory::{AddressSpace, ArenaMemory};
/// use shmbridge_core::types::Address;
///
/// let arena = ArenaMemory::new(Address::new(0x1000), 64);
/// let mut view = arena.clone();
/// view.write(Address::new(0x1004), &[1, 2, 3]).unwrap();
/// assert_eq!(arena.peek(Address::new(0x1004), 3), Some(vec![1, 2, 3]));
/// ```
#[derive(Clone)]
pub struct ArenaMemory
{
    inner: Arc<Mutex<Arena>>,
}

impl ArenaMemory
{
    /// Zeroed region of `size` bytes starting at `base`.
    ///
    /// # Panics
    ///
    /// Panics if `base` is null or the region would wrap the address space.
    #[must_use]
    pub fn new(base: Address, size: usize) -> Self
    {
        assert!(!base.is_null(), "arena base must not be null");
        let end = base.range_end(size).expect("arena must not wrap the address space");
        let next_string = end
            .checked_add(STRING_STRIDE)
            .expect("arena must leave room for string handles");
        Self {
            inner: Arc::new(Mutex::new(Arena {
                base,
                bytes: vec![0; size],
                strings: BTreeMap::new(),
                next_string,
            })),
        }
    }

    fn arena(&self) -> MutexGuard<'_, Arena>
    {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// First address of the byte region.
    pub fn base(&self) -> Address
    {
        self.arena().base
    }

    /// Size of the byte region.
    pub fn size(&self) -> usize
    {
        self.arena().bytes.len()
    }

    /// Copy of `len` bytes at `address`, or `None` if out of range.
    pub fn peek(&self, address: Address, len: usize) -> Option<Vec<u8>>
    {
        let arena = self.arena();
        let offset = arena.offset(address, len).ok()?;
        Some(arena.bytes[offset..offset + len].to_vec())
    }

    /// Write bytes directly, bypassing the bridge.
    pub fn poke(&self, address: Address, data: &[u8]) -> Result<(), Fault>
    {
        let mut arena = self.arena();
        let offset = arena.offset(address, data.len())?;
        arena.bytes[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Allocate a text buffer holding `text` and return its handle.
    pub fn alloc_string(&self, text: &str) -> Address
    {
        let mut arena = self.arena();
        let handle = arena.next_string;
        arena.next_string = handle.checked_add(STRING_STRIDE).unwrap_or(handle);
        arena.strings.insert(handle, text.to_string());
        handle
    }

    /// Current contents of the text buffer at `handle`.
    pub fn string(&self, handle: Address) -> Option<String>
    {
        self.arena().strings.get(&handle).cloned()
    }
}

impl AddressSpace for ArenaMemory
{
    fn read(&self, address: Address, out: &mut [u8]) -> Result<(), Fault>
    {
        let arena = self.arena();
        let offset = arena.offset(address, out.len())?;
        out.copy_from_slice(&arena.bytes[offset..offset + out.len()]);
        Ok(())
    }

    fn write(&mut self, address: Address, data: &[u8]) -> Result<(), Fault>
    {
        self.poke(address, data)
    }

    fn read_text(&self, address: Address) -> Result<Vec<u8>, Fault>
    {
        self.arena()
            .strings
            .get(&address)
            .map(|text| text.as_bytes().to_vec())
            .ok_or(Fault::InvalidAddress { address, len: 0 })
    }

    fn write_text(&mut self, address: Address, text: &[u8]) -> Result<(), Fault>
    {
        let text = std::str::from_utf8(text).map_err(|_| Fault::InvalidText)?;
        let mut arena = self.arena();
        let target = arena
            .strings
            .get_mut(&address)
            .ok_or(Fault::InvalidAddress { address, len: 0 })?;
        target.clear();
        target.push_str(text);
        Ok(())
    }
}

impl std::fmt::Debug for ArenaMemory
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        let arena = self.arena();
        f.debug_struct("ArenaMemory")
            .field("base", &arena.base)
            .field("size", &arena.bytes.len())
            .field("strings", &arena.strings.len())
            .finish()
    }
}
