//! Handle on the mapped segment.
//!
//! Discovering or creating the segment that a controller attaches to is left
//! to the hosting code. This module only needs a base pointer and a length;
//! [`Segment::anonymous`] exists for in-process use (tests, the self test,
//! forked children).

use std::io;
use std::ptr::{self, NonNull};
use std::sync::Arc;

use once_cell::sync::Lazy;
use tracing::debug;

use super::body::Body;
use super::header::Header;
use super::layout::{BODY_OFFSET, BODY_SIZE, SEGMENT_ALIGN, SEGMENT_SIZE, SYNC_OFFSET};
use crate::error::{BridgeError, BridgeResult};
use crate::types::Address;

static SYSTEM_PAGE_SIZE: Lazy<usize> = Lazy::new(|| unsafe {
    let size = libc::sysconf(libc::_SC_PAGESIZE);
    if size <= 0 { 4096 } else { size as usize }
});

fn page_align_up(value: usize, page_size: usize) -> usize
{
    (value + page_size - 1) & !(page_size - 1)
}

struct Mapping
{
    base: NonNull<u8>,
    len: usize,
    owned: bool,
}

// SAFETY: the mapping is plain shared memory; all typed access goes through
// atomics (header), the sync block's process-shared primitives, or the body
// under the handoff discipline.
unsafe impl Send for Mapping {}
unsafe impl Sync for Mapping {}

impl Drop for Mapping
{
    fn drop(&mut self)
    {
        if self.owned {
            // Best effort unmap - nothing useful to do on failure
            unsafe {
                let _ = libc::munmap(self.base.as_ptr().cast(), self.len);
            }
        }
    }
}

/// Shared segment handle
///
/// Clones refer to the same mapping. An owned mapping is unmapped when the
/// last clone is dropped; a borrowed one (see [`Segment::from_raw`]) is left
/// alone.
#[derive(Clone)]
pub struct Segment
{
    mapping: Arc<Mapping>,
}

impl Segment
{
    /// Map a fresh, zeroed, shared anonymous segment.
    ///
    /// The mapping is `MAP_SHARED`, so it stays shared with children forked
    /// after this call.
    ///
    /// ## Errors
    ///
    /// - `MapFailed`: `mmap()` refused the mapping
    pub fn anonymous() -> BridgeResult<Self>
    {
        let len = page_align_up(SEGMENT_SIZE, *SYSTEM_PAGE_SIZE);
        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_ANON,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(BridgeError::MapFailed(io::Error::last_os_error()));
        }
        let base = NonNull::new(base.cast::<u8>())
            .ok_or_else(|| BridgeError::MapFailed(io::Error::other("mmap() returned null")))?;

        debug!(len, base = %Address::from(base.as_ptr()), "mapped anonymous segment");
        Ok(Self {
            mapping: Arc::new(Mapping { base, len, owned: true }),
        })
    }

    /// Attach to a mapping created elsewhere.
    ///
    /// ## Safety
    ///
    /// `base` must point to a mapping of at least `len` readable and
    /// writable bytes that stays mapped for as long as any clone of the
    /// returned handle exists, and whose peer follows the same layout.
    ///
    /// ## Errors
    ///
    /// - `InvalidArgument`: `base` is null
    /// - `SegmentTooSmall`: `len < SEGMENT_SIZE`
    /// - `Misaligned`: `base` is not 8-byte aligned
    pub unsafe fn from_raw(base: *mut u8, len: usize) -> BridgeResult<Self>
    {
        let Some(base) = NonNull::new(base) else {
            return Err(BridgeError::InvalidArgument("segment base is null".to_string()));
        };
        if len < SEGMENT_SIZE {
            return Err(BridgeError::SegmentTooSmall {
                required: SEGMENT_SIZE,
                actual: len,
            });
        }
        if base.as_ptr() as usize % SEGMENT_ALIGN != 0 {
            return Err(BridgeError::Misaligned(Address::from(base.as_ptr())));
        }
        Ok(Self {
            mapping: Arc::new(Mapping { base, len, owned: false }),
        })
    }

    /// Size of the underlying mapping.
    pub fn len(&self) -> usize
    {
        self.mapping.len
    }

    /// Always `false`; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool
    {
        self.mapping.len == 0
    }

    /// Base address of the mapping in this process.
    pub fn base_address(&self) -> Address
    {
        Address::from(self.mapping.base.as_ptr())
    }

    /// Header fields.
    pub fn header(&self) -> &Header
    {
        // SAFETY: the mapping is at least SEGMENT_SIZE bytes, aligned, and
        // Header is made of atomics, valid for any bit pattern.
        unsafe { &*self.mapping.base.as_ptr().cast::<Header>() }
    }

    /// Body region.
    pub fn body(&self) -> Body<'_>
    {
        // SAFETY: BODY_OFFSET + BODY_SIZE == SEGMENT_SIZE <= len.
        unsafe {
            let base = NonNull::new_unchecked(self.mapping.base.as_ptr().add(BODY_OFFSET));
            Body::from_raw(base, BODY_SIZE)
        }
    }

    /// Start of the synchronization block.
    pub(crate) fn sync_block(&self) -> NonNull<u8>
    {
        // SAFETY: SYNC_OFFSET < SEGMENT_SIZE <= len.
        unsafe { NonNull::new_unchecked(self.mapping.base.as_ptr().add(SYNC_OFFSET)) }
    }
}

impl std::fmt::Debug for Segment
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("Segment")
            .field("base", &self.base_address())
            .field("len", &self.mapping.len)
            .field("owned", &self.mapping.owned)
            .finish()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_anonymous_is_zeroed_and_page_aligned()
    {
        let segment = Segment::anonymous().unwrap();
        assert!(segment.len() >= SEGMENT_SIZE);
        assert_eq!(segment.len() % *SYSTEM_PAGE_SIZE, 0);
        assert!(segment.header().command().is_running());
        assert_eq!(segment.header().value(), 0);
    }

    #[test]
    fn test_clones_share_memory()
    {
        let segment = Segment::anonymous().unwrap();
        let other = segment.clone();
        segment.header().set_value(99);
        assert_eq!(other.header().value(), 99);
        assert_eq!(segment.base_address(), other.base_address());
    }

    #[test]
    fn test_from_raw_validates()
    {
        let mut small = vec![0u64; 16];
        let result = unsafe { Segment::from_raw(small.as_mut_ptr().cast(), 128) };
        assert!(matches!(result, Err(BridgeError::SegmentTooSmall { .. })));

        let result = unsafe { Segment::from_raw(ptr::null_mut(), SEGMENT_SIZE) };
        assert!(matches!(result, Err(BridgeError::InvalidArgument(_))));
    }

    #[test]
    fn test_from_raw_borrows()
    {
        let owner = Segment::anonymous().unwrap();
        let base = owner.mapping.base.as_ptr();
        let borrowed = unsafe { Segment::from_raw(base, owner.len()).unwrap() };
        borrowed.header().set_length(7);
        drop(borrowed);
        assert_eq!(owner.header().length(), 7);
    }

    #[test]
    fn test_page_align_up()
    {
        assert_eq!(page_align_up(1, 4096), 4096);
        assert_eq!(page_align_up(4096, 4096), 4096);
        assert_eq!(page_align_up(SEGMENT_SIZE, 4096), SEGMENT_SIZE + 3072);
    }
}
