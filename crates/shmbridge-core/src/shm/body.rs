//! Bulk payload region and transfer descriptors.

use std::marker::PhantomData;
use std::ptr::{self, NonNull};

use crate::error::Fault;
use crate::types::Address;

/// A validated bulk transfer: `len` bytes at `address` in the agent's
/// memory, guaranteed to fit in the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange
{
    address: Address,
    len: usize,
}

impl ByteRange
{
    /// Validate a transfer against a body of `capacity` bytes.
    ///
    /// ## Errors
    ///
    /// - `BodyOverflow`: `len > capacity`
    /// - `InvalidAddress`: non-empty range at the null address, or a range
    ///   that wraps around the address space
    pub fn new(address: Address, len: usize, capacity: usize) -> Result<Self, Fault>
    {
        if len > capacity {
            return Err(Fault::BodyOverflow { requested: len, capacity });
        }
        if len > 0 && (address.is_null() || address.range_end(len).is_none()) {
            return Err(Fault::InvalidAddress { address, len });
        }
        Ok(Self { address, len })
    }

    pub fn address(&self) -> Address
    {
        self.address
    }

    pub fn len(&self) -> usize
    {
        self.len
    }

    pub fn is_empty(&self) -> bool
    {
        self.len == 0
    }
}

/// A validated scalar target: `width` bytes (1, 2 or 4) at `address`,
/// moved through the header `value` slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scalar
{
    address: Address,
    width: usize,
}

impl Scalar
{
    /// ## Errors
    ///
    /// - `InvalidAddress`: null address, or a range that wraps around
    pub fn new(address: Address, width: usize) -> Result<Self, Fault>
    {
        debug_assert!(matches!(width, 1 | 2 | 4), "scalar width {width}");
        if address.is_null() || address.range_end(width).is_none() {
            return Err(Fault::InvalidAddress { address, len: width });
        }
        Ok(Self { address, width })
    }

    pub fn address(&self) -> Address
    {
        self.address
    }

    pub fn width(&self) -> usize
    {
        self.width
    }
}

/// Location of a text object in the agent's memory. What lives there is up
/// to the [`crate::memory::AddressSpace`] serving the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextRef(Address);

impl TextRef
{
    /// ## Errors
    ///
    /// - `InvalidAddress`: null address
    pub fn new(address: Address) -> Result<Self, Fault>
    {
        if address.is_null() {
            return Err(Fault::InvalidAddress { address, len: 0 });
        }
        Ok(Self(address))
    }

    pub fn address(&self) -> Address
    {
        self.0
    }
}

/// Bounds-checked view of the body region
///
/// All access copies through raw pointers into or out of caller-owned
/// buffers; no slice over the shared region ever escapes, since the peer
/// maps the same bytes.
///
/// Only the side that currently owns the header (see [`crate::sync`]) may
/// use the body.
pub struct Body<'a>
{
    base: NonNull<u8>,
    capacity: usize,
    _segment: PhantomData<&'a ()>,
}

impl<'a> Body<'a>
{
    /// ## Safety
    ///
    /// `base` must be valid for reads and writes of `capacity` bytes for `'a`.
    pub(crate) unsafe fn from_raw(base: NonNull<u8>, capacity: usize) -> Self
    {
        Self {
            base,
            capacity,
            _segment: PhantomData,
        }
    }

    /// Size of the region in bytes.
    pub fn capacity(&self) -> usize
    {
        self.capacity
    }

    fn check(&self, offset: usize, len: usize) -> Result<(), Fault>
    {
        match offset.checked_add(len) {
            Some(end) if end <= self.capacity => Ok(()),
            _ => Err(Fault::BodyOverflow {
                requested: offset.saturating_add(len),
                capacity: self.capacity,
            }),
        }
    }

    /// Copy `out.len()` bytes starting at `offset` out of the body.
    pub fn read(&self, offset: usize, out: &mut [u8]) -> Result<(), Fault>
    {
        self.check(offset, out.len())?;
        // SAFETY: range checked against capacity above.
        unsafe {
            ptr::copy_nonoverlapping(self.base.as_ptr().add(offset), out.as_mut_ptr(), out.len());
        }
        Ok(())
    }

    /// Copy `data` into the body starting at `offset`.
    pub fn write(&self, offset: usize, data: &[u8]) -> Result<(), Fault>
    {
        self.check(offset, data.len())?;
        // SAFETY: range checked against capacity above.
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), self.base.as_ptr().add(offset), data.len());
        }
        Ok(())
    }

    /// Read the NUL-terminated run starting at `offset`, without the
    /// terminator.
    ///
    /// ## Errors
    ///
    /// - `MissingTerminator`: no NUL before the end of the body
    /// - `BodyOverflow`: `offset` is past the end of the body
    pub fn read_terminated(&self, offset: usize) -> Result<Vec<u8>, Fault>
    {
        self.check(offset, 0)?;
        let mut text = Vec::new();
        for index in offset..self.capacity {
            // SAFETY: index < capacity.
            let byte = unsafe { self.base.as_ptr().add(index).read() };
            if byte == 0 {
                return Ok(text);
            }
            text.push(byte);
        }
        Err(Fault::MissingTerminator)
    }

    /// Write `data` followed by a NUL terminator at `offset`.
    ///
    /// ## Errors
    ///
    /// - `BodyOverflow`: `data.len() + 1` bytes do not fit; nothing is written
    pub fn write_terminated(&self, offset: usize, data: &[u8]) -> Result<(), Fault>
    {
        self.check(offset, data.len().saturating_add(1))?;
        self.write(offset, data)?;
        self.write(offset + data.len(), &[0])
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::shm::{Segment, BODY_SIZE};

    #[test]
    fn test_byte_range_limits()
    {
        assert!(ByteRange::new(Address::new(0x1000), 16, 16).is_ok());
        assert!(ByteRange::new(Address::NULL, 0, 16).unwrap().is_empty());
        assert_eq!(
            ByteRange::new(Address::new(0x1000), 17, 16),
            Err(Fault::BodyOverflow {
                requested: 17,
                capacity: 16
            })
        );
        assert!(matches!(
            ByteRange::new(Address::NULL, 4, 16),
            Err(Fault::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_read_write()
    {
        let segment = Segment::anonymous().unwrap();
        let body = segment.body();
        assert_eq!(body.capacity(), BODY_SIZE);

        body.write(10, b"payload").unwrap();
        let mut out = [0u8; 7];
        body.read(10, &mut out).unwrap();
        assert_eq!(&out, b"payload");
    }

    #[test]
    fn test_out_of_bounds_is_rejected()
    {
        let segment = Segment::anonymous().unwrap();
        let body = segment.body();
        let mut out = [0u8; 8];
        assert!(body.read(BODY_SIZE - 4, &mut out).is_err());
        assert!(body.write(usize::MAX, b"x").is_err());
    }

    #[test]
    fn test_terminated_text()
    {
        let segment = Segment::anonymous().unwrap();
        let body = segment.body();
        body.write_terminated(0, b"hello").unwrap();
        assert_eq!(body.read_terminated(0).unwrap(), b"hello");
        assert_eq!(body.read_terminated(5).unwrap(), b"");
    }

    #[test]
    fn test_terminator_must_fit()
    {
        let segment = Segment::anonymous().unwrap();
        let body = segment.body();
        let text = vec![b'a'; BODY_SIZE];
        assert!(matches!(
            body.write_terminated(0, &text),
            Err(Fault::BodyOverflow { .. })
        ));
    }

    #[test]
    fn test_missing_terminator()
    {
        let segment = Segment::anonymous().unwrap();
        let body = segment.body();
        let filler = vec![b'z'; BODY_SIZE];
        body.write(0, &filler).unwrap();
        assert_eq!(body.read_terminated(0), Err(Fault::MissingTerminator));
    }
}
