//! Header fields of the shared segment.

use std::mem::{align_of, offset_of, size_of};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use super::body::{ByteRange, Scalar, TextRef};
use super::layout::{ADDRESS_OFFSET, BODY_SIZE, COMMAND_OFFSET, ERROR_OFFSET, LENGTH_OFFSET, SYNC_OFFSET, VALUE_OFFSET};
use crate::error::Fault;
use crate::types::{Address, CommandWord};

/// Control fields at the start of the segment
///
/// Every field is an atomic so a reference to the header can be shared with a
/// peer that writes through its own mapping. Loads and stores are `SeqCst`;
/// the handoff discipline (see [`crate::sync`]) decides who may write when.
#[repr(C)]
#[derive(Debug)]
pub struct Header
{
    command: AtomicU32,
    value: AtomicU32,
    address: AtomicU64,
    length: AtomicU32,
    error: AtomicU32,
}

const _: () = assert!(offset_of!(Header, command) == COMMAND_OFFSET);
const _: () = assert!(offset_of!(Header, value) == VALUE_OFFSET);
const _: () = assert!(offset_of!(Header, address) == ADDRESS_OFFSET);
const _: () = assert!(offset_of!(Header, length) == LENGTH_OFFSET);
const _: () = assert!(offset_of!(Header, error) == ERROR_OFFSET);
const _: () = assert!(size_of::<Header>() <= SYNC_OFFSET);
const _: () = assert!(align_of::<Header>() <= super::layout::SEGMENT_ALIGN);

impl Header
{
    /// Current command word.
    pub fn command(&self) -> CommandWord
    {
        CommandWord::from_raw(self.command.load(Ordering::SeqCst))
    }

    /// Publish a new command word.
    pub fn set_command(&self, word: CommandWord)
    {
        self.command.store(word.raw(), Ordering::SeqCst);
    }

    /// Generic 32-bit payload.
    pub fn value(&self) -> u32
    {
        self.value.load(Ordering::SeqCst)
    }

    pub fn set_value(&self, value: u32)
    {
        self.value.store(value, Ordering::SeqCst);
    }

    /// Address in the agent's address space.
    pub fn address(&self) -> Address
    {
        Address::new(self.address.load(Ordering::SeqCst))
    }

    pub fn set_address(&self, address: Address)
    {
        self.address.store(address.value(), Ordering::SeqCst);
    }

    /// Byte count for bulk transfers.
    pub fn length(&self) -> u32
    {
        self.length.load(Ordering::SeqCst)
    }

    pub fn set_length(&self, length: u32)
    {
        self.length.store(length, Ordering::SeqCst);
    }

    /// Fault flag raised by the agent.
    pub fn error(&self) -> bool
    {
        self.error.load(Ordering::SeqCst) != 0
    }

    pub fn set_error(&self, error: bool)
    {
        self.error.store(u32::from(error), Ordering::SeqCst);
    }

    /// Decode `address`/`length` as a bulk transfer, validated against the
    /// body capacity before anything is copied.
    ///
    /// ## Errors
    ///
    /// - `BodyOverflow`: `length` exceeds the body region
    /// - `InvalidAddress`: the range is null or wraps around the address space
    pub fn byte_range(&self) -> Result<ByteRange, Fault>
    {
        let len = usize::try_from(self.length()).unwrap_or(usize::MAX);
        ByteRange::new(self.address(), len, BODY_SIZE)
    }

    /// Decode `address` as the target of a `width` byte scalar transfer.
    ///
    /// ## Errors
    ///
    /// - `InvalidAddress`: null or wrapping address
    pub fn scalar(&self, width: usize) -> Result<Scalar, Fault>
    {
        Scalar::new(self.address(), width)
    }

    /// Decode `address` as a text object for the string commands.
    ///
    /// ## Errors
    ///
    /// - `InvalidAddress`: null address
    pub fn text_ref(&self) -> Result<TextRef, Fault>
    {
        TextRef::new(self.address())
    }

    /// Zero every field, leaving the command word at `RUNNING`.
    pub(crate) fn reset(&self)
    {
        self.value.store(0, Ordering::SeqCst);
        self.address.store(0, Ordering::SeqCst);
        self.length.store(0, Ordering::SeqCst);
        self.error.store(0, Ordering::SeqCst);
        self.command.store(CommandWord::RUNNING.raw(), Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::shm::Segment;

    #[test]
    fn test_fields_round_trip()
    {
        let segment = Segment::anonymous().unwrap();
        let header = segment.header();

        header.set_value(0xdead_beef);
        header.set_address(Address::new(0x7fff_0000_1000));
        header.set_length(64);
        header.set_error(true);

        assert_eq!(header.value(), 0xdead_beef);
        assert_eq!(header.address(), Address::new(0x7fff_0000_1000));
        assert_eq!(header.length(), 64);
        assert!(header.error());

        header.reset();
        assert_eq!(header.value(), 0);
        assert!(!header.error());
        assert!(header.command().is_running());
    }

    #[test]
    fn test_byte_range_rejects_oversized_length()
    {
        let segment = Segment::anonymous().unwrap();
        let header = segment.header();
        header.set_address(Address::new(0x1000));
        header.set_length(u32::try_from(BODY_SIZE + 1).unwrap());

        assert_eq!(
            header.byte_range(),
            Err(Fault::BodyOverflow {
                requested: BODY_SIZE + 1,
                capacity: BODY_SIZE,
            })
        );
    }

    #[test]
    fn test_scalar_descriptor()
    {
        let segment = Segment::anonymous().unwrap();
        let header = segment.header();

        header.set_address(Address::new(0x2000));
        let scalar = header.scalar(2).unwrap();
        assert_eq!(scalar.address(), Address::new(0x2000));
        assert_eq!(scalar.width(), 2);

        header.set_address(Address::NULL);
        assert_eq!(header.scalar(4), Err(Fault::InvalidAddress { address: Address::NULL, len: 4 }));

        header.set_address(Address::new(u64::MAX - 1));
        assert!(header.scalar(4).is_err());
        assert!(header.scalar(1).is_ok());
    }

    #[test]
    fn test_text_ref_descriptor()
    {
        let segment = Segment::anonymous().unwrap();
        let header = segment.header();

        header.set_address(Address::new(0x3000));
        assert_eq!(header.text_ref().unwrap().address(), Address::new(0x3000));

        header.set_address(Address::NULL);
        assert!(matches!(header.text_ref(), Err(Fault::InvalidAddress { len: 0, .. })));
    }
}
