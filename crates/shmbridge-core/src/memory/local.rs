//! The hosting process's own address space.

use std::ptr;

use super::AddressSpace;
use crate::error::Fault;
use crate::types::Address;

/// Direct access to the agent's address space
///
/// Addresses are dereferenced as-is. Text targets are `String`s: the address
/// is a `*mut String` owned by the hosting code.
///
/// There is no way to probe whether an arbitrary address is mapped without
/// faulting, so beyond null and wrap-around checks the controller is trusted,
/// which is what [`LocalMemory::new`] being `unsafe` records.
#[derive(Debug)]
pub struct LocalMemory
{
    _private: (),
}

impl LocalMemory
{
    /// ## Safety
    ///
    /// Every address the controller sends must be valid for the access the
    /// command implies: readable/writable for the requested length, and for
    /// text commands, a live `String` not accessed concurrently elsewhere.
    #[must_use]
    pub unsafe fn new() -> Self
    {
        Self { _private: () }
    }

    fn pointer(address: Address, len: usize) -> Result<usize, Fault>
    {
        if address.is_null() || address.range_end(len).is_none() {
            return Err(Fault::InvalidAddress { address, len });
        }
        usize::try_from(address.value()).map_err(|_| Fault::InvalidAddress { address, len })
    }
}

impl AddressSpace for LocalMemory
{
    fn read(&self, address: Address, out: &mut [u8]) -> Result<(), Fault>
    {
        if out.is_empty() {
            return Ok(());
        }
        let src = Self::pointer(address, out.len())? as *const u8;
        // SAFETY: upheld by the contract of `LocalMemory::new`.
        unsafe { ptr::copy_nonoverlapping(src, out.as_mut_ptr(), out.len()) };
        Ok(())
    }

    fn write(&mut self, address: Address, data: &[u8]) -> Result<(), Fault>
    {
        if data.is_empty() {
            return Ok(());
        }
        let dst = Self::pointer(address, data.len())? as *mut u8;
        // SAFETY: upheld by the contract of `LocalMemory::new`.
        unsafe { ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len()) };
        Ok(())
    }

    fn read_text(&self, address: Address) -> Result<Vec<u8>, Fault>
    {
        let target = Self::pointer(address, std::mem::size_of::<String>())? as *const String;
        // SAFETY: upheld by the contract of `LocalMemory::new`.
        Ok(unsafe { (*target).as_bytes().to_vec() })
    }

    fn write_text(&mut self, address: Address, text: &[u8]) -> Result<(), Fault>
    {
        let target = Self::pointer(address, std::mem::size_of::<String>())? as *mut String;
        let text = std::str::from_utf8(text).map_err(|_| Fault::InvalidText)?;
        // SAFETY: upheld by the contract of `LocalMemory::new`.
        unsafe {
            (*target).clear();
            (*target).push_str(text);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_scalar_access()
    {
        let mut memory = unsafe { LocalMemory::new() };
        let mut cell: u32 = 0x1122_3344;
        let address = Address::from(&mut cell as *mut u32);

        let mut out = [0u8; 4];
        memory.read(address, &mut out).unwrap();
        assert_eq!(u32::from_ne_bytes(out), 0x1122_3344);

        memory.write(address, &0xffff_ffffu32.to_ne_bytes()).unwrap();
        assert_eq!(cell, 0xffff_ffff);
    }

    #[test]
    fn test_text_access()
    {
        let mut memory = unsafe { LocalMemory::new() };
        let mut text = String::from("before");
        let address = Address::from(&mut text as *mut String);

        assert_eq!(memory.read_text(address).unwrap(), b"before");
        memory.write_text(address, b"after").unwrap();
        assert_eq!(text, "after");
    }

    #[test]
    fn test_rejects_null_and_bad_utf8()
    {
        let mut memory = unsafe { LocalMemory::new() };
        let mut out = [0u8; 1];
        assert!(memory.read(Address::NULL, &mut out).is_err());

        let mut text = String::new();
        let address = Address::from(&mut text as *mut String);
        assert_eq!(memory.write_text(address, &[0xff, 0xfe]), Err(Fault::InvalidText));
        assert!(text.is_empty());
    }
}
