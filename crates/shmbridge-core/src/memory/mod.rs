//! # Agent Memory Access
//!
//! Core module handlers never dereference header addresses directly; they go
//! through an [`AddressSpace`]. Two implementations ship with the crate:
//!
//! - [`LocalMemory`]: the hosting process's real address space
//! - [`ArenaMemory`]: a bounded sandbox with a string table, used by the self
//!   test and the test suites

pub mod arena;
pub mod local;

pub use arena::ArenaMemory;
pub use local::LocalMemory;

use crate::error::Fault;
use crate::types::Address;

/// Memory the Core module reads and writes on behalf of the controller
///
/// Text targets are owned, growable buffers identified by address; reading
/// one yields its bytes without a terminator, writing one replaces its whole
/// contents.
pub trait AddressSpace: Send
{
    /// Copy `out.len()` bytes starting at `address`.
    fn read(&self, address: Address, out: &mut [u8]) -> Result<(), Fault>;

    /// Copy `data` to `address`.
    fn write(&mut self, address: Address, data: &[u8]) -> Result<(), Fault>;

    /// Contents of the text buffer at `address`.
    fn read_text(&self, address: Address) -> Result<Vec<u8>, Fault>;

    /// Replace the contents of the text buffer at `address`.
    fn write_text(&mut self, address: Address, text: &[u8]) -> Result<(), Fault>;
}

impl<A: AddressSpace + ?Sized> AddressSpace for Box<A>
{
    fn read(&self, address: Address, out: &mut [u8]) -> Result<(), Fault>
    {
        (**self).read(address, out)
    }

    fn write(&mut self, address: Address, data: &[u8]) -> Result<(), Fault>
    {
        (**self).write(address, data)
    }

    fn read_text(&self, address: Address) -> Result<Vec<u8>, Fault>
    {
        (**self).read_text(address)
    }

    fn write_text(&mut self, address: Address, text: &[u8]) -> Result<(), Fault>
    {
        (**self).write_text(address, text)
    }
}
