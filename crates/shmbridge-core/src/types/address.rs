//! Agent-local address type.

use std::fmt;

/// Address inside the agent's own address space
///
/// The controller never dereferences these values. It only carries them in
/// the header `address` field so the agent can resolve them against its own
/// memory, which is why the wire representation is a plain `u64` regardless
/// of the agent's pointer width.
///
/// ## Example
///
/// ```rust
/// use shmbridge_core::types::Address;
///
/// let addr = Address::from(0x1000);
/// assert_eq!(addr.checked_add(0x10), Some(Address::new(0x1010)));
/// assert!(Address::NULL.is_null());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(u64);

impl Address
{
    /// The null address, never valid for a transfer.
    pub const NULL: Self = Address(0);

    /// Create an address from its raw wire value.
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Raw wire value.
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Whether this is the null address.
    pub const fn is_null(self) -> bool
    {
        self.0 == 0
    }

    /// Offset the address, returning `None` on overflow.
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.0.checked_add(offset).map(Address)
    }

    /// End of a `len` byte range starting here, `None` if it wraps.
    pub fn range_end(self, len: usize) -> Option<Self>
    {
        self.checked_add(u64::try_from(len).ok()?)
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl<T> From<*const T> for Address
{
    fn from(ptr: *const T) -> Self
    {
        Address(ptr as usize as u64)
    }
}

impl<T> From<*mut T> for Address
{
    fn from(ptr: *mut T) -> Self
    {
        Address(ptr as usize as u64)
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:016x}", self.0)
    }
}
