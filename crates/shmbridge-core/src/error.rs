//! # Error Types
//!
//! Two layers of errors live here.
//!
//! - [`Fault`]: a recoverable problem with a single request. Faults never
//!   cross the process boundary as values; the engine turns them into the
//!   header error flag and the controller turns the flag back into
//!   [`BridgeError::RequestFailed`].
//! - [`BridgeError`]: everything the hosting code sees: mapping and
//!   synchronization setup failures, invalid module definitions, failed
//!   remote requests.
//!
//! We use `thiserror` to generate the `Error` implementations.

use thiserror::Error;

use crate::types::{Address, CommandWord, ModuleId};

/// Recoverable per-request fault
///
/// ## Fault Categories
///
/// 1. **Protocol faults**: `UnknownModule`, `UnknownCommand`, `BodyOverflow`
/// 2. **Memory faults**: `InvalidAddress`
/// 3. **Payload faults**: `MissingTerminator`, `InvalidText`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Fault
{
    /// The command word names a module index that was never registered.
    #[error("Unknown module {0}")]
    UnknownModule(ModuleId),

    /// The module exists but has no command with that id.
    #[error("Unknown command {0}")]
    UnknownCommand(CommandWord),

    /// A transfer does not fit in the body region.
    ///
    /// Lengths are validated before any byte is copied, so a rejected
    /// transfer leaves both the body and the target memory untouched.
    #[error("Transfer of {requested} bytes exceeds body capacity of {capacity} bytes")]
    BodyOverflow
    {
        /// Bytes the request asked for (including any terminator)
        requested: usize,
        /// Bytes available in the body region
        capacity: usize,
    },

    /// The address range cannot be accessed in the agent's memory.
    #[error("Invalid address range {address} (+{len} bytes)")]
    InvalidAddress
    {
        /// Start of the rejected range
        address: Address,
        /// Length of the rejected range
        len: usize,
    },

    /// The body did not contain a NUL terminator where text was expected.
    #[error("Body text is not NUL-terminated")]
    MissingTerminator,

    /// The body text is not valid UTF-8.
    #[error("Body text is not valid UTF-8")]
    InvalidText,
}

/// Main error type for bridge operations
#[derive(Error, Debug)]
pub enum BridgeError
{
    /// The mapping handed to the bridge is smaller than the fixed layout.
    #[error("Segment too small: need {required} bytes, got {actual}")]
    SegmentTooSmall
    {
        /// Size of the fixed layout
        required: usize,
        /// Size of the supplied mapping
        actual: usize,
    },

    /// The mapping does not start on a suitably aligned address.
    #[error("Segment base {0} is not 8-byte aligned")]
    Misaligned(Address),

    /// Creating the shared mapping failed.
    #[error("Failed to map shared segment: {0}")]
    MapFailed(#[source] std::io::Error),

    /// Creating the process-shared mutex or condition variables failed.
    ///
    /// This is fatal for the agent: no further protocol activity can be
    /// trusted without correctly shared synchronization objects.
    #[error("Failed to initialize process-shared synchronization: {0}")]
    SyncInit(String),

    /// A lock, wait or signal call failed after initialization.
    #[error("Synchronization call {operation} failed with code {code}")]
    Sync
    {
        /// Name of the failing primitive call
        operation: &'static str,
        /// Raw return code
        code: i32,
    },

    /// The controller attached before the agent initialized the sync block.
    #[error("Synchronization block is not initialized")]
    SyncNotReady,

    /// A module definition violates the registry invariants.
    #[error("Invalid module definition: {0}")]
    InvalidModule(String),

    /// A module with the same name and version is already registered.
    #[error("Module already registered: {name} v{version}")]
    DuplicateModule
    {
        /// Module name
        name: String,
        /// Module version
        version: u32,
    },

    /// No module ids are left in the 16-bit id space.
    #[error("Registry is full")]
    RegistryFull,

    /// The agent raised the error flag while serving a request.
    #[error("Request {command} failed on the agent side")]
    RequestFailed
    {
        /// Command word that was issued
        command: CommandWord,
    },

    /// A fault raised locally (e.g. a payload that would not fit the body).
    #[error("Protocol fault: {0}")]
    Fault(#[from] Fault),

    /// Invalid argument passed to a bridge function
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for `Result<T, BridgeError>`
///
/// ```rust
/// use shmbridge_core::error::BridgeResult;
/// fn foo() -> BridgeResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;
