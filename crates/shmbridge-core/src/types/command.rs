//! Command word encoding and command classification.
//!
//! The command word is the single 32-bit slot both sides race on. Packing the
//! module and command ids into one word means a peer always observes a
//! self-consistent pair.
//!
//! ## Bit layout
//!
//! ```text
//!  31            16 15             0
//! +----------------+----------------+
//! |   module id    |   command id   |
//! +----------------+----------------+
//! ```
//!
//! The all-zero word is (Core, Running), the idle state.

use std::fmt;

/// Index of a module in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleId(u16);

impl ModuleId
{
    /// The bootstrap Core module, always registered first.
    pub const CORE: Self = ModuleId(0);

    /// Create a module id from its raw value.
    #[must_use]
    pub const fn new(raw: u16) -> Self
    {
        ModuleId(raw)
    }

    /// Raw 16-bit value.
    #[must_use]
    pub const fn raw(self) -> u16
    {
        self.0
    }

    /// Position in the registry.
    #[must_use]
    pub const fn index(self) -> usize
    {
        self.0 as usize
    }
}

impl fmt::Display for ModuleId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// Index of a command inside its module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommandId(u16);

impl CommandId
{
    /// Create a command id from its raw value.
    #[must_use]
    pub const fn new(raw: u16) -> Self
    {
        CommandId(raw)
    }

    /// Raw 16-bit value.
    #[must_use]
    pub const fn raw(self) -> u16
    {
        self.0
    }

    /// Position in the module's command table.
    #[must_use]
    pub const fn index(self) -> usize
    {
        self.0 as usize
    }
}

impl From<u16> for CommandId
{
    fn from(raw: u16) -> Self
    {
        CommandId(raw)
    }
}

impl fmt::Display for CommandId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// Packed `(module, command)` pair stored in the header command slot.
///
/// ## Example
///
/// ```rust
/// use shmbridge_core::types::{CommandId, CommandWord, ModuleId};
///
/// let word = CommandWord::new(ModuleId::new(1), CommandId::new(7));
/// assert_eq!(word.raw(), 0x0001_0007);
/// assert_eq!(word.module(), ModuleId::new(1));
/// assert_eq!(word.command(), CommandId::new(7));
/// assert!(CommandWord::RUNNING.is_running());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CommandWord(u32);

impl CommandWord
{
    /// No pending request, both sides idle.
    pub const RUNNING: Self = CommandWord(0);

    /// Pack a module and command id.
    #[must_use]
    pub const fn new(module: ModuleId, command: CommandId) -> Self
    {
        CommandWord(((module.0 as u32) << 16) | command.0 as u32)
    }

    /// Reinterpret a raw header value.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self
    {
        CommandWord(raw)
    }

    /// Raw header value.
    #[must_use]
    pub const fn raw(self) -> u32
    {
        self.0
    }

    /// Module half of the word.
    #[must_use]
    pub const fn module(self) -> ModuleId
    {
        ModuleId((self.0 >> 16) as u16)
    }

    /// Command half of the word.
    #[must_use]
    pub const fn command(self) -> CommandId
    {
        CommandId((self.0 & 0xffff) as u16)
    }

    /// Same module, different command. Used for next-state transitions.
    #[must_use]
    pub const fn with_command(self, command: CommandId) -> Self
    {
        Self::new(self.module(), command)
    }

    /// Whether this is the idle word.
    #[must_use]
    pub const fn is_running(self) -> bool
    {
        self.0 == Self::RUNNING.0
    }
}

impl fmt::Display for CommandWord
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}:{}", self.module(), self.command())
    }
}

/// What the engine does after a command has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind
{
    /// Leave the dispatch loop without signaling the controller.
    Cancellation,
    /// Hand the header to the controller and block until it hands it back.
    ClientWait,
    /// Keep dispatching locally.
    Function,
}

impl fmt::Display for CommandKind
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            CommandKind::Cancellation => "cancellation",
            CommandKind::ClientWait => "client-wait",
            CommandKind::Function => "function",
        };
        f.write_str(label)
    }
}
