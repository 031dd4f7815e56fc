//! # Module Registry
//!
//! The agent's command vocabulary is a list of modules, each a dense table of
//! commands. A command word addresses one entry as `(module index, command
//! index)`.
//!
//! ## Layout
//!
//! - Index 0 is always the bootstrap Core module, so a controller can reach
//!   `AcquireModule` before it knows anything else.
//! - Further modules are registered by the hosting code before the engine
//!   starts serving. Indices are assigned in registration order and never
//!   change afterwards.
//! - A module is identified to the controller by `(name, version)`; both must
//!   match exactly for a lookup to succeed.
//!
//! ## Safety of indices
//!
//! Every index that arrives through the header is bounds-checked by
//! [`Registry::resolve`] before any table access. An unknown module or
//! command becomes a [`Fault`], never an out-of-range read.

pub mod module;

pub use module::{Command, CommandInfo, Handler, Module, ModuleBuilder, ModuleKey};

pub(crate) use module::ModuleObject;
use tracing::debug;

use crate::error::{BridgeError, BridgeResult, Fault};
use crate::shm::{Body, Header};
use crate::types::{CommandWord, ModuleId};

/// Everything a handler may touch while it runs.
pub struct Request<'a>
{
    header: &'a Header,
    body: Body<'a>,
    modules: &'a [ModuleKey],
    word: CommandWord,
}

impl<'a> Request<'a>
{
    /// Shared header slots.
    #[must_use]
    pub fn header(&self) -> &'a Header
    {
        self.header
    }

    /// Bulk data region.
    #[must_use]
    pub fn body(&self) -> &Body<'a>
    {
        &self.body
    }

    /// Command word being served.
    #[must_use]
    pub fn word(&self) -> CommandWord
    {
        self.word
    }

    /// Every registered module, indexed by module id.
    #[must_use]
    pub fn modules(&self) -> &'a [ModuleKey]
    {
        self.modules
    }

    /// Exact `(name, version)` lookup.
    #[must_use]
    pub fn lookup(&self, name: &str, version: u32) -> Option<ModuleId>
    {
        find(self.modules, name, version)
    }
}

fn find(keys: &[ModuleKey], name: &str, version: u32) -> Option<ModuleId>
{
    keys.iter()
        .position(|key| key.matches(name, version))
        .and_then(|index| u16::try_from(index).ok())
        .map(ModuleId::new)
}

/// Ordered module list with bounds-checked dispatch
pub struct Registry
{
    keys: Vec<ModuleKey>,
    modules: Vec<Box<dyn ModuleObject>>,
}

impl Registry
{
    /// Create a registry whose index 0 is `core`.
    #[must_use]
    pub fn new<S: Send + 'static>(core: Module<S>) -> Self
    {
        Self {
            keys: vec![core.key().clone()],
            modules: vec![Box::new(core)],
        }
    }

    /// Append a module and return its index.
    ///
    /// ## Errors
    ///
    /// - `DuplicateModule`: the `(name, version)` pair is already taken
    /// - `RegistryFull`: all 16-bit module ids are in use
    pub fn register<S: Send + 'static>(&mut self, module: Module<S>) -> BridgeResult<ModuleId>
    {
        self.insert(Box::new(module))
    }

    pub(crate) fn insert(&mut self, module: Box<dyn ModuleObject>) -> BridgeResult<ModuleId>
    {
        let key = module.key().clone();
        if find(&self.keys, &key.name, key.version).is_some() {
            return Err(BridgeError::DuplicateModule {
                name: key.name,
                version: key.version,
            });
        }
        let id = u16::try_from(self.modules.len()).map_err(|_| BridgeError::RegistryFull)?;

        debug!(module = %key, id, commands = module.command_count(), "registered module");
        self.keys.push(key);
        self.modules.push(module);
        Ok(ModuleId::new(id))
    }

    /// Exact `(name, version)` lookup.
    #[must_use]
    pub fn lookup(&self, name: &str, version: u32) -> Option<ModuleId>
    {
        find(&self.keys, name, version)
    }

    /// Number of registered modules (zero after teardown).
    #[must_use]
    pub fn len(&self) -> usize
    {
        self.modules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.modules.is_empty()
    }

    /// Keys of every registered module, indexed by module id.
    #[must_use]
    pub fn keys(&self) -> &[ModuleKey]
    {
        &self.keys
    }

    /// Command table of one module, in id order.
    #[must_use]
    pub fn commands(&self, module: ModuleId) -> Option<Vec<CommandInfo>>
    {
        let object = self.modules.get(module.index())?;
        Some(
            (0..object.command_count())
                .filter_map(|index| u16::try_from(index).ok())
                .filter_map(|index| object.command_info(index.into()))
                .collect(),
        )
    }

    /// Look up the command a word names.
    ///
    /// ## Errors
    ///
    /// - `UnknownModule`: the module index is not registered
    /// - `UnknownCommand`: the module has no command with that index
    pub fn resolve(&self, word: CommandWord) -> Result<CommandInfo, Fault>
    {
        let module = self
            .modules
            .get(word.module().index())
            .ok_or(Fault::UnknownModule(word.module()))?;
        module
            .command_info(word.command())
            .ok_or(Fault::UnknownCommand(word))
    }

    /// Resolve `word` and run its handler, if it has one.
    ///
    /// Returns the resolved command so the caller can apply the next-state
    /// transition and the kind's behavior.
    ///
    /// ## Errors
    ///
    /// Any fault from [`Registry::resolve`] or from the handler itself.
    pub fn dispatch(&mut self, word: CommandWord, header: &Header, body: Body<'_>) -> Result<CommandInfo, Fault>
    {
        let info = self.resolve(word)?;
        if info.has_handler {
            let mut request = Request {
                header,
                body,
                modules: &self.keys,
                word,
            };
            self.modules[word.module().index()].invoke(word.command(), &mut request)?;
        }
        Ok(info)
    }

    /// Drop every module with its state, in registration order, then
    /// empty the registry.
    ///
    /// Calling it again does nothing.
    pub fn teardown(&mut self)
    {
        for module in self.modules.drain(..) {
            debug!(module = %module.key(), "releasing module state");
            drop(module);
        }
        self.keys.clear();
    }
}

impl std::fmt::Debug for Registry
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("Registry").field("modules", &self.keys).finish()
    }
}
