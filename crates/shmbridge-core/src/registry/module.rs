//! Modules, commands, and the typed handler abstraction.

use std::fmt;

use super::Request;
use crate::error::{BridgeError, BridgeResult, Fault};
use crate::types::{CommandId, CommandKind};

/// A command handler bound to its module's state type.
///
/// Handlers run to completion on the dispatch thread and must not block.
pub type Handler<S> = Box<dyn Fn(&mut Request<'_>, &mut S) -> Result<(), Fault> + Send>;

/// Name and version identifying a module to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleKey
{
    pub name: String,
    pub version: u32,
}

impl ModuleKey
{
    #[must_use]
    pub fn new(name: impl Into<String>, version: u32) -> Self
    {
        Self {
            name: name.into(),
            version,
        }
    }

    /// Exact match on both name and version.
    #[must_use]
    pub fn matches(&self, name: &str, version: u32) -> bool
    {
        self.version == version && self.name == name
    }
}

impl fmt::Display for ModuleKey
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{} v{}", self.name, self.version)
    }
}

/// Public, state-free description of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandInfo
{
    /// Diagnostic name
    pub name: &'static str,
    /// What the engine does after running it
    pub kind: CommandKind,
    /// Command the word transitions to afterwards, in the same module
    pub next: Option<CommandId>,
    /// Whether a handler runs
    pub has_handler: bool,
}

/// One protocol step
///
/// ## Example
///
/// ```rust
/// use shmbridge_core::registry::Command;
/// use shmbridge_core::types::CommandKind;
///
/// let step: Command<u32> = Command::function("Bump")
///     .handler(|request, counter| {
///         *counter += 1;
///         request.header().set_value(*counter);
///         Ok(())
///     })
///     .then(2u16);
/// assert_eq!(step.info().kind, CommandKind::Function);
/// ```
pub struct Command<S>
{
    name: &'static str,
    kind: CommandKind,
    handler: Option<Handler<S>>,
    next: Option<CommandId>,
}

impl<S> Command<S>
{
    fn new(name: &'static str, kind: CommandKind) -> Self
    {
        Self {
            name,
            kind,
            handler: None,
            next: None,
        }
    }

    /// Leave the dispatch loop silently.
    #[must_use]
    pub fn cancellation(name: &'static str) -> Self
    {
        Self::new(name, CommandKind::Cancellation)
    }

    /// Hand the header back to the controller and wait.
    #[must_use]
    pub fn client_wait(name: &'static str) -> Self
    {
        Self::new(name, CommandKind::ClientWait)
    }

    /// Keep dispatching locally.
    #[must_use]
    pub fn function(name: &'static str) -> Self
    {
        Self::new(name, CommandKind::Function)
    }

    /// Attach the handler run when this command is dispatched.
    #[must_use]
    pub fn handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut Request<'_>, &mut S) -> Result<(), Fault> + Send + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    /// Transition the command word to `next` after running.
    #[must_use]
    pub fn then(mut self, next: impl Into<CommandId>) -> Self
    {
        self.next = Some(next.into());
        self
    }

    #[must_use]
    pub fn info(&self) -> CommandInfo
    {
        CommandInfo {
            name: self.name,
            kind: self.kind,
            next: self.next,
            has_handler: self.handler.is_some(),
        }
    }
}

impl<S> fmt::Debug for Command<S>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("next", &self.next)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

/// A named, versioned command table with its own state
///
/// Command ids are dense and stable for the module's lifetime. The state is
/// owned by the module and handed to handlers as `&mut S`; teardown drops it.
pub struct Module<S>
{
    key: ModuleKey,
    commands: Vec<Command<S>>,
    state: S,
}

impl<S> Module<S>
{
    /// Start describing a module.
    #[must_use]
    pub fn builder(name: impl Into<String>, version: u32) -> ModuleBuilder<S>
    {
        ModuleBuilder {
            key: ModuleKey::new(name, version),
            slots: Vec::new(),
            duplicates: Vec::new(),
        }
    }

    pub fn key(&self) -> &ModuleKey
    {
        &self.key
    }

    pub fn command_count(&self) -> usize
    {
        self.commands.len()
    }

    pub fn state(&self) -> &S
    {
        &self.state
    }
}

impl<S> fmt::Debug for Module<S>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("Module")
            .field("key", &self.key)
            .field("commands", &self.commands)
            .finish()
    }
}

/// Collects commands by id, then checks the table before producing a
/// [`Module`].
pub struct ModuleBuilder<S>
{
    key: ModuleKey,
    slots: Vec<Option<Command<S>>>,
    duplicates: Vec<CommandId>,
}

impl<S> ModuleBuilder<S>
{
    /// Place `command` at `id`.
    #[must_use]
    pub fn command(mut self, id: impl Into<CommandId>, command: Command<S>) -> Self
    {
        let id = id.into();
        if self.slots.len() <= id.index() {
            self.slots.resize_with(id.index() + 1, || None);
        }
        if self.slots[id.index()].replace(command).is_some() {
            self.duplicates.push(id);
        }
        self
    }

    /// Finish the module with its initial state.
    ///
    /// ## Errors
    ///
    /// - `InvalidModule`: empty table, an id assigned twice, an id left
    ///   unassigned, a next state that is not a command of this module, or a
    ///   function command without a next state
    pub fn build(self, state: S) -> BridgeResult<Module<S>>
    {
        let invalid = |reason: String| BridgeError::InvalidModule(format!("{}: {reason}", self.key));

        if self.slots.is_empty() {
            return Err(invalid("no commands".to_string()));
        }
        if let Some(id) = self.duplicates.first() {
            return Err(invalid(format!("command {id} assigned twice")));
        }
        if let Some(gap) = self.slots.iter().position(Option::is_none) {
            return Err(invalid(format!("command {gap} is unassigned")));
        }

        let count = self.slots.len();
        let commands: Vec<Command<S>> = self.slots.into_iter().flatten().collect();
        if let Some(bad) = commands
            .iter()
            .find(|command| command.next.is_some_and(|next| next.index() >= count))
        {
            return Err(invalid(format!(
                "command {:?} transitions to missing command {:?}",
                bad.name, bad.next
            )));
        }
        // A function without a next state would be re-dispatched forever
        if let Some(bad) = commands
            .iter()
            .find(|command| command.kind == CommandKind::Function && command.next.is_none())
        {
            return Err(invalid(format!("function {:?} has no next command", bad.name)));
        }

        Ok(Module {
            key: self.key,
            commands,
            state,
        })
    }
}

impl ModuleBuilder<()>
{
    /// Finish a module that carries no state.
    ///
    /// ## Errors
    ///
    /// Same as [`ModuleBuilder::build`].
    pub fn build_stateless(self) -> BridgeResult<Module<()>>
    {
        self.build(())
    }
}

/// Type-erased module as stored in the registry.
pub(crate) trait ModuleObject: Send
{
    fn key(&self) -> &ModuleKey;

    fn command_count(&self) -> usize;

    fn command_info(&self, id: CommandId) -> Option<CommandInfo>;

    /// Run the handler of `id`, if any, with this module's state.
    fn invoke(&mut self, id: CommandId, request: &mut Request<'_>) -> Result<(), Fault>;
}

impl<S: Send + 'static> ModuleObject for Module<S>
{
    fn key(&self) -> &ModuleKey
    {
        &self.key
    }

    fn command_count(&self) -> usize
    {
        self.commands.len()
    }

    fn command_info(&self, id: CommandId) -> Option<CommandInfo>
    {
        self.commands.get(id.index()).map(Command::info)
    }

    fn invoke(&mut self, id: CommandId, request: &mut Request<'_>) -> Result<(), Fault>
    {
        let Some(handler) = self.commands.get(id.index()).and_then(|command| command.handler.as_ref()) else {
            return Ok(());
        };
        handler(request, &mut self.state)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn noop(_: &mut Request<'_>, _: &mut ()) -> Result<(), Fault>
    {
        Ok(())
    }

    #[test]
    fn test_build_valid_module()
    {
        let module = Module::builder("Demo", 1)
            .command(0u16, Command::cancellation("Idle"))
            .command(1u16, Command::function("Work").handler(noop).then(2u16))
            .command(2u16, Command::client_wait("Done"))
            .build_stateless()
            .unwrap();

        assert_eq!(module.command_count(), 3);
        let work = module.command_info(CommandId::new(1)).unwrap();
        assert_eq!(work.kind, CommandKind::Function);
        assert_eq!(work.next, Some(CommandId::new(2)));
        assert!(work.has_handler);
        assert!(module.command_info(CommandId::new(3)).is_none());
    }

    #[test]
    fn test_rejects_gaps()
    {
        let result = Module::builder("Gappy", 1)
            .command(0u16, Command::cancellation("Idle"))
            .command(2u16, Command::client_wait("Done"))
            .build_stateless();
        assert!(matches!(result, Err(BridgeError::InvalidModule(msg)) if msg.contains("command 1")));
    }

    #[test]
    fn test_rejects_dangling_next_state()
    {
        let result = Module::builder("Dangling", 1)
            .command(0u16, Command::function("Work").then(5u16))
            .build_stateless();
        assert!(matches!(result, Err(BridgeError::InvalidModule(_))));
    }

    #[test]
    fn test_rejects_function_without_next()
    {
        let result = Module::builder("Spinner", 1)
            .command(0u16, Command::function("Spin").handler(noop))
            .build_stateless();
        assert!(matches!(result, Err(BridgeError::InvalidModule(msg)) if msg.contains("Spin")));
    }

    #[test]
    fn test_rejects_duplicate_ids()
    {
        let result = Module::builder("Twice", 1)
            .command(0u16, Command::cancellation("A"))
            .command(0u16, Command::cancellation("B"))
            .build_stateless();
        assert!(matches!(result, Err(BridgeError::InvalidModule(msg)) if msg.contains("twice")));
    }

    #[test]
    fn test_rejects_empty()
    {
        let result = Module::<()>::builder("Empty", 1).build_stateless();
        assert!(result.is_err());
    }

    #[test]
    fn test_key_matching()
    {
        let key = ModuleKey::new("Maps", 3);
        assert!(key.matches("Maps", 3));
        assert!(!key.matches("Maps", 4));
        assert!(!key.matches("maps", 3));
        assert_eq!(key.to_string(), "Maps v3");
    }
}
