//! Core command handlers.
//!
//! Each handler validates everything it needs before touching memory, the
//! body, or the header `value` slot, so a fault leaves all three unchanged.

use tracing::debug;

use super::{CoreState, CORE_VERSION};
use crate::error::Fault;
use crate::registry::Request;

pub(super) fn get_version(request: &mut Request<'_>, _state: &mut CoreState) -> Result<(), Fault>
{
    request.header().set_value(CORE_VERSION);
    Ok(())
}

pub(super) fn get_pid(request: &mut Request<'_>, state: &mut CoreState) -> Result<(), Fault>
{
    request.header().set_value(state.pid.into());
    Ok(())
}

pub(super) fn read_raw(request: &mut Request<'_>, state: &mut CoreState) -> Result<(), Fault>
{
    let range = request.header().byte_range()?;
    if range.is_empty() {
        return Ok(());
    }
    let mut buffer = vec![0u8; range.len()];
    state.memory.read(range.address(), &mut buffer)?;
    request.body().write(0, &buffer)
}

pub(super) fn write_raw(request: &mut Request<'_>, state: &mut CoreState) -> Result<(), Fault>
{
    let range = request.header().byte_range()?;
    if range.is_empty() {
        return Ok(());
    }
    let mut buffer = vec![0u8; range.len()];
    request.body().read(0, &mut buffer)?;
    state.memory.write(range.address(), &buffer)
}

fn read_scalar<const N: usize>(request: &Request<'_>, state: &CoreState) -> Result<[u8; N], Fault>
{
    let target = request.header().scalar(N)?;
    let mut bytes = [0u8; N];
    state.memory.read(target.address(), &mut bytes)?;
    Ok(bytes)
}

fn write_scalar(request: &Request<'_>, state: &mut CoreState, bytes: &[u8]) -> Result<(), Fault>
{
    let target = request.header().scalar(bytes.len())?;
    state.memory.write(target.address(), bytes)
}

pub(super) fn read_dword(request: &mut Request<'_>, state: &mut CoreState) -> Result<(), Fault>
{
    let bytes = read_scalar::<4>(request, state)?;
    request.header().set_value(u32::from_ne_bytes(bytes));
    Ok(())
}

pub(super) fn read_word(request: &mut Request<'_>, state: &mut CoreState) -> Result<(), Fault>
{
    let bytes = read_scalar::<2>(request, state)?;
    request.header().set_value(u16::from_ne_bytes(bytes).into());
    Ok(())
}

pub(super) fn read_byte(request: &mut Request<'_>, state: &mut CoreState) -> Result<(), Fault>
{
    let [byte] = read_scalar::<1>(request, state)?;
    request.header().set_value(byte.into());
    Ok(())
}

pub(super) fn write_dword(request: &mut Request<'_>, state: &mut CoreState) -> Result<(), Fault>
{
    let value = request.header().value();
    write_scalar(request, state, &value.to_ne_bytes())
}

// Only the low bytes of `value` are stored for the narrow writes.
#[allow(clippy::cast_possible_truncation)]
pub(super) fn write_word(request: &mut Request<'_>, state: &mut CoreState) -> Result<(), Fault>
{
    let value = request.header().value() as u16;
    write_scalar(request, state, &value.to_ne_bytes())
}

#[allow(clippy::cast_possible_truncation)]
pub(super) fn write_byte(request: &mut Request<'_>, state: &mut CoreState) -> Result<(), Fault>
{
    let value = request.header().value() as u8;
    write_scalar(request, state, &[value])
}

pub(super) fn read_string(request: &mut Request<'_>, state: &mut CoreState) -> Result<(), Fault>
{
    let target = request.header().text_ref()?;
    let text = state.memory.read_text(target.address())?;
    let capacity = request.body().capacity();
    let len = u32::try_from(text.len()).map_err(|_| Fault::BodyOverflow {
        requested: text.len().saturating_add(1),
        capacity,
    })?;
    request.body().write_terminated(0, &text)?;
    request.header().set_value(len);
    Ok(())
}

pub(super) fn write_string(request: &mut Request<'_>, state: &mut CoreState) -> Result<(), Fault>
{
    let target = request.header().text_ref()?;
    let text = request.body().read_terminated(0)?;
    state.memory.write_text(target.address(), &text)
}

pub(super) fn sync_yield(request: &mut Request<'_>, state: &mut CoreState) -> Result<(), Fault>
{
    let local = state.affinity.affinity_mask();
    let remote = request.header().value();
    let pool = local | remote;
    let single_cpu = pool.count_ones() == 1;

    debug!(local = format_args!("{local:#b}"), remote = format_args!("{remote:#b}"), single_cpu, "sync yield");
    state.sync_flag.set(single_cpu);
    request.header().set_value(u32::from(single_cpu));
    Ok(())
}

/// Body layout: native-endian `u32` version, then the NUL-terminated name.
pub(super) fn acquire_module(request: &mut Request<'_>, _state: &mut CoreState) -> Result<(), Fault>
{
    let mut version = [0u8; 4];
    request.body().read(0, &mut version)?;
    let version = u32::from_ne_bytes(version);
    let name = request.body().read_terminated(4)?;
    let name = std::str::from_utf8(&name).map_err(|_| Fault::InvalidText)?;

    match request.lookup(name, version) {
        Some(id) => {
            request.header().set_value(id.raw().into());
            request.header().set_error(false);
        }
        None => {
            debug!(name, version, "module lookup missed");
            request.header().set_error(true);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests
{
    use super::super::{module, CoreCommand, SyncFlag};
    use super::*;
    use crate::memory::ArenaMemory;
    use crate::platform::FixedAffinity;
    use crate::registry::{Command, Module, Registry};
    use crate::shm::Segment;
    use crate::types::{Address, ProcessId};

    const BASE: u64 = 0x4000;

    struct Fixture
    {
        segment: Segment,
        registry: Registry,
        arena: ArenaMemory,
        flag: SyncFlag,
    }

    impl Fixture
    {
        fn new(mask: u32) -> Self
        {
            let arena = ArenaMemory::new(Address::new(BASE), 256);
            let flag = SyncFlag::new();
            let state = CoreState::new(Box::new(arena.clone()), Box::new(FixedAffinity(mask)), flag.clone())
                .with_pid(ProcessId(4242));
            Self {
                segment: Segment::anonymous().unwrap(),
                registry: Registry::new(module(state).unwrap()),
                arena,
                flag,
            }
        }

        fn run(&mut self, command: CoreCommand) -> Result<(), Fault>
        {
            self.registry
                .dispatch(command.word(), self.segment.header(), self.segment.body())
                .map(|_| ())
        }
    }

    #[test]
    fn test_version_and_pid()
    {
        let mut fixture = Fixture::new(1);
        fixture.run(CoreCommand::GetVersion).unwrap();
        assert_eq!(fixture.segment.header().value(), CORE_VERSION);
        fixture.run(CoreCommand::GetPid).unwrap();
        assert_eq!(fixture.segment.header().value(), 4242);
    }

    #[test]
    fn test_dword_round_trip()
    {
        let mut fixture = Fixture::new(1);
        let segment = fixture.segment.clone();
        let header = segment.header();
        header.set_address(Address::new(BASE + 8));

        for value in [0, 1, 0xdead_beef, u32::MAX] {
            header.set_value(value);
            fixture.run(CoreCommand::WriteDword).unwrap();
            header.set_value(0x5555_5555);
            fixture.run(CoreCommand::ReadDword).unwrap();
            assert_eq!(header.value(), value);
        }
    }

    #[test]
    fn test_narrow_writes_truncate()
    {
        let mut fixture = Fixture::new(1);
        let segment = fixture.segment.clone();
        let header = segment.header();
        header.set_address(Address::new(BASE));
        header.set_value(0xaabb_ccdd);
        fixture.run(CoreCommand::WriteWord).unwrap();
        assert_eq!(fixture.arena.peek(Address::new(BASE), 2), Some(0xccddu16.to_ne_bytes().to_vec()));

        header.set_address(Address::new(BASE + 4));
        fixture.run(CoreCommand::WriteByte).unwrap();
        assert_eq!(fixture.arena.peek(Address::new(BASE + 4), 1), Some(vec![0xdd]));

        header.set_address(Address::new(BASE));
        fixture.run(CoreCommand::ReadByte).unwrap();
        assert_eq!(header.value(), u32::from(0xccddu16.to_ne_bytes()[0]));
    }

    #[test]
    fn test_raw_transfer()
    {
        let mut fixture = Fixture::new(1);
        let segment = fixture.segment.clone();
        let header = segment.header();
        fixture.arena.poke(Address::new(BASE + 16), b"payload").unwrap();

        header.set_address(Address::new(BASE + 16));
        header.set_length(7);
        fixture.run(CoreCommand::ReadRaw).unwrap();
        let mut out = [0u8; 7];
        fixture.segment.body().read(0, &mut out).unwrap();
        assert_eq!(&out, b"payload");

        fixture.segment.body().write(0, b"PAY").unwrap();
        header.set_length(3);
        fixture.run(CoreCommand::WriteRaw).unwrap();
        assert_eq!(fixture.arena.peek(Address::new(BASE + 16), 7), Some(b"PAYload".to_vec()));
    }

    #[test]
    fn test_faults_leave_value_untouched()
    {
        let mut fixture = Fixture::new(1);
        let segment = fixture.segment.clone();
        let header = segment.header();
        header.set_value(77);
        header.set_address(Address::NULL);
        assert!(matches!(fixture.run(CoreCommand::ReadDword), Err(Fault::InvalidAddress { .. })));
        assert_eq!(header.value(), 77);

        header.set_address(Address::new(BASE + 254));
        assert!(fixture.run(CoreCommand::ReadDword).is_err());
        assert_eq!(header.value(), 77);
    }

    #[test]
    fn test_oversized_raw_read_is_rejected()
    {
        let mut fixture = Fixture::new(1);
        let segment = fixture.segment.clone();
        let header = segment.header();
        header.set_address(Address::new(BASE));
        header.set_length(u32::try_from(crate::shm::BODY_SIZE).unwrap() + 1);
        assert!(matches!(fixture.run(CoreCommand::ReadRaw), Err(Fault::BodyOverflow { .. })));
    }

    #[test]
    fn test_string_round_trip()
    {
        let mut fixture = Fixture::new(1);
        let handle = fixture.arena.alloc_string("");
        let segment = fixture.segment.clone();
        let header = segment.header();
        header.set_address(handle);

        fixture.segment.body().write_terminated(0, b"hello").unwrap();
        fixture.run(CoreCommand::WriteString).unwrap();
        assert_eq!(fixture.arena.string(handle).as_deref(), Some("hello"));

        fixture.segment.body().write(0, &[0xff; 8]).unwrap();
        fixture.run(CoreCommand::ReadString).unwrap();
        assert_eq!(header.value(), 5);
        assert_eq!(fixture.segment.body().read_terminated(0).unwrap(), b"hello");
    }

    #[test]
    fn test_string_write_needs_terminator()
    {
        let mut fixture = Fixture::new(1);
        let handle = fixture.arena.alloc_string("keep");
        fixture.segment.header().set_address(handle);
        let capacity = fixture.segment.body().capacity();
        fixture.segment.body().write(0, &vec![b'x'; capacity]).unwrap();

        assert_eq!(fixture.run(CoreCommand::WriteString), Err(Fault::MissingTerminator));
        assert_eq!(fixture.arena.string(handle).as_deref(), Some("keep"));
    }

    #[test]
    fn test_string_read_must_fit_with_terminator()
    {
        let mut fixture = Fixture::new(1);
        let capacity = fixture.segment.body().capacity();
        let exact = fixture.arena.alloc_string(&"a".repeat(capacity - 1));
        let too_long = fixture.arena.alloc_string(&"b".repeat(capacity));
        let segment = fixture.segment.clone();
        let header = segment.header();

        header.set_address(exact);
        fixture.run(CoreCommand::ReadString).unwrap();
        assert_eq!(header.value(), u32::try_from(capacity - 1).unwrap());
        assert_eq!(fixture.segment.body().read_terminated(0).unwrap().len(), capacity - 1);

        header.set_value(7);
        header.set_address(too_long);
        assert_eq!(
            fixture.run(CoreCommand::ReadString),
            Err(Fault::BodyOverflow {
                requested: capacity + 1,
                capacity,
            })
        );
        assert_eq!(header.value(), 7);
        // The earlier response is still intact
        assert_eq!(fixture.segment.body().read_terminated(0).unwrap().len(), capacity - 1);
    }

    #[test]
    fn test_string_commands_reject_null_target()
    {
        let mut fixture = Fixture::new(1);
        fixture.segment.header().set_address(Address::NULL);
        fixture.segment.body().write_terminated(0, b"hi").unwrap();
        assert!(matches!(fixture.run(CoreCommand::WriteString), Err(Fault::InvalidAddress { len: 0, .. })));
        assert!(matches!(fixture.run(CoreCommand::ReadString), Err(Fault::InvalidAddress { len: 0, .. })));
    }

    #[test]
    fn test_sync_yield()
    {
        // (local, remote, expected)
        let cases = [
            (0b0001, 0b0001, true),
            (0b0001, 0b0000, true),
            (0b0001, 0b0010, false),
            (0b0011, 0b0000, false),
            (0b0100, 0b0100, true),
        ];
        for (local, remote, expected) in cases {
            let mut fixture = Fixture::new(local);
            fixture.segment.header().set_value(remote);
            fixture.run(CoreCommand::SyncYield).unwrap();
            assert_eq!(fixture.segment.header().value(), u32::from(expected), "{local:#b} | {remote:#b}");
            assert_eq!(fixture.flag.is_set(), expected);
        }
    }

    fn write_lookup(segment: &Segment, name: &str, version: u32)
    {
        segment.body().write(0, &version.to_ne_bytes()).unwrap();
        segment.body().write_terminated(4, name.as_bytes()).unwrap();
    }

    #[test]
    fn test_acquire_module()
    {
        let mut fixture = Fixture::new(1);
        let extra = Module::builder("Maps", 2)
            .command(0u16, Command::cancellation("Idle"))
            .build_stateless()
            .unwrap();
        fixture.registry.register(extra).unwrap();
        let segment = fixture.segment.clone();
        let header = segment.header();

        write_lookup(&fixture.segment, "Maps", 2);
        header.set_error(true);
        fixture.run(CoreCommand::AcquireModule).unwrap();
        assert!(!header.error());
        assert_eq!(header.value(), 1);

        write_lookup(&fixture.segment, "Core", CORE_VERSION);
        fixture.run(CoreCommand::AcquireModule).unwrap();
        assert_eq!(header.value(), 0);

        header.set_value(99);
        write_lookup(&fixture.segment, "Maps", 3);
        fixture.run(CoreCommand::AcquireModule).unwrap();
        assert!(header.error());
        assert_eq!(header.value(), 99);
    }
}
