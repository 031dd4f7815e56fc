//! Tests for wire-level types and the segment layout

use shmbridge_core::builtin::CoreCommand;
use shmbridge_core::shm::{layout, Segment, BODY_OFFSET, BODY_SIZE, HEADER_SIZE, SEGMENT_SIZE, SYNC_OFFSET};
use shmbridge_core::types::{Address, CommandId, CommandKind, CommandWord, ModuleId, ProcessId};

#[test]
fn test_process_id_round_trip()
{
    let pid = ProcessId::from(54321);
    let value: u32 = pid.into();
    assert_eq!(value, 54321);
    assert_eq!(ProcessId::current().0, std::process::id());
}

#[test]
fn test_command_word_packing()
{
    let word = CommandWord::new(ModuleId::new(0x0102), CommandId::new(0x0304));
    assert_eq!(word.raw(), 0x0102_0304);
    assert_eq!(word.module(), ModuleId::new(0x0102));
    assert_eq!(word.command(), CommandId::new(0x0304));
    assert_eq!(CommandWord::from_raw(word.raw()), word);
}

#[test]
fn test_running_is_zero()
{
    assert_eq!(CommandWord::RUNNING.raw(), 0);
    assert_eq!(CoreCommand::Running.word(), CommandWord::RUNNING);
    assert!(!CoreCommand::GetVersion.word().is_running());
}

#[test]
fn test_with_command_keeps_module()
{
    let word = CommandWord::new(ModuleId::new(3), CommandId::new(1));
    let next = word.with_command(CommandId::new(2));
    assert_eq!(next.module(), ModuleId::new(3));
    assert_eq!(next.command(), CommandId::new(2));
}

#[test]
fn test_command_kind_display()
{
    assert_eq!(CommandKind::Cancellation.to_string(), "cancellation");
    assert_eq!(CommandKind::ClientWait.to_string(), "client-wait");
    assert_eq!(CommandKind::Function.to_string(), "function");
}

#[test]
fn test_address_arithmetic()
{
    let address = Address::new(0x1000);
    assert_eq!(address.checked_add(0x10), Some(Address::new(0x1010)));
    assert_eq!(Address::new(u64::MAX).checked_add(1), None);
    assert_eq!(address.range_end(4), Some(Address::new(0x1004)));
    assert!(Address::NULL.is_null());
    assert_eq!(format!("{}", address), "0x0000000000001000");
}

#[test]
fn test_layout_constants()
{
    assert_eq!(HEADER_SIZE, 1024);
    assert_eq!(SYNC_OFFSET, 512);
    assert_eq!(BODY_OFFSET, HEADER_SIZE);
    assert_eq!(BODY_SIZE, 1024 * 1024);
    assert_eq!(SEGMENT_SIZE, HEADER_SIZE + BODY_SIZE);
    assert_eq!(layout::COMMAND_OFFSET, 0);
    assert_eq!(layout::VALUE_OFFSET, 4);
    assert_eq!(layout::ADDRESS_OFFSET, 8);
    assert_eq!(layout::LENGTH_OFFSET, 16);
    assert_eq!(layout::ERROR_OFFSET, 20);
}

#[test]
fn test_header_fields_sit_at_their_offsets()
{
    let segment = Segment::anonymous().unwrap();
    let header = segment.header();
    let base = segment.base_address().value();

    assert_eq!(std::ptr::from_ref(header) as u64, base);

    header.set_command(CommandWord::from_raw(0x0001_0002));
    header.set_value(0xaabb_ccdd);
    header.set_address(Address::new(0x1122_3344_5566_7788));
    header.set_length(42);
    header.set_error(true);

    let read_u32 = |offset: usize| unsafe { ((base as usize + offset) as *const u32).read() };
    let read_u64 = |offset: usize| unsafe { ((base as usize + offset) as *const u64).read() };
    assert_eq!(read_u32(layout::COMMAND_OFFSET), 0x0001_0002);
    assert_eq!(read_u32(layout::VALUE_OFFSET), 0xaabb_ccdd);
    assert_eq!(read_u64(layout::ADDRESS_OFFSET), 0x1122_3344_5566_7788);
    assert_eq!(read_u32(layout::LENGTH_OFFSET), 42);
    assert_eq!(read_u32(layout::ERROR_OFFSET), 1);
}
