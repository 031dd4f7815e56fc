//! Tests for error handling

use shmbridge_core::error::{BridgeError, BridgeResult, Fault};
use shmbridge_core::types::{Address, CommandId, CommandWord, ModuleId};

#[test]
fn test_fault_unknown_module_display()
{
    let fault = Fault::UnknownModule(ModuleId::new(7));
    let message = format!("{}", fault);
    assert!(message.contains("Unknown module"));
    assert!(message.contains('7'));
}

#[test]
fn test_fault_unknown_command_display()
{
    let fault = Fault::UnknownCommand(CommandWord::new(ModuleId::new(2), CommandId::new(9)));
    let message = format!("{}", fault);
    assert!(message.contains("2:9"));
}

#[test]
fn test_fault_body_overflow_display()
{
    let fault = Fault::BodyOverflow {
        requested: 2_000_000,
        capacity: 1_048_576,
    };
    let message = format!("{}", fault);
    assert!(message.contains("2000000"));
    assert!(message.contains("1048576"));
}

#[test]
fn test_fault_invalid_address_display()
{
    let fault = Fault::InvalidAddress {
        address: Address::new(0x1000),
        len: 4,
    };
    let message = format!("{}", fault);
    assert!(message.contains("0x0000000000001000"));
    assert!(message.contains("+4 bytes"));
}

#[test]
fn test_fault_into_bridge_error()
{
    let error: BridgeError = Fault::MissingTerminator.into();
    match error {
        BridgeError::Fault(Fault::MissingTerminator) => {}
        other => panic!("Expected Fault variant, got {other:?}"),
    }
}

#[test]
fn test_io_error_into_bridge_error()
{
    let error: BridgeError = std::io::Error::new(std::io::ErrorKind::Other, "boom").into();
    assert!(matches!(error, BridgeError::Io(_)));
    assert!(format!("{}", error).contains("boom"));
}

#[test]
fn test_request_failed_display()
{
    let error = BridgeError::RequestFailed {
        command: CommandWord::new(ModuleId::CORE, CommandId::new(7)),
    };
    let message = format!("{}", error);
    assert!(message.contains("0:7"));
    assert!(message.contains("failed"));
}

#[test]
fn test_segment_too_small_display()
{
    let error = BridgeError::SegmentTooSmall {
        required: 1_049_600,
        actual: 4096,
    };
    let message = format!("{}", error);
    assert!(message.contains("1049600"));
    assert!(message.contains("4096"));
}

#[test]
fn test_invalid_argument_display()
{
    let error = BridgeError::InvalidArgument("test arg".to_string());
    let message = format!("{}", error);
    assert!(message.contains("Invalid argument"));
    assert!(message.contains("test arg"));
}

#[test]
fn test_result_type()
{
    // Test that Result type is properly aliased
    let _result: BridgeResult<()> = Ok(());
    let _error_result: BridgeResult<()> = Err(BridgeError::SyncNotReady);
}
