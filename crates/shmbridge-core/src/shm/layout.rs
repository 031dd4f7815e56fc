//! Segment layout constants.
//!
//! Both sides of the bridge must agree on every value in this file; the total
//! size is fixed when the segment is created.

/// Bytes reserved for the header, including the sync block.
pub const HEADER_SIZE: usize = 1024;

/// Offset of the synchronization block (second half of the header).
pub const SYNC_OFFSET: usize = 512;

/// Bytes available to the synchronization block.
pub const SYNC_SIZE: usize = HEADER_SIZE - SYNC_OFFSET;

/// Offset of the body region.
pub const BODY_OFFSET: usize = HEADER_SIZE;

/// Capacity of the body region (1 MiB).
pub const BODY_SIZE: usize = 1024 * 1024;

/// Total segment size.
pub const SEGMENT_SIZE: usize = HEADER_SIZE + BODY_SIZE;

/// Offset of the command word.
pub const COMMAND_OFFSET: usize = 0;
/// Offset of the `value` field.
pub const VALUE_OFFSET: usize = 4;
/// Offset of the `address` field.
pub const ADDRESS_OFFSET: usize = 8;
/// Offset of the `length` field.
pub const LENGTH_OFFSET: usize = 16;
/// Offset of the `error` field.
pub const ERROR_OFFSET: usize = 20;

/// Required alignment of the segment base.
pub const SEGMENT_ALIGN: usize = 8;
