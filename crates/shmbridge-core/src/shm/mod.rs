//! # Shared Segment
//!
//! Fixed layout of the shared segment and safe views onto it.
//!
//! ```text
//! 0          512                    1024                         1024 + 1 MiB
//! +----------+----------------------+-----------------------------+
//! | header   | sync block           | body                        |
//! +----------+----------------------+-----------------------------+
//! ```
//!
//! - [`Header`]: command word, `value`, `address`, `length`, `error`
//! - sync block: owned by [`crate::sync::PthreadRendezvous`]
//! - [`Body`]: bulk payload area, bounds-checked access only

pub mod body;
pub mod header;
pub mod layout;
pub mod segment;

pub use body::{Body, ByteRange, Scalar, TextRef};
pub use header::Header;
pub use layout::{BODY_OFFSET, BODY_SIZE, HEADER_SIZE, SEGMENT_SIZE, SYNC_OFFSET, SYNC_SIZE};
pub use segment::Segment;
