//! Fixed-width byte stream primitives for the hopnet event protocol.
//!
//! This crate provides [`ByteWriter`] and [`ByteReader`] for encoding and
//! decoding the primitive field types that event payloads are built from.
//!
//! # Design Principles
//!
//! - **No unsafe code** - Safety is paramount.
//! - **Platform independent** - Every multi-byte value is big-endian (network order).
//! - **Bounded operations** - All reads are bounds-checked.
//! - **No domain knowledge** - This crate knows nothing about events, peers, or phases.
//! - **Explicit errors** - All failures return structured errors, never panic.
//!
//! # Example
//!
//! ```
//! use stream::{ByteReader, ByteWriter};
//!
//! let mut writer = ByteWriter::new();
//! writer.write_bool(true);
//! writer.write_i32(-42);
//! writer.write_f32(1.5);
//!
//! let bytes = writer.finish();
//!
//! let mut reader = ByteReader::new(&bytes);
//! assert!(reader.read_bool().unwrap());
//! assert_eq!(reader.read_i32().unwrap(), -42);
//! assert_eq!(reader.read_f32().unwrap(), 1.5);
//! assert!(reader.is_empty());
//! ```

mod error;
mod reader;
mod writer;

pub use error::{StreamError, StreamResult};
pub use reader::ByteReader;
pub use writer::ByteWriter;
