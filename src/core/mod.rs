//! # Core Protocol Components
//!
//! Low-level encoding primitives shared by the rest of the stack.
//!
//! ## Components
//! - **Binary**: cursor reader/writer for primitive values with configurable byte order
//! - **Codec**: Tokio codec for newline-delimited channel frames
//!
//! ## Frame Format
//! ```text
//! base64( [Nonce(24)] [Ciphertext+Tag(N)] ) '\n'
//! ```
//!
//! ## Security
//! - Every binary read is bounds-checked before the buffer is touched
//! - Frame length is capped before the delimiter is seen

pub mod binary;
pub mod codec;

pub use binary::{BinaryReader, BinaryWriter, ByteOrder};
pub use codec::FrameCodec;
