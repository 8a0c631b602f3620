//! # deflate-cut
//!
//! Cut DEFLATE-compressed data (RFC 1951) down to a byte budget, in place.
//!
//! The usual compression problem is encoding all of the input in as few
//! bytes as possible. This crate solves a reversed one: given data that is
//! *already* DEFLATE-compressed and a maximum encoded size, produce a prefix
//! of the compressed bytes that is itself a valid, self-terminating stream.
//! Decompressing the cut stream yields a prefix of the original
//! decompression.
//!
//! No new compressed content is synthesized. The cutter walks the existing
//! block structure, decides where to stop, and patches a handful of bits in
//! place: a final-block flag, an end-of-block code, or a shortened stored
//! length header. Inputs the budget cannot accommodate at all degrade to the
//! canonical two-byte stream that decodes to nothing.
//!
//! ## Example
//!
//! ```
//! use deflate_cut::{cut, SMALLEST_VALID_MAX_ENCODED_LEN};
//!
//! // "Hi" as a single stored block: 2 bytes of payload, 7 encoded bytes.
//! let mut encoded = vec![0x01, 0x02, 0x00, 0xFD, 0xFF, b'H', b'i'];
//!
//! let result = cut(&mut encoded, 6).unwrap();
//! assert_eq!((result.encoded_len, result.decoded_len), (6, 1));
//!
//! // Any valid input can be cut down to the smallest valid stream.
//! let result = cut(&mut encoded, SMALLEST_VALID_MAX_ENCODED_LEN).unwrap();
//! assert_eq!((result.encoded_len, result.decoded_len), (2, 0));
//! ```

pub mod cut;
pub mod error;

mod bits;
mod huffman;

// Re-export the public surface.
pub use cut::{cut, CutResult, SMALLEST_VALID_MAX_ENCODED_LEN};
pub use error::{Error, Result};
