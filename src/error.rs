//! Error types for cut operations.

use thiserror::Error;

/// Result type alias for cut operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Failure modes for cutting a DEFLATE stream.
///
/// Every error is terminal for the call. The buffer may have been partially
/// rewritten by the time an error surfaces, so its contents should be
/// considered unspecified on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// The budget cannot hold any DEFLATE stream at all; see
    /// [`SMALLEST_VALID_MAX_ENCODED_LEN`](crate::SMALLEST_VALID_MAX_ENCODED_LEN).
    #[error("max encoded length {0} is too small")]
    MaxEncodedLenTooSmall(usize),

    /// The buffer ended in the middle of a field, or is shorter than the
    /// smallest valid stream.
    #[error("invalid input: not enough data")]
    NotEnoughData,

    /// A block header used the reserved block type 3.
    #[error("invalid input: bad block type")]
    BadBlockType,

    /// A stored block's length and its ones' complement do not agree.
    #[error("invalid input: bad block length")]
    BadBlockLength,

    /// A dynamic block header declared more codes than RFC 1951 allows.
    #[error("invalid input: too many codes ({lit} literal/length, {dist} distance)")]
    TooManyCodes { lit: usize, dist: usize },

    /// The code-length alphabet produced an impossible length sequence: a
    /// repeat with nothing to repeat, or a repeat running past the declared
    /// code count.
    #[error("invalid input: bad code lengths")]
    BadCodeLengths,

    /// A code length set is empty, over-subscribed, or under-subscribed.
    #[error("invalid input: bad Huffman tree")]
    BadHuffmanTree,

    /// The literal/length alphabet assigns no code to the end-of-block
    /// symbol, so the block could never terminate.
    #[error("invalid input: no end-of-block")]
    NoEndOfBlock,

    /// A literal/length or distance symbol outside the valid range.
    #[error("invalid input: bad symbol")]
    BadSymbol,
}
