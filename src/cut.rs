//! Cutting a DEFLATE stream down to an encoded-size budget.
//!
//! The cutter walks the blocks of an existing stream, tracking how many
//! bytes the portion seen so far decodes to, and stops once the next symbol
//! would push the encoding past the budget. Terminating the output cleanly
//! only takes a few patched bits: some block's final-bit flag is raised and,
//! for Huffman blocks, an end-of-block code is written over the old data.
//! For stored blocks the length header is rewritten instead.

use tracing::{debug, trace};

use crate::bits::Bitstream;
use crate::error::{Error, Result};
use crate::huffman::{
    EndOfBlockCode, Huffman, CL_CODE_ORDER, DISTANCE_BASE, DISTANCE_EXTRA_BITS,
    FIXED_DIST_LENGTHS, FIXED_LIT_LENGTHS, LENGTH_BASE, LENGTH_EXTRA_BITS, MAX_CL_CODES,
    MAX_DIST_CODES, MAX_LIT_CODES,
};

/// Length in bytes of the smallest valid DEFLATE-encoded data.
pub const SMALLEST_VALID_MAX_ENCODED_LEN: usize = 2;

/// Budgets above this are silently clamped.
const MAX_ENCODED_LEN_CAP: usize = 1 << 30;

/// Outcome of a successful cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CutResult {
    /// Length of the buffer's head that now holds a self-contained DEFLATE
    /// stream.
    pub encoded_len: usize,
    /// Exact length the cut stream decompresses to.
    pub decoded_len: usize,
}

/// How much of one block fit inside the budget.
///
/// The two non-`Consumed` outcomes drive the commit/rollback decision in the
/// driver loop; they are never surfaced to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockOutcome {
    /// The whole block was consumed; the cursor sits just past it.
    Consumed,
    /// Nothing of this block fit; the cut point is a previous block
    /// boundary.
    NoProgress,
    /// The block was truncated in place and now terminates inside the
    /// budget.
    Truncated,
}

/// Shortens `encoded` in place so that some prefix of it is a valid,
/// self-terminating DEFLATE stream of at most `max_encoded_len` bytes.
///
/// `encoded` must start out holding valid DEFLATE-compressed data. On
/// success, `encoded[..encoded_len]` decompresses to exactly `decoded_len`
/// bytes, and those bytes are a prefix of what the original stream
/// decompresses to. Bytes past `encoded_len` may have been clobbered and
/// should be treated as garbage. The cut is valid but not necessarily
/// maximal: a longer prefix fitting the same budget may exist.
///
/// `max_encoded_len` must be at least [`SMALLEST_VALID_MAX_ENCODED_LEN`];
/// values above 2^30 are treated as 2^30.
///
/// # Example
///
/// ```
/// use deflate_cut::cut;
///
/// // DEFLATE encoding of "Hello" as a single stored block.
/// let mut encoded = vec![0x01, 0x05, 0x00, 0xFA, 0xFF, b'H', b'e', b'l', b'l', b'o'];
///
/// // The whole stream fits a 10-byte budget.
/// let full = cut(&mut encoded.clone(), 10).unwrap();
/// assert_eq!((full.encoded_len, full.decoded_len), (10, 5));
///
/// // A 7-byte budget keeps two of the five literals.
/// let partial = cut(&mut encoded, 7).unwrap();
/// assert_eq!((partial.encoded_len, partial.decoded_len), (7, 2));
/// ```
pub fn cut(encoded: &mut [u8], max_encoded_len: usize) -> Result<CutResult> {
    if max_encoded_len < SMALLEST_VALID_MAX_ENCODED_LEN {
        return Err(Error::MaxEncodedLenTooSmall(max_encoded_len));
    }
    let max_encoded_len = max_encoded_len.min(MAX_ENCODED_LEN_CAP).min(encoded.len());
    if max_encoded_len < SMALLEST_VALID_MAX_ENCODED_LEN {
        return Err(Error::NotEnoughData);
    }

    Cutter {
        buf: encoded,
        bits: Bitstream::default(),
        max_encoded_len,
        decoded_len: 0,
        l_huff: Huffman::new(),
        d_huff: Huffman::new(),
    }
    .cut()
}

/// Writes the two-byte stream that decodes to nothing: finalBlock = 1,
/// blockType = 1 (static Huffman), the 7-bit end-of-block code, zero
/// padding.
fn cut_empty(buf: &mut [u8]) -> CutResult {
    buf[0] = 0x03;
    buf[1] = 0x00;
    CutResult {
        encoded_len: 2,
        decoded_len: 0,
    }
}

struct Cutter<'a> {
    buf: &'a mut [u8],
    bits: Bitstream,
    max_encoded_len: usize,
    /// Committed decoded length. Signed on purpose: a pathological stream
    /// can claim more output than fits in 31 bits, and the symbol loop
    /// treats the would-be overflow as budget exhaustion.
    decoded_len: i32,
    l_huff: Huffman,
    d_huff: Huffman,
}

impl Cutter<'_> {
    fn cut(mut self) -> Result<CutResult> {
        // Cursor location just past the most recent non-final block's
        // final-bit flag, once one block has been consumed in full.
        let mut prev_final_block: Option<(usize, u32)> = None;

        loop {
            let final_block = self.take(1)?;
            let final_bit_mark = (self.bits.index, self.bits.n_bits);
            let block_type = self.take(2)?;

            trace!("block header: final={} type={}", final_block, block_type);

            let outcome = match block_type {
                0 => self.stored_block()?,
                1 => self.static_block()?,
                2 => self.dynamic_block()?,
                _ => return Err(Error::BadBlockType),
            };

            match outcome {
                BlockOutcome::Consumed => {
                    if final_block == 1 {
                        break;
                    }
                    prev_final_block = Some(final_bit_mark);
                }
                BlockOutcome::NoProgress => {
                    let Some(prev) = prev_final_block else {
                        debug!(
                            "no block fits in {} bytes, emitting the empty stream",
                            self.max_encoded_len
                        );
                        return Ok(cut_empty(self.buf));
                    };

                    // Un-read to just before this block's final-bit flag,
                    // then promote the previous block to final instead.
                    let (index, n_bits) = final_bit_mark;
                    if n_bits + 1 == 8 {
                        self.bits.seek(index - 1, 0);
                    } else {
                        self.bits.seek(index, n_bits + 1);
                    }
                    self.set_final_bit(prev);
                    break;
                }
                BlockOutcome::Truncated => {
                    self.set_final_bit(final_bit_mark);
                    break;
                }
            }
        }

        // Zero the bits of the last byte above the end of the stream: they
        // still hold data from the original, longer encoding.
        if self.bits.n_bits != 0 {
            self.buf[self.bits.index - 1] &= ((1u32 << (8 - self.bits.n_bits)) - 1) as u8;
        }

        debug!(
            "cut to {} encoded bytes, {} decoded",
            self.bits.index, self.decoded_len
        );
        Ok(CutResult {
            encoded_len: self.bits.index,
            decoded_len: self.decoded_len as usize,
        })
    }

    fn take(&mut self, n: u32) -> Result<u32> {
        self.bits.take(self.buf, n).ok_or(Error::NotEnoughData)
    }

    /// Raise the final-block flag whose position is recorded by `mark`, the
    /// cursor state from just after that flag was read.
    fn set_final_bit(&mut self, mark: (usize, u32)) {
        let (index, n_bits) = mark;
        self.buf[index - 1] |= 1 << (7 - n_bits);
    }

    /// Stored block: byte-aligned `len`/`!len` header, then raw bytes
    /// (RFC 1951 section 3.2.4). A partial fit rewrites the header in place
    /// so the shorter payload still parses.
    fn stored_block(&mut self) -> Result<BlockOutcome> {
        let header = self.bits.index;
        if self.max_encoded_len < header + 4 {
            return Ok(BlockOutcome::NoProgress);
        }
        let length = u32::from(self.buf[header]) | u32::from(self.buf[header + 1]) << 8;
        let inverse = u32::from(self.buf[header + 2]) | u32::from(self.buf[header + 3]) << 8;
        if length + inverse != 0xFFFF {
            return Err(Error::BadBlockLength);
        }

        if self.decoded_len.checked_add(length as i32).is_none() {
            return Ok(BlockOutcome::NoProgress);
        }

        let data = header + 4;
        let remaining = self.max_encoded_len - data;
        if remaining >= length as usize {
            self.bits.seek(data + length as usize, 0);
            self.decoded_len += length as i32;
            return Ok(BlockOutcome::Consumed);
        }
        if remaining == 0 {
            return Ok(BlockOutcome::NoProgress);
        }

        let length = remaining as u32;
        let inverse = 0xFFFF - length;
        self.buf[header] = length as u8;
        self.buf[header + 1] = (length >> 8) as u8;
        self.buf[header + 2] = inverse as u8;
        self.buf[header + 3] = (inverse >> 8) as u8;
        self.bits.seek(data + length as usize, 0);
        self.decoded_len += length as i32;

        trace!("stored block truncated to {} bytes", length);
        Ok(BlockOutcome::Truncated)
    }

    /// Static-Huffman block: the fixed code lengths of RFC 1951 section
    /// 3.2.6.
    fn static_block(&mut self) -> Result<BlockOutcome> {
        self.huffman_block(&FIXED_LIT_LENGTHS, &FIXED_DIST_LENGTHS)
    }

    /// Dynamic-Huffman block header: code counts, the code-length alphabet,
    /// then the RLE-coded literal/length and distance code lengths
    /// (RFC 1951 section 3.2.7).
    fn dynamic_block(&mut self) -> Result<BlockOutcome> {
        let hlit = 257 + self.take(5)? as usize;
        let hdist = 1 + self.take(5)? as usize;
        let hclen = 4 + self.take(4)? as usize;
        if hlit > MAX_LIT_CODES || hdist > MAX_DIST_CODES {
            return Err(Error::TooManyCodes {
                lit: hlit,
                dist: hdist,
            });
        }

        let mut cl_lengths = [0u8; MAX_CL_CODES];
        for i in 0..hclen {
            cl_lengths[CL_CODE_ORDER[i]] = self.take(3)? as u8;
        }
        let _ = self.l_huff.build(&cl_lengths)?;

        let mut lengths = vec![0u8; hlit + hdist];
        let mut i = 0;
        while i < lengths.len() {
            let Some(symbol) = self.l_huff.decode(&mut self.bits, self.buf) else {
                return Err(Error::BadCodeLengths);
            };
            let (value, count) = match symbol {
                0..=15 => {
                    lengths[i] = symbol as u8;
                    i += 1;
                    continue;
                }
                16 => {
                    if i == 0 {
                        return Err(Error::BadCodeLengths);
                    }
                    (lengths[i - 1], 3 + self.take(2)? as usize)
                }
                17 => (0, 3 + self.take(3)? as usize),
                18 => (0, 11 + self.take(7)? as usize),
                _ => return Err(Error::BadCodeLengths),
            };
            if i + count > lengths.len() {
                return Err(Error::BadCodeLengths);
            }
            lengths[i..i + count].fill(value);
            i += count;
        }

        let (l_lengths, d_lengths) = lengths.split_at(hlit);
        self.huffman_block(l_lengths, d_lengths)
    }

    /// Symbol loop shared by static and dynamic blocks.
    ///
    /// Decodes literal/length and distance symbols without materializing any
    /// output, checkpointing the cursor after each symbol that still leaves
    /// room in the budget for an end-of-block code. On budget exhaustion the
    /// cursor rolls back to the last checkpoint and the end code is written
    /// there.
    fn huffman_block(&mut self, l_lengths: &[u8], d_lengths: &[u8]) -> Result<BlockOutcome> {
        let Some(end_code) = self.l_huff.build(l_lengths)? else {
            return Err(Error::NoEndOfBlock);
        };
        let _ = self.d_huff.build(d_lengths)?;

        // A dynamic header alone can already blow the budget.
        if self.bits.index > self.max_encoded_len {
            return Ok(BlockOutcome::NoProgress);
        }

        let max_encoded_bits = 8 * self.max_encoded_len as u64;
        let mut checkpoint: Option<(usize, u32)> = None;
        let mut decoded_len = self.decoded_len;

        loop {
            let Some(symbol) = self.l_huff.decode(&mut self.bits, self.buf) else {
                return Err(Error::BadSymbol);
            };

            let step = if symbol < 256 {
                1
            } else if symbol == 256 {
                // Natural end-of-block inside the budget.
                return Ok(BlockOutcome::Consumed);
            } else {
                self.copy_len(symbol)?
            };

            // A decoded-length overflow stops the block like a blown budget
            // would: fall back to the last checkpoint.
            let Some(new_len) = decoded_len.checked_add(step) else {
                break;
            };
            decoded_len = new_len;

            if self.bits.bit_pos() + u64::from(end_code.n_bits) > max_encoded_bits {
                break;
            }
            checkpoint = Some((self.bits.index, self.bits.n_bits));
            self.decoded_len = decoded_len;
        }

        let Some((index, n_bits)) = checkpoint else {
            return Ok(BlockOutcome::NoProgress);
        };
        self.bits.seek(index, n_bits);
        self.write_end_code(end_code);

        trace!("huffman block truncated at bit {}", self.bits.bit_pos());
        Ok(BlockOutcome::Truncated)
    }

    /// Consume one length/distance pair and return the copy length. The
    /// copy itself never happens; the cutter only tracks how long the
    /// decoded output would be.
    fn copy_len(&mut self, symbol: u16) -> Result<i32> {
        let li = symbol as usize - 257;
        if li >= LENGTH_BASE.len() {
            return Err(Error::BadSymbol);
        }
        let length = i32::from(LENGTH_BASE[li]) + self.take(u32::from(LENGTH_EXTRA_BITS[li]))? as i32;

        let Some(d_symbol) = self.d_huff.decode(&mut self.bits, self.buf) else {
            return Err(Error::BadSymbol);
        };
        let di = d_symbol as usize;
        if di >= DISTANCE_BASE.len() {
            return Err(Error::BadSymbol);
        }
        self.take(u32::from(DISTANCE_EXTRA_BITS[di]))?;

        Ok(length)
    }

    /// Write the end-of-block code at the cursor, MSB first. Each target
    /// bit is cleared before being set: these positions still hold bits of
    /// the original stream. Trailing bits of the final byte are zeroed by
    /// the driver.
    fn write_end_code(&mut self, end_code: EndOfBlockCode) {
        for j in (0..end_code.n_bits).rev() {
            if self.bits.n_bits == 0 {
                self.bits.index += 1;
                self.bits.n_bits = 8;
            }
            self.bits.n_bits -= 1;

            let bit = ((end_code.bits >> j) & 1) as u8;
            let mask = 1u8 << (7 - self.bits.n_bits);
            self.buf[self.bits.index - 1] &= !mask;
            self.buf[self.bits.index - 1] |= mask * bit;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut encoder =
            flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn inflate(data: &[u8]) -> Vec<u8> {
        let mut decoded = Vec::new();
        flate2::read::DeflateDecoder::new(data)
            .read_to_end(&mut decoded)
            .unwrap();
        decoded
    }

    /// Two stored blocks of 100 bytes each, the second one final. Encoded
    /// length is 210 bytes: two 5-byte headers plus the payloads.
    fn two_stored_blocks() -> Vec<u8> {
        let mut encoded = Vec::new();
        for (header, base) in [(0x00u8, 0u8), (0x01, 100)] {
            encoded.push(header);
            encoded.extend_from_slice(&100u16.to_le_bytes());
            encoded.extend_from_slice(&(!100u16).to_le_bytes());
            encoded.extend((0..100).map(|i| base + i));
        }
        encoded
    }

    /// Skewed but non-repeating bytes: compresses well enough for flate2 to
    /// emit Huffman blocks, badly enough to span plenty of encoded bytes.
    fn skewed_data() -> Vec<u8> {
        (0..4000u32)
            .map(|i| (i ^ (i >> 3) ^ (i >> 7)) as u8 & 0x0F)
            .collect()
    }

    #[test]
    fn rejects_budget_below_minimum() {
        assert_eq!(
            cut(&mut [0x03, 0x00], 1),
            Err(Error::MaxEncodedLenTooSmall(1))
        );
        assert_eq!(
            cut(&mut [0x03, 0x00], 0),
            Err(Error::MaxEncodedLenTooSmall(0))
        );
    }

    #[test]
    fn rejects_buffer_below_minimum() {
        assert_eq!(cut(&mut [0x01], 100), Err(Error::NotEnoughData));
    }

    #[test]
    fn rejects_reserved_block_type() {
        assert_eq!(cut(&mut [0x06, 0x00], 2), Err(Error::BadBlockType));
    }

    #[test]
    fn rejects_mismatched_stored_length() {
        let mut encoded = [0x00, 0x05, 0x00, 0x00, 0x00, 0xAA];
        assert_eq!(cut(&mut encoded, 6), Err(Error::BadBlockLength));
    }

    #[test]
    fn rejects_truncated_dynamic_header() {
        // finalBlock = 0, blockType = 2, then the buffer ends inside the
        // code-length fields.
        assert_eq!(cut(&mut [0x04, 0x00], 2), Err(Error::NotEnoughData));
    }

    #[test]
    fn emits_empty_stream_when_nothing_fits() {
        let mut encoded = deflate(b"Hello, World!\n");
        let result = cut(&mut encoded, 2).unwrap();

        assert_eq!(
            result,
            CutResult {
                encoded_len: 2,
                decoded_len: 0
            }
        );
        assert_eq!(&encoded[..2], &[0x03, 0x00]);
        assert!(inflate(&encoded[..2]).is_empty());
    }

    #[test]
    fn emits_empty_stream_for_unfinishable_stored_header() {
        // A non-final stored block whose header cannot fit in two bytes is
        // no progress, and with no earlier block the cut degrades to the
        // canonical empty stream.
        let mut encoded = [0x00, 0x00];
        let result = cut(&mut encoded, 2).unwrap();

        assert_eq!((result.encoded_len, result.decoded_len), (2, 0));
        assert_eq!(encoded, [0x03, 0x00]);
    }

    #[test]
    fn full_budget_keeps_entire_stream() {
        let data = b"Hello, World!\n";
        let mut encoded = deflate(data);
        let max = encoded.len();
        let result = cut(&mut encoded, max).unwrap();

        assert!(result.encoded_len <= max);
        assert_eq!(result.decoded_len, data.len());
        assert_eq!(inflate(&encoded[..result.encoded_len]), &data[..]);
    }

    #[test]
    fn promotes_previous_block_when_next_header_cannot_fit() {
        let mut encoded = two_stored_blocks();
        let original = inflate(&encoded);

        // 107 bytes: block 1 fits whole (105 bytes), block 2's stored
        // header does not.
        let result = cut(&mut encoded, 107).unwrap();
        assert_eq!(
            result,
            CutResult {
                encoded_len: 105,
                decoded_len: 100
            }
        );
        assert_eq!(inflate(&encoded[..105]), &original[..100]);
    }

    #[test]
    fn truncates_stored_block_in_place() {
        let mut encoded = two_stored_blocks();
        let original = inflate(&encoded);

        // 150 bytes: 40 bytes of block 2's payload still fit after its
        // header, so the block is shortened rather than dropped.
        let result = cut(&mut encoded, 150).unwrap();
        assert_eq!(
            result,
            CutResult {
                encoded_len: 150,
                decoded_len: 140
            }
        );
        assert_eq!(inflate(&encoded[..150]), &original[..140]);
    }

    #[test]
    fn truncated_huffman_block_decodes_to_prefix() {
        let data = skewed_data();
        let mut encoded = deflate(&data);
        let budget = encoded.len() / 2;

        let result = cut(&mut encoded, budget).unwrap();
        assert!(result.encoded_len <= budget);

        let decoded = inflate(&encoded[..result.encoded_len]);
        assert_eq!(decoded.len(), result.decoded_len);
        assert_eq!(decoded, &data[..result.decoded_len]);
    }

    #[test]
    fn recutting_at_the_result_is_identity() {
        let data = skewed_data();
        let mut encoded = deflate(&data);
        let budget = 2 * encoded.len() / 3;

        let first = cut(&mut encoded, budget).unwrap();
        let mut recut = encoded[..first.encoded_len].to_vec();
        let second = cut(&mut recut, first.encoded_len).unwrap();

        assert_eq!(second, first);
        assert_eq!(recut, &encoded[..first.encoded_len]);
    }

    #[test]
    fn minimal_stream_survives_a_minimal_budget() {
        // 0x03 0x00 is already the smallest stream; cutting it is a no-op.
        let mut encoded = [0x03, 0x00];
        let result = cut(&mut encoded, 2).unwrap();

        assert_eq!((result.encoded_len, result.decoded_len), (2, 0));
        assert_eq!(encoded, [0x03, 0x00]);
    }
}
