//! Decompress data compressed with the DEFLATE algorithm.
//! This module focuses on the decompression process.
//!
//! The DEFLATE algorithm is a combination of LZ77 and Huffman coding.
//! The decompression process is the reverse of the compression process.

use crate::bit_stream::{BitOrder, BitReader};
use crate::error::{Error, Result};
use crate::huffman::HuffmanLookupTable;
use log::trace;

// constant values for the DEFLATE algorithm

const BFINAL_LEN: usize = 1;
const BFINAL_VALUE: usize = 1;

const BTYPE_LEN: usize = 2;
const BTYPE_NO_COMPRESSION: usize = 0b00;
const BTYPE_FIXED_HUFFMAN: usize = 0b01;
const BTYPE_DYNAMIC_HUFFMAN: usize = 0b10;

const LEN_LEN: usize = 16;
const NLEN_LEN: usize = 16;

const LITERAL_CODE_BASE: usize = 0;
const LITERAL_CODE_MAX: usize = 255;
const END_BLOCK_CODE: usize = 256;
const LENGTH_CODE_BASE: usize = 257;
const LENGTH_CODE_MAX: usize = 285;

const HLIT_LEN: usize = 5;
const HLIT_BASE: usize = 257;
const HDIST_LEN: usize = 5;
const HDIST_BASE: usize = 1;
const HCLEN_LEN: usize = 4;
const HCLEN_BASE: usize = 4;

const DYN_ALPHABET_CODE_NUM: usize = 19;
const DYN_ALPHABET_CODE_LEN: usize = 3;
const DYN_ALPHABET_TABLE_MAX_BITS: u8 = 7;
const DYN_TABLE_MAX_BITS: u8 = 15;

/// Length code table for DEFLATE.
/// length_code_table[i] = (length_code, length_base, extra_bits)
const LENGTH_CODE_TABLE: &[(usize, usize, usize)] = &[
    (257, 3, 0),
    (258, 4, 0),
    (259, 5, 0),
    (260, 6, 0),
    (261, 7, 0),
    (262, 8, 0),
    (263, 9, 0),
    (264, 10, 0),
    (265, 11, 1),
    (266, 13, 1),
    (267, 15, 1),
    (268, 17, 1),
    (269, 19, 2),
    (270, 23, 2),
    (271, 27, 2),
    (272, 31, 2),
    (273, 35, 3),
    (274, 43, 3),
    (275, 51, 3),
    (276, 59, 3),
    (277, 67, 4),
    (278, 83, 4),
    (279, 99, 4),
    (280, 115, 4),
    (281, 131, 5),
    (282, 163, 5),
    (283, 195, 5),
    (284, 227, 5),
    (285, 258, 0),
];

/// Get the length of the repeated data by the length code.
/// This function reads the extra bits if needed.
/// Returns None if the code is invalid.
fn get_length_by_code(code: usize, bit_reader: &mut BitReader) -> Option<usize> {
    let (length_code, length_base, extra_bits) =
        LENGTH_CODE_TABLE.get(code - LENGTH_CODE_BASE).cloned()?;
    assert!(length_code == code);
    Some(length_base + bit_reader.read_bits(extra_bits))
}

/// Distance code table for DEFLATE.
/// distance_code_table[i] = (distance_code, distance_base, extra_bits)
const DISTANCE_CODE_TABLE: &[(usize, usize, usize)] = &[
    (0, 1, 0),
    (1, 2, 0),
    (2, 3, 0),
    (3, 4, 0),
    (4, 5, 1),
    (5, 7, 1),
    (6, 9, 2),
    (7, 13, 2),
    (8, 17, 3),
    (9, 25, 3),
    (10, 33, 4),
    (11, 49, 4),
    (12, 65, 5),
    (13, 97, 5),
    (14, 129, 6),
    (15, 193, 6),
    (16, 257, 7),
    (17, 385, 7),
    (18, 513, 8),
    (19, 769, 8),
    (20, 1025, 9),
    (21, 1537, 9),
    (22, 2049, 10),
    (23, 3073, 10),
    (24, 4097, 11),
    (25, 6145, 11),
    (26, 8193, 12),
    (27, 12289, 12),
    (28, 16385, 13),
    (29, 24577, 13),
];

/// Get the distance of the repeated data by the distance code.
/// This function reads the extra bits if needed.
/// Returns None if the code is invalid.
fn get_distance_by_code(code: usize, bit_reader: &mut BitReader) -> Option<usize> {
    let (distance_code, distance_base, extra_bits) = DISTANCE_CODE_TABLE.get(code).cloned()?;
    assert!(distance_code == code);
    Some(distance_base + bit_reader.read_bits(extra_bits))
}

/// Dynamic Huffman Tree code lengths alphabet order.
/// Defined in RFC 1951, section 3.2.7.
const DYNAMIC_HUFFMAN_TREE_ORDER: [usize; DYN_ALPHABET_CODE_NUM] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

/// Inflate block with literal and distance huffman tables.
/// Because a duplicated string reference may refer to a string in a previous block,
/// we need the whole output to be able to resolve the references.
/// Returns the number of bytes outputted.
fn inflate_compressed_block(
    bit_reader: &mut BitReader,
    output: &mut Vec<u8>,
    lit_tb: &HuffmanLookupTable,
    dis_tb: &HuffmanLookupTable,
) -> Result<usize> {
    let mut bytes_outputted = 0;
    loop {
        let symbol = lit_tb.decode_next(bit_reader).ok_or(Error::SymbolNotFound)?;
        match symbol {
            END_BLOCK_CODE => {
                // End of block
                break;
            }
            LITERAL_CODE_BASE..=LITERAL_CODE_MAX => {
                // Literal
                output.push(symbol as u8);
                bytes_outputted += 1;
            }
            LENGTH_CODE_BASE..=LENGTH_CODE_MAX => {
                // Length of the repeated data
                let len =
                    get_length_by_code(symbol, bit_reader).ok_or(Error::WrongSymbol(symbol))?;
                // The distance code
                let dist_code = dis_tb.decode_next(bit_reader).ok_or(Error::SymbolNotFound)?;
                // The distance of the repeated data
                let dist = get_distance_by_code(dist_code, bit_reader)
                    .ok_or(Error::WrongSymbol(dist_code))?;
                // Repeat the data
                bytes_outputted += repeat_with_overlap(output, dist, len)?;
            }
            _ => return Err(Error::WrongSymbol(symbol)),
        }
    }
    Ok(bytes_outputted)
}

/// Copy `len` bytes starting `dist` bytes before the end of the output.
/// The source range may overlap the bytes being appended: a distance of 1
/// repeats the last byte `len` times.
fn repeat_with_overlap(output: &mut Vec<u8>, dist: usize, len: usize) -> Result<usize> {
    if dist > output.len() {
        return Err(Error::WrongBackReference {
            distance: dist,
            available: output.len(),
        });
    }
    for _ in 0..len {
        let byte = output[output.len() - dist];
        output.push(byte);
    }
    Ok(len)
}

/// Inflate a stored (uncompressed) block.
fn inflate_stored_block(bit_reader: &mut BitReader, output: &mut Vec<u8>) -> Result<()> {
    bit_reader
        .try_advance_to_byte_boundary()
        .ok_or(Error::TruncatedInput)?;
    if bit_reader.bits_remaining() < LEN_LEN + NLEN_LEN {
        return Err(Error::TruncatedInput);
    }
    let len = bit_reader.read_bits(LEN_LEN) as u16;
    let nlen = bit_reader.read_bits(NLEN_LEN) as u16;
    // nlen holds the one's complement of len.
    if len != !nlen {
        return Err(Error::WrongUncompressedBlockLengths {
            length: len,
            check: nlen,
        });
    }
    let literal_data = bit_reader
        .try_read_aligned_bytes(len as usize)
        .ok_or(Error::TruncatedInput)?;
    output.extend_from_slice(literal_data);
    Ok(())
}

/// Read dynamic Huffman tables.
/// Returns a tuple of (literal table, distance table).
/// Defined in RFC 1951, section 3.2.7.
fn read_dynamic_huffman_tables(
    bit_reader: &mut BitReader,
) -> Result<(HuffmanLookupTable, HuffmanLookupTable)> {
    if bit_reader.bits_remaining() < HLIT_LEN + HDIST_LEN + HCLEN_LEN {
        return Err(Error::TruncatedInput);
    }
    let hlit = bit_reader.read_bits(HLIT_LEN) + HLIT_BASE;
    let hdist = bit_reader.read_bits(HDIST_LEN) + HDIST_BASE;
    let hclen = bit_reader.read_bits(HCLEN_LEN) + HCLEN_BASE;
    let mut alphabet_code_len = vec![0; DYN_ALPHABET_CODE_NUM];
    (0..hclen).for_each(|i| {
        alphabet_code_len[DYNAMIC_HUFFMAN_TREE_ORDER[i]] =
            bit_reader.read_bits(DYN_ALPHABET_CODE_LEN) as u8;
    });
    let alphabet_code_len_table =
        HuffmanLookupTable::new(&alphabet_code_len, DYN_ALPHABET_TABLE_MAX_BITS)?;

    // Both alphabets are coded as one run of lengths: a repeat may cross
    // the boundary between them.
    let code_lengths = read_code_lengths(bit_reader, &alphabet_code_len_table, hlit + hdist)?;
    let (lit_code_len, dis_code_len) = code_lengths.split_at(hlit);

    let lit_tb = HuffmanLookupTable::new(lit_code_len, DYN_TABLE_MAX_BITS)?;
    let dis_tb = HuffmanLookupTable::new(dis_code_len, DYN_TABLE_MAX_BITS)?;

    Ok((lit_tb, dis_tb))
}

/// Read code lengths using the alphabet code length table.
/// Returns a vector of code lengths.
/// Defined in RFC 1951, section 3.2.7.
/// The code lengths are used to create the dynamic Huffman tables.
fn read_code_lengths(
    bit_reader: &mut BitReader,
    alphabet_code_len_table: &HuffmanLookupTable,
    num: usize,
) -> Result<Vec<u8>> {
    let mut code_lengths = vec![0; num];
    let mut i = 0;
    while i < num {
        let symbol = alphabet_code_len_table
            .decode_next(bit_reader)
            .ok_or(Error::SymbolNotFound)?;
        match symbol {
            0..=15 => {
                // 0-15: represent code lengths of 0-15
                code_lengths[i] = symbol as u8;
                i += 1;
            }
            16 => {
                // 16: copy the previous code length 3-6 times
                let repeat_len = 3 + bit_reader.read_bits(2);
                if i == 0 || i + repeat_len > num {
                    return Err(Error::WrongSymbol(symbol));
                }
                let prev_len = code_lengths[i - 1];
                for _ in 0..repeat_len {
                    code_lengths[i] = prev_len;
                    i += 1;
                }
            }
            17 => {
                // 17: repeat code length of 0 for 3-10 times
                let repeat_len = 3 + bit_reader.read_bits(3);
                if i + repeat_len > num {
                    return Err(Error::WrongSymbol(symbol));
                }
                i += repeat_len;
            }
            18 => {
                // 18: repeat code length of 0 for 11-138 times
                let repeat_len = 11 + bit_reader.read_bits(7);
                if i + repeat_len > num {
                    return Err(Error::WrongSymbol(symbol));
                }
                i += repeat_len;
            }
            _ => return Err(Error::WrongSymbol(symbol)),
        }
    }
    Ok(code_lengths)
}

/// Inflate a DEFLATE stream into a Vec<u8>.
/// This function decompresses the DEFLATE data and returns the decompressed
/// data as a Vec<u8>. The input data should be the compressed DEFLATE data.
pub fn inflate_to_vec(data: &[u8]) -> Result<Vec<u8>> {
    let mut bit_reader = BitReader::new(data, BitOrder::LsbFirst);
    inflate(&mut bit_reader)
}

/// Run the block loop on an existing reader and return the decompressed
/// data. The reader must consume bits LSB-first; outer formats that wrap a
/// DEFLATE stream (zlib, gzip) can hand over their reader after the framing
/// header.
pub fn inflate(bit_reader: &mut BitReader) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    loop {
        if bit_reader.bits_remaining() < BFINAL_LEN + BTYPE_LEN {
            return Err(Error::TruncatedInput);
        }
        let b_final = bit_reader.read_bits(BFINAL_LEN);
        let b_type = bit_reader.read_bits(BTYPE_LEN);
        trace!(
            "block: final={} type={:02b} output_len={}",
            b_final,
            b_type,
            output.len()
        );
        match b_type {
            BTYPE_NO_COMPRESSION => {
                inflate_stored_block(bit_reader, &mut output)?;
            }
            BTYPE_FIXED_HUFFMAN => {
                // Fixed Huffman block
                let lit_tb = HuffmanLookupTable::fixed_literal_table();
                let dis_tb = HuffmanLookupTable::fixed_distance_table();
                inflate_compressed_block(bit_reader, &mut output, &lit_tb, &dis_tb)?;
            }
            BTYPE_DYNAMIC_HUFFMAN => {
                // Dynamic Huffman block
                let (lit_tb, dis_tb) = read_dynamic_huffman_tables(bit_reader)?;
                inflate_compressed_block(bit_reader, &mut output, &lit_tb, &dis_tb)?;
            }
            _ => return Err(Error::WrongBlockType),
        }
        if b_final == BFINAL_VALUE {
            break;
        }
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_block() {
        // final=1, btype=00, len=5, nlen=0xFFFA, then five literal bytes.
        let data = [
            0x01, 0x05, 0x00, 0xFA, 0xFF, b'H', b'e', b'l', b'l', b'o',
        ];
        assert_eq!(inflate_to_vec(&data).unwrap(), b"Hello");
    }

    #[test]
    fn test_stored_block_bad_length_check() {
        // nlen is not the complement of len.
        let data = [0x01, 0x05, 0x00, 0x00, 0x00];
        assert_eq!(
            inflate_to_vec(&data),
            Err(Error::WrongUncompressedBlockLengths {
                length: 5,
                check: 0,
            })
        );
    }

    #[test]
    fn test_stored_blocks_chained() {
        // A non-final stored block ("He") followed by a final one ("llo").
        let data = [
            0x00, 0x02, 0x00, 0xFD, 0xFF, b'H', b'e', 0x01, 0x03, 0x00, 0xFC, 0xFF, b'l', b'l',
            b'o',
        ];
        assert_eq!(inflate_to_vec(&data).unwrap(), b"Hello");
    }

    #[test]
    fn test_fixed_huffman_single_literal() {
        // final=1, btype=01, the literal 0x00, then the end-of-block code.
        let data = [0x63, 0x00, 0x00];
        assert_eq!(inflate_to_vec(&data).unwrap(), [0x00]);
    }

    #[test]
    fn test_fixed_huffman_overlapping_back_reference() {
        // Literal 'a' followed by length=4 at distance=1: the copy reads
        // bytes it wrote itself.
        let data = [0x4B, 0x04, 0x01, 0x00];
        assert_eq!(inflate_to_vec(&data).unwrap(), b"aaaaa");
    }

    #[test]
    fn test_back_reference_before_output_start() {
        // Length=4 at distance=1 with nothing in the output yet.
        let data = [0x03, 0x01, 0x00];
        assert_eq!(
            inflate_to_vec(&data),
            Err(Error::WrongBackReference {
                distance: 1,
                available: 0,
            })
        );
    }

    #[test]
    fn test_reserved_block_type() {
        // final=1, btype=11.
        let data = [0x07];
        assert_eq!(inflate_to_vec(&data), Err(Error::WrongBlockType));
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(inflate_to_vec(&[]), Err(Error::TruncatedInput));
    }

    #[test]
    fn test_stored_block_truncated_header() {
        // The block header promises a stored block but the stream ends.
        let data = [0x01];
        assert_eq!(inflate_to_vec(&data), Err(Error::TruncatedInput));
    }

    #[test]
    fn test_stored_block_truncated_payload() {
        // len=5 but only one literal byte follows.
        let data = [0x01, 0x05, 0x00, 0xFA, 0xFF, b'H'];
        assert_eq!(inflate_to_vec(&data), Err(Error::TruncatedInput));
    }

    #[test]
    fn test_fixed_block_exhausted_mid_symbol() {
        // The fixed block's symbol stream ends before an end-of-block code.
        let data = [0x63];
        assert_eq!(inflate_to_vec(&data), Err(Error::SymbolNotFound));
    }

    /// The first 300 bytes of a lorem-ipsum text, compressed by zlib at
    /// level 9 into a single dynamic-Huffman block.
    const DYNAMIC_COMPRESSED: &[u8] = &[
        0x25, 0x8f, 0xcb, 0x6d, 0x03, 0x31, 0x0c, 0x44, 0x5b, 0x99, 0x02, 0x0c,
        0x57, 0x91, 0xa3, 0xaf, 0x29, 0x80, 0x91, 0x08, 0x67, 0x00, 0x51, 0x5a,
        0x8b, 0xa4, 0xe1, 0xf2, 0xc3, 0xcd, 0xde, 0xf8, 0x7d, 0x33, 0xf3, 0x58,
        0x5b, 0x0d, 0x3c, 0x3c, 0x0d, 0x7d, 0x8d, 0xb5, 0xe1, 0x0c, 0x88, 0x69,
        0xdc, 0xd0, 0xd6, 0x74, 0x6d, 0xa1, 0x91, 0x1b, 0xd2, 0x79, 0xd0, 0x1b,
        0xe7, 0x13, 0x3a, 0x58, 0x4b, 0xd7, 0x5e, 0x0f, 0x50, 0xa6, 0xdb, 0xea,
        0x08, 0xb5, 0xa3, 0x9e, 0x39, 0x1b, 0x3b, 0x7b, 0xce, 0x40, 0x06, 0x86,
        0xfc, 0x14, 0x1e, 0x1a, 0x17, 0x5a, 0x61, 0xf2, 0x9c, 0x02, 0x19, 0x7c,
        0xa5, 0xdc, 0xf1, 0x1d, 0xd0, 0x49, 0x2b, 0x36, 0x8c, 0x67, 0xf1, 0xae,
        0x56, 0xec, 0x86, 0x57, 0xd2, 0x31, 0x97, 0xc7, 0xce, 0x0e, 0xfd, 0xe8,
        0x6e, 0x0c, 0x09, 0xae, 0x89, 0x1c, 0x43, 0xac, 0xad, 0x8b, 0x7c, 0x1e,
        0xd1, 0x79, 0x2a, 0xfd, 0x23, 0x79, 0xd4, 0x31, 0x54, 0xca, 0xb8, 0x95,
        0xa7, 0x75, 0x05, 0x28, 0xa9, 0xb8, 0xe3, 0xeb, 0x44, 0x4a, 0x86, 0x82,
        0x3b, 0xcb, 0xc9, 0x95, 0x95, 0x13, 0x5b, 0x8f, 0xad, 0xbf, 0x3a, 0xbb,
        0xee, 0x0a, 0x5e, 0x83, 0xf7, 0x1a, 0x79, 0x94, 0x9c, 0x96, 0x9d, 0x4a,
        0x0a, 0x75, 0x57, 0x34, 0x8e, 0x91, 0x7f,
    ];

    const DYNAMIC_EXPECTED: &str = "Lorem ipsum dolor sit amet, consectetur adipiscing elit, \
        sed do eiusmod tempor incididunt ut labore et dolore magna aliqua. Ut enim ad minim \
        veniam, quis nostrud exercitation ullamco laboris nisi ut aliquip ex ea commodo \
        consequat. Duis aute irure dolor in reprehenderit in voluptate velit esse cillu";

    #[test]
    fn test_dynamic_huffman_block() {
        assert_eq!((DYNAMIC_COMPRESSED[0] >> 1) & 0b11, 0b10);
        let output = inflate_to_vec(DYNAMIC_COMPRESSED).unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), DYNAMIC_EXPECTED);
    }

    #[test]
    fn test_inflate_from_existing_reader() {
        let data = [0x63, 0x00, 0x00];
        let mut bit_reader = BitReader::new(&data, BitOrder::LsbFirst);
        assert_eq!(inflate(&mut bit_reader).unwrap(), [0x00]);
    }
}
