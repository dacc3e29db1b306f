//! # Rust implementation of DEFLATE decompression and TAR archive reading
//! This project is a toy library written in Rust for decompressing data in the DEFLATE format
//! and for walking the entries of TAR archives, including GNU long-name records and PAX
//! extended headers.
//! It is primarily intended for educational purposes, facilitating a deeper understanding of
//! the DEFLATE compression algorithm as outlined in RFC 1951 and of the POSIX `ustar` archive
//! layout.
//! By implementing this library, the goal is to gain practical experience with the intricacies
//! of bit-level decoding and container parsing, as well as to enhance Rust programming skills.
//! It is not designed for production use but serves as a hands-on learning tool to explore the
//! fundamentals of archive formats.
pub mod bit_stream;

pub mod error;

pub mod huffman;

pub mod inflate;

pub mod tar;

pub use error::{Error, Result};
