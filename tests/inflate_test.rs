use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use tarflate::inflate::inflate_to_vec;

pub trait Inflate {
    fn inflate_to_vec(&self, data: &[u8]) -> Vec<u8>;
}

pub struct MinizOxideInflater;

impl Inflate for MinizOxideInflater {
    fn inflate_to_vec(&self, data: &[u8]) -> Vec<u8> {
        miniz_oxide::inflate::decompress_to_vec(data).unwrap()
    }
}

pub struct TarflateInflater;

impl Inflate for TarflateInflater {
    fn inflate_to_vec(&self, data: &[u8]) -> Vec<u8> {
        inflate_to_vec(data).unwrap()
    }
}

fn get_test_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
}

const DATA_FILES_CONFIG: &str = "manifest.json";

/// Get the data_files map in json format
fn get_data_files(file: &str) -> HashMap<String, String> {
    let data_files_path = get_test_dir().join(file);
    let data_files = fs::read_to_string(data_files_path).unwrap();
    serde_json::from_str(&data_files).unwrap()
}

/// Check one inflater against the raw file its input was compressed from.
fn test_inflater(inflater: &dyn Inflate, raw: &str, deflate: &str) {
    let raw_data = fs::read(get_test_dir().join(raw)).unwrap();
    let deflate_data = fs::read(get_test_dir().join(deflate)).unwrap();

    let decompressed_data = inflater.inflate_to_vec(&deflate_data);
    assert_eq!(decompressed_data, raw_data, "{}", deflate);
}

#[test]
fn test_miniz_oxide_inflate() {
    // Sanity-check the fixtures against the reference decoder first.
    for (raw, deflate) in get_data_files(DATA_FILES_CONFIG) {
        test_inflater(&MinizOxideInflater, &raw, &deflate);
    }
}

#[test]
fn test_tarflate_inflate() {
    // The fixture set covers stored, fixed-Huffman and dynamic-Huffman
    // blocks.
    for (raw, deflate) in get_data_files(DATA_FILES_CONFIG) {
        test_inflater(&TarflateInflater, &raw, &deflate);
    }
}

#[test]
fn test_compress_then_inflate_round_trip() {
    // Compress every raw fixture with the reference compressor and check
    // the round trip through this crate's decoder. Level 0 produces stored
    // blocks, higher levels produce Huffman blocks.
    for raw in get_data_files(DATA_FILES_CONFIG).keys() {
        let raw_data = fs::read(get_test_dir().join(raw)).unwrap();
        for level in [0, 1, 6, 9] {
            let compressed = miniz_oxide::deflate::compress_to_vec(&raw_data, level);
            let decompressed = inflate_to_vec(&compressed).unwrap();
            assert_eq!(decompressed, raw_data, "{} at level {}", raw, level);
        }
    }
}
