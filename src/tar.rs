//! Walk TAR archives held in memory.
//!
//! The walker understands the POSIX `ustar` record layout, GNU long-name
//! records (`K`/`L` type flags) and PAX extended headers (`x` local and `g`
//! global). Continuation records are consumed to resolve the members they
//! describe and never show up in the walker's output.

use std::collections::HashMap;

use log::trace;

use crate::bit_stream::{BitOrder, BitReader};
use crate::error::{Error, Result};

/// Archives are made of 512-byte records.
const RECORD_SIZE: usize = 512;

// ustar header field widths, in field order.
const NAME_LEN: usize = 100;
const MODE_LEN: usize = 8;
const UID_LEN: usize = 8;
const GID_LEN: usize = 8;
const SIZE_LEN: usize = 12;
const MTIME_LEN: usize = 12;
const CHECKSUM_LEN: usize = 8;
const LINK_NAME_LEN: usize = 100;
const MAGIC_LEN: usize = 6;
const VERSION_LEN: usize = 2;
const UNAME_LEN: usize = 32;
const GNAME_LEN: usize = 32;
const DEV_LEN: usize = 8;
const PREFIX_LEN: usize = 155;

/// Offsets of the fields that are inspected before a full header parse.
const SIZE_OFFSET: usize = 124;
const CHECKSUM_OFFSET: usize = 148;
const TYPE_FLAG_OFFSET: usize = 156;

/// Magic of a POSIX `ustar` header. GNU writes `"ustar "` instead and
/// reuses the prefix area for other data, so the prefix field only
/// participates in name resolution under this magic.
const POSIX_MAGIC: &[u8] = b"ustar\0";

/// Round up to the next multiple of the record size.
fn round_to_512(n: usize) -> usize {
    ((n + (RECORD_SIZE - 1)) / RECORD_SIZE) * RECORD_SIZE
}

/// The kind of archive member a header's type flag announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFlag {
    Regular,
    HardLink,
    SymbolicLink,
    CharacterSpecial,
    BlockSpecial,
    Directory,
    Fifo,
    Contiguous,
    /// PAX extended header applying to the next member only (`'x'`).
    LocalExtendedHeader,
    /// PAX extended header applying to all following members (`'g'`).
    GlobalExtendedHeader,
    /// GNU long link name continuation (`'K'`).
    GnuLongLinkName,
    /// GNU long name continuation (`'L'`).
    GnuLongName,
    Other(u8),
}

impl TypeFlag {
    fn from_byte(byte: u8) -> Self {
        match byte {
            0 | b'0' => Self::Regular,
            b'1' => Self::HardLink,
            b'2' => Self::SymbolicLink,
            b'3' => Self::CharacterSpecial,
            b'4' => Self::BlockSpecial,
            b'5' => Self::Directory,
            b'6' => Self::Fifo,
            b'7' => Self::Contiguous,
            b'x' => Self::LocalExtendedHeader,
            b'g' => Self::GlobalExtendedHeader,
            b'K' => Self::GnuLongLinkName,
            b'L' => Self::GnuLongName,
            other => Self::Other(other),
        }
    }

    /// The raw flag byte. Regular files report `'0'` even when the header
    /// carried the old NUL spelling.
    pub fn as_byte(&self) -> u8 {
        match self {
            Self::Regular => b'0',
            Self::HardLink => b'1',
            Self::SymbolicLink => b'2',
            Self::CharacterSpecial => b'3',
            Self::BlockSpecial => b'4',
            Self::Directory => b'5',
            Self::Fifo => b'6',
            Self::Contiguous => b'7',
            Self::LocalExtendedHeader => b'x',
            Self::GlobalExtendedHeader => b'g',
            Self::GnuLongLinkName => b'K',
            Self::GnuLongName => b'L',
            Self::Other(byte) => *byte,
        }
    }
}

/// Key-value overlay parsed from a PAX extended header body.
type ExtendedHeader = HashMap<String, String>;

/// Overlay state a header is resolved against.
#[derive(Default)]
struct Overlays<'a> {
    global: Option<&'a ExtendedHeader>,
    local: Option<&'a ExtendedHeader>,
    long_name: Option<&'a str>,
    long_link_name: Option<&'a str>,
}

impl Overlays<'_> {
    /// No overlay at all; extended headers themselves are parsed this way.
    fn none() -> Self {
        Self::default()
    }
}

/// Fully-resolved metadata of one archive member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TarEntryInfo {
    pub name: String,
    pub link_name: String,
    pub size: usize,
    pub type_flag: TypeFlag,
    pub mode: u32,
    pub uid: u64,
    pub gid: u64,
    pub mtime: i64,
    pub uname: String,
    pub gname: String,
    pub dev_major: u64,
    pub dev_minor: u64,
    /// Byte offset of the member's header record within the archive.
    pub block_start_index: usize,
    pub is_global_extended_header: bool,
    pub is_local_extended_header: bool,
}

impl TarEntryInfo {
    /// Parse one 512-byte header record and resolve it against the overlay
    /// state. The reader must sit on the first byte of the record; it is
    /// advanced past the whole record.
    ///
    /// Resolution precedence for names, highest first: local PAX
    /// `path`/`linkpath`, then the GNU long-name bodies, then global PAX,
    /// then the `prefix`/`name` fields of the record itself.
    fn parse(reader: &mut BitReader, overlays: &Overlays) -> Result<Self> {
        let block_start_index = reader.byte_position();
        let record = reader
            .try_peek_aligned_bytes(RECORD_SIZE)
            .ok_or(Error::TruncatedInput)?;

        let name = reader.read_null_ended_ascii(NAME_LEN);
        let mut mode = parse_octal(&reader.read_null_space_ended_ascii(MODE_LEN), "mode")? as u32;
        let mut uid = parse_octal(&reader.read_null_space_ended_ascii(UID_LEN), "uid")?;
        let mut gid = parse_octal(&reader.read_null_space_ended_ascii(GID_LEN), "gid")?;
        let mut size =
            parse_octal(&reader.read_null_space_ended_ascii(SIZE_LEN), "size")? as usize;
        let mut mtime =
            parse_octal(&reader.read_null_space_ended_ascii(MTIME_LEN), "mtime")? as i64;
        let checksum = parse_octal(
            &reader.read_null_space_ended_ascii(CHECKSUM_LEN),
            "checksum",
        )?;
        verify_checksum(record, checksum)?;
        let type_flag = TypeFlag::from_byte(reader.read_aligned_byte());
        let link_name_field = reader.read_null_ended_ascii(LINK_NAME_LEN);
        let magic = reader.read_aligned_bytes(MAGIC_LEN);
        let _version = reader.read_aligned_bytes(VERSION_LEN);
        let mut uname = reader.read_null_ended_ascii(UNAME_LEN);
        let mut gname = reader.read_null_ended_ascii(GNAME_LEN);
        let dev_major = parse_octal(&reader.read_null_space_ended_ascii(DEV_LEN), "devmajor")?;
        let dev_minor = parse_octal(&reader.read_null_space_ended_ascii(DEV_LEN), "devminor")?;
        let prefix = reader.read_null_ended_ascii(PREFIX_LEN);
        // Padding up to the record boundary.
        reader.advance((RECORD_SIZE - (reader.byte_position() - block_start_index)) * 8);

        // Name resolution, applied lowest precedence first.
        let mut resolved_name = if !prefix.is_empty() && magic == POSIX_MAGIC {
            format!("{}/{}", prefix, name)
        } else {
            name
        };
        if let Some(value) = lookup(overlays.global, "path") {
            resolved_name = value.clone();
        }
        if let Some(value) = overlays.long_name {
            resolved_name = value.to_string();
        }
        if let Some(value) = lookup(overlays.local, "path") {
            resolved_name = value.clone();
        }

        let mut link_name = link_name_field;
        if let Some(value) = lookup(overlays.global, "linkpath") {
            link_name = value.clone();
        }
        if let Some(value) = overlays.long_link_name {
            link_name = value.to_string();
        }
        if let Some(value) = lookup(overlays.local, "linkpath") {
            link_name = value.clone();
        }

        // Numeric and ownership overrides; PAX values are decimal, except
        // mode which mirrors the octal field it replaces.
        for overlay in [overlays.global, overlays.local] {
            if let Some(value) = lookup(overlay, "size") {
                size = parse_decimal(value, "size")? as usize;
            }
            if let Some(value) = lookup(overlay, "mode") {
                mode = parse_octal(value, "mode")? as u32;
            }
            if let Some(value) = lookup(overlay, "uid") {
                uid = parse_decimal(value, "uid")?;
            }
            if let Some(value) = lookup(overlay, "gid") {
                gid = parse_decimal(value, "gid")?;
            }
            if let Some(value) = lookup(overlay, "mtime") {
                mtime = parse_decimal_seconds(value)?;
            }
            if let Some(value) = lookup(overlay, "uname") {
                uname = value.clone();
            }
            if let Some(value) = lookup(overlay, "gname") {
                gname = value.clone();
            }
        }

        Ok(Self {
            name: resolved_name,
            link_name,
            size,
            type_flag,
            mode,
            uid,
            gid,
            mtime,
            uname,
            gname,
            dev_major,
            dev_minor,
            block_start_index,
            is_global_extended_header: type_flag == TypeFlag::GlobalExtendedHeader,
            is_local_extended_header: type_flag == TypeFlag::LocalExtendedHeader,
        })
    }
}

fn lookup<'m>(overlay: Option<&'m ExtendedHeader>, key: &str) -> Option<&'m String> {
    overlay.and_then(|map| map.get(key))
}

/// Parse a null/space-terminated ASCII octal field. An empty field reads as
/// zero: writers leave optional fields blank.
fn parse_octal(field: &str, name: &'static str) -> Result<u64> {
    let digits = field.trim_matches(' ');
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 8).map_err(|_| Error::FieldIsNotNumber(name))
}

/// Parse a decimal PAX override value.
fn parse_decimal(value: &str, name: &'static str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::FieldIsNotNumber(name))
}

/// Parse a PAX `mtime` value. The format allows fractional seconds; the
/// fraction is dropped.
fn parse_decimal_seconds(value: &str) -> Result<i64> {
    value
        .trim()
        .parse::<f64>()
        .map(|seconds| seconds as i64)
        .map_err(|_| Error::FieldIsNotNumber("mtime"))
}

/// Validate the header checksum: the sum of all record bytes with the
/// checksum field itself read as spaces. Some historical writers summed the
/// bytes as signed values; both sums are accepted.
fn verify_checksum(record: &[u8], stored: u64) -> Result<()> {
    let mut unsigned: u64 = 0;
    let mut signed: i64 = 0;
    for (index, &byte) in record.iter().enumerate() {
        let byte = if (CHECKSUM_OFFSET..CHECKSUM_OFFSET + CHECKSUM_LEN).contains(&index) {
            b' '
        } else {
            byte
        };
        unsigned += byte as u64;
        signed += byte as i8 as i64;
    }
    if unsigned == stored || signed == stored as i64 {
        Ok(())
    } else {
        Err(Error::WrongHeaderCrc)
    }
}

/// Parse a PAX extended header body.
///
/// The body is a run of records of the form `"<len> <key>=<value>\n"`,
/// where `<len>` is the decimal byte length of the whole record, length
/// digits and trailing newline included. Because records are
/// length-delimited, values may contain `=` and newlines.
fn parse_pax_records(body: &[u8]) -> Result<ExtendedHeader> {
    let mut records = ExtendedHeader::new();
    let mut index = 0;
    while index < body.len() {
        if body[index] == 0 {
            // NUL padding after the last record.
            break;
        }
        let rest = &body[index..];
        let space = rest
            .iter()
            .position(|&byte| byte == b' ')
            .ok_or(Error::WrongPaxHeaderEntry)?;
        let digits =
            std::str::from_utf8(&rest[..space]).map_err(|_| Error::WrongPaxHeaderEntry)?;
        let record_len: usize = digits
            .parse()
            .map_err(|_| Error::FieldIsNotNumber("extended header record length"))?;
        if record_len <= space + 1 || record_len > rest.len() {
            return Err(Error::WrongPaxHeaderEntry);
        }
        let content = &rest[space + 1..record_len];
        if content.last() != Some(&b'\n') {
            return Err(Error::WrongPaxHeaderEntry);
        }
        let text = std::str::from_utf8(&content[..content.len() - 1])
            .map_err(|_| Error::WrongPaxHeaderEntry)?;
        let (key, value) = text.split_once('=').ok_or(Error::WrongPaxHeaderEntry)?;
        records.insert(key.to_string(), value.to_string());
        index += record_len;
    }
    Ok(records)
}

/// One archive member: resolved metadata plus a borrowed view of its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TarEntry<'a> {
    pub info: TarEntryInfo,
    pub data: &'a [u8],
}

/// Walk the archive and collect every member.
///
/// Extended headers and GNU long-name continuations are consumed while
/// resolving the members that follow them; only real members are returned.
/// Member data borrows from `data`, so the result must not outlive it.
pub fn list_entries(data: &[u8]) -> Result<Vec<TarEntry<'_>>> {
    if data.len() < RECORD_SIZE {
        return Err(Error::TooSmallFileIsPassed);
    }

    let mut reader = BitReader::new(data, BitOrder::LsbFirst);
    let mut entries = Vec::new();
    let mut global_extended: Option<ExtendedHeader> = None;
    let mut local_extended: Option<ExtendedHeader> = None;
    let mut long_name: Option<String> = None;
    let mut long_link_name: Option<String> = None;

    loop {
        let base = reader.byte_position();
        let remaining = data.len() - base;
        if remaining < RECORD_SIZE {
            break;
        }
        // Two zero records terminate the archive. A truncated terminator is
        // accepted as well.
        let lookahead = &data[base..base + remaining.min(2 * RECORD_SIZE)];
        if lookahead.iter().all(|&byte| byte == 0) {
            break;
        }

        let type_flag = TypeFlag::from_byte(data[base + TYPE_FLAG_OFFSET]);
        trace!("record at {}: type flag {:?}", base, type_flag);

        if matches!(type_flag, TypeFlag::GnuLongName | TypeFlag::GnuLongLinkName) {
            // The record body holds a single null-terminated path that
            // overrides the next member's name or link name.
            let record = &data[base..base + RECORD_SIZE];
            let mut size_reader =
                BitReader::new(&record[SIZE_OFFSET..SIZE_OFFSET + SIZE_LEN], BitOrder::LsbFirst);
            let size = parse_octal(&size_reader.read_null_space_ended_ascii(SIZE_LEN), "size")?
                as usize;
            let body_start = base + RECORD_SIZE;
            let body_end = body_start.checked_add(size).ok_or(Error::TruncatedInput)?;
            let body = data.get(body_start..body_end).ok_or(Error::TruncatedInput)?;
            let mut body_reader = BitReader::new(body, BitOrder::LsbFirst);
            let path = body_reader.read_null_ended_ascii(size);
            match type_flag {
                TypeFlag::GnuLongName => long_name = Some(path),
                _ => long_link_name = Some(path),
            }
            advance_to(&mut reader, body_start + round_to_512(size), data.len());
            continue;
        }

        // An extended header's own record takes no overlay: its body
        // applies to the members that follow, not to itself.
        let overlays = if matches!(
            type_flag,
            TypeFlag::LocalExtendedHeader | TypeFlag::GlobalExtendedHeader
        ) {
            Overlays::none()
        } else {
            Overlays {
                global: global_extended.as_ref(),
                local: local_extended.as_ref(),
                long_name: long_name.as_deref(),
                long_link_name: long_link_name.as_deref(),
            }
        };
        let info = TarEntryInfo::parse(&mut reader, &overlays)?;
        let data_start = base + RECORD_SIZE;
        let data_end = data_start
            .checked_add(info.size)
            .ok_or(Error::TruncatedInput)?;
        let entry_data = data.get(data_start..data_end).ok_or(Error::TruncatedInput)?;
        advance_to(&mut reader, data_start + round_to_512(info.size), data.len());

        if info.is_global_extended_header {
            global_extended = Some(parse_pax_records(entry_data)?);
        } else if info.is_local_extended_header {
            local_extended = Some(parse_pax_records(entry_data)?);
        } else {
            trace!("entry {:?} ({} bytes)", info.name, info.size);
            entries.push(TarEntry {
                info,
                data: entry_data,
            });
            local_extended = None;
            long_name = None;
            long_link_name = None;
        }
    }

    Ok(entries)
}

/// Advance the reader to an absolute byte offset, clamped to the end of the
/// data: the last member of an archive may omit its zero padding.
fn advance_to(reader: &mut BitReader, target: usize, len: usize) {
    let target = target.min(len);
    reader.advance((target - reader.byte_position()) * 8);
}
