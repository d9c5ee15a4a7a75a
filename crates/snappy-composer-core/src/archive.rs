//! In-memory ustar writer restricted to regular files.
//!
//! Each entry is a 512 byte header followed by the file contents padded with
//! zeros to the next 512 byte boundary. Two zero blocks close the archive.

use std::fs::File;
use std::io::Read;
use std::ops::Range;
use std::path::Path;

use crate::error::Error;

pub const BLOCK_SIZE: usize = 512;
/// Two zero blocks mark the end of the archive.
pub const END_MARKER_LEN: usize = 2 * BLOCK_SIZE;

const INITIAL_CAPACITY: usize = 1024 * 1024;

pub const NAME: Range<usize> = 0..100;
pub const MODE: Range<usize> = 100..108;
pub const UID: Range<usize> = 108..116;
pub const GID: Range<usize> = 116..124;
pub const SIZE: Range<usize> = 124..136;
pub const MTIME: Range<usize> = 136..148;
pub const CHECKSUM: Range<usize> = 148..156;
pub const TYPEFLAG: usize = 156;
pub const LINKNAME: Range<usize> = 157..257;
pub const MAGIC: Range<usize> = 257..263;
pub const VERSION: Range<usize> = 263..265;
pub const UNAME: Range<usize> = 265..297;
pub const GNAME: Range<usize> = 297..329;
pub const DEVMAJOR: Range<usize> = 329..337;
pub const DEVMINOR: Range<usize> = 337..345;
pub const PREFIX: Range<usize> = 345..500;

const REGULAR_FILE: u8 = b'0';

pub type Header = [u8; BLOCK_SIZE];

/// Appends entries to a growing buffer. Building is all-or-nothing per file:
/// a file that cannot be read leaves the buffer untouched.
pub struct TarBuilder {
    buffer: Vec<u8>,
    mtime: Option<u64>,
}

impl Default for TarBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TarBuilder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(INITIAL_CAPACITY),
            mtime: None,
        }
    }

    /// Stamp every header with `mtime` instead of the time of archival.
    pub fn with_mtime(mut self, mtime: u64) -> Self {
        self.mtime = Some(mtime);
        self
    }

    /// Read `path` fully and append it under its base name.
    pub fn add_file(&mut self, path: &Path) -> Result<(), Error> {
        let data = read_file(path).map_err(|source| Error::Archive {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.add_entry(&name, &data)
    }

    pub fn add_entry(&mut self, name: &str, data: &[u8]) -> Result<(), Error> {
        let mtime = self.mtime.unwrap_or_else(now_epoch_secs);
        let header = build_header(name, data.len() as u64, mtime)?;
        self.buffer.extend_from_slice(&header);
        self.buffer.extend_from_slice(data);
        let padding = padding_len(data.len());
        self.buffer.resize(self.buffer.len() + padding, 0);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Append the end-of-archive marker and hand over the bytes.
    pub fn finish(mut self) -> Vec<u8> {
        self.buffer.resize(self.buffer.len() + END_MARKER_LEN, 0);
        self.buffer
    }
}

/// Zero bytes needed after `len` bytes of content to reach a block boundary.
pub fn padding_len(len: usize) -> usize {
    (BLOCK_SIZE - len % BLOCK_SIZE) % BLOCK_SIZE
}

pub fn build_header(name: &str, size: u64, mtime: u64) -> Result<Header, Error> {
    let mut header = [0u8; BLOCK_SIZE];

    // Last byte of the name field stays NUL.
    let name = name.as_bytes();
    let name_len = name.len().min(NAME.len() - 1);
    header[NAME.start..NAME.start + name_len].copy_from_slice(&name[..name_len]);

    put_str(&mut header, MODE, "000644 ");
    put_str(&mut header, UID, "000000 ");
    put_str(&mut header, GID, "000000 ");
    put_octal(&mut header, SIZE, size)?;
    put_octal(&mut header, MTIME, mtime)?;
    header[TYPEFLAG] = REGULAR_FILE;
    put_str(&mut header, MAGIC, "ustar");
    put_str(&mut header, VERSION, "00");
    put_str(&mut header, UNAME, "user");
    put_str(&mut header, GNAME, "group");

    let sum = header_checksum(&header);
    let digits = format!("{:06o}", sum);
    header[CHECKSUM.start..CHECKSUM.start + 6].copy_from_slice(digits.as_bytes());
    header[CHECKSUM.start + 6] = 0;
    header[CHECKSUM.start + 7] = b' ';

    Ok(header)
}

/// Unsigned byte sum with the checksum field counted as spaces.
pub fn header_checksum(header: &Header) -> u32 {
    header
        .iter()
        .enumerate()
        .map(|(i, &b)| if CHECKSUM.contains(&i) { b' ' } else { b })
        .map(u32::from)
        .sum()
}

/// Decode a NUL or space terminated octal field.
pub fn parse_octal(field: &[u8]) -> Option<u64> {
    let digits: &[u8] = match field.iter().position(|&b| b == 0 || b == b' ') {
        Some(end) => &field[..end],
        None => field,
    };
    let text = std::str::from_utf8(digits).ok()?;
    u64::from_str_radix(text, 8).ok()
}

fn put_str(header: &mut Header, field: Range<usize>, value: &str) {
    let bytes = value.as_bytes();
    header[field.start..field.start + bytes.len()].copy_from_slice(bytes);
}

/// Zero padded octal filling all but the last byte of the field, which stays NUL.
fn put_octal(header: &mut Header, field: Range<usize>, value: u64) -> Result<(), Error> {
    let width = field.len() - 1;
    let digits = format!("{:0width$o}", value, width = width);
    if digits.len() > width {
        return Err(Error::Other(format!(
            "value {} does not fit in a {} digit octal field",
            value, width
        )));
    }
    put_str(header, field, &digits);
    Ok(())
}

fn read_file(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut f = File::open(path)?;
    let mut buffer = Vec::new();
    f.read_to_end(&mut buffer)?;
    Ok(buffer)
}

fn now_epoch_secs() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}
