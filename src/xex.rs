//! XEX2 (Xbox 360 executable) container format structures.
//! Fields are decoded one at a time from their big-endian on-disk form,
//! so no platform-dependent struct packing is involved.

use byteorder::{BigEndian, ReadBytesExt};
use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};
use thiserror::Error;

/// "XEX2" as a big-endian 32-bit value
pub const XEX2_MAGIC: u32 = 0x5845_5832;

/// On-disk size of the primary header
pub const HEADER_SIZE: usize = 24;

/// On-disk size of one optional header entry (key + value)
pub const OPTIONAL_HEADER_SIZE: usize = 8;

/// On-disk size of the FILE_FORMAT_INFO descriptor
pub const FILE_FORMAT_INFO_SIZE: usize = 8;

/// Sanity ceiling: a count at or above this is treated as corruption
/// and the table is not scanned at all
pub const MAX_OPTIONAL_HEADERS: u32 = 100;

/// Display cap: at most this many entries are read and shown
pub const DISPLAY_HEADER_LIMIT: u32 = 20;

// Optional header keys
pub const XEX_HEADER_FILE_FORMAT_INFO: u32 = 0x0000_03FF;
pub const XEX_HEADER_ENTRY_POINT: u32 = 0x0001_0100;
pub const XEX_HEADER_IMAGE_BASE_ADDRESS: u32 = 0x0001_0201;
pub const XEX_HEADER_IMPORT_LIBRARIES: u32 = 0x0001_03FF;
pub const XEX_HEADER_DELTA_PATCH: u32 = 0x0000_05FF;

#[derive(Error, Debug)]
pub enum XexError {
	#[error("truncated input while reading {0}")]
	TruncatedInput(&'static str),

	#[error("magic number mismatch: expected 0x{expected:08X} (XEX2), got 0x{actual:08X}")]
	BadMagic { expected: u32, actual: u32 },

	#[error("cannot seek to offset 0x{0:08X}")]
	SeekError(u32),

	#[error("read error: {0}")]
	Io(#[from] io::Error),
}

fn truncated_as(err: io::Error, what: &'static str) -> XexError {
	if err.kind() == io::ErrorKind::UnexpectedEof {
		XexError::TruncatedInput(what)
	} else {
		XexError::Io(err)
	}
}

/// XEX2 primary header, host byte order. The magic field is validated
/// during decoding and not retained.
#[derive(Debug, Clone, Copy)]
pub struct XexHeader {
	pub module_flags: u32,
	pub pe_offset: u32,
	pub reserved: u32,
	pub security_offset: u32,
	pub optional_header_count: u32,
}

/// Reads and validates the primary header from the current position.
///
/// A short read fails with `TruncatedInput` before the magic is looked at,
/// and a magic mismatch fails before any other field is interpreted. The
/// offset fields are not range-checked here; whoever seeks to them deals
/// with out-of-bounds values.
pub fn read_header<R: Read>(reader: &mut R) -> Result<XexHeader, XexError> {
	let mut raw = [0u8; HEADER_SIZE];
	reader
		.read_exact(&mut raw)
		.map_err(|e| truncated_as(e, "XEX2 header"))?;

	let mut cur = &raw[..];
	let magic = cur.read_u32::<BigEndian>()?;
	if magic != XEX2_MAGIC {
		return Err(XexError::BadMagic {
			expected: XEX2_MAGIC,
			actual: magic,
		});
	}

	Ok(XexHeader {
		module_flags: cur.read_u32::<BigEndian>()?,
		pe_offset: cur.read_u32::<BigEndian>()?,
		reserved: cur.read_u32::<BigEndian>()?,
		security_offset: cur.read_u32::<BigEndian>()?,
		optional_header_count: cur.read_u32::<BigEndian>()?,
	})
}

/// One (key, value) entry from the optional header table. Whether the value
/// is an immediate scalar or a file offset depends on the key; the format
/// carries no in-band discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionalHeader {
	pub key: u32,
	pub value: u32,
}

impl OptionalHeader {
	/// Human label for well-known keys; unknown keys are valid and unlabeled.
	pub fn label(&self) -> Option<&'static str> {
		match self.key {
			XEX_HEADER_FILE_FORMAT_INFO => Some("FILE_FORMAT_INFO"),
			XEX_HEADER_ENTRY_POINT => Some("ENTRY_POINT"),
			XEX_HEADER_IMAGE_BASE_ADDRESS => Some("IMAGE_BASE_ADDRESS"),
			XEX_HEADER_IMPORT_LIBRARIES => Some("IMPORT_LIBRARIES"),
			XEX_HEADER_DELTA_PATCH => Some("DELTA_PATCH_DESCRIPTOR"),
			_ => None,
		}
	}
}

/// Result of scanning the optional header table.
#[derive(Debug, Default)]
pub struct OptionalHeaderScan {
	/// Entries actually read, in file order
	pub entries: Vec<OptionalHeader>,
	/// Declared count failed the sanity check, nothing was read
	pub skipped: bool,
	/// The stream ended before the last expected entry
	pub truncated: bool,
	/// Value of the first FILE_FORMAT_INFO entry, if any
	pub file_format_info_offset: Option<u32>,
}

fn read_optional_header<R: Read>(reader: &mut R) -> io::Result<OptionalHeader> {
	let mut raw = [0u8; OPTIONAL_HEADER_SIZE];
	reader.read_exact(&mut raw)?;
	let mut cur = &raw[..];
	Ok(OptionalHeader {
		key: cur.read_u32::<BigEndian>()?,
		value: cur.read_u32::<BigEndian>()?,
	})
}

/// Scans up to `min(declared_count, DISPLAY_HEADER_LIMIT)` optional header
/// entries from the current position (immediately after the primary header).
///
/// A declared count of zero means there is no table; a count at or above
/// `MAX_OPTIONAL_HEADERS` is treated as corruption and skipped outright,
/// since honoring it would read far past any plausible file. Running out of
/// bytes mid-table is not an error: the entries read so far are kept and the
/// scan is flagged as truncated.
pub fn scan_optional_headers<R: Read>(reader: &mut R, declared_count: u32) -> OptionalHeaderScan {
	let mut scan = OptionalHeaderScan::default();

	if declared_count == 0 {
		return scan;
	}
	if declared_count >= MAX_OPTIONAL_HEADERS {
		scan.skipped = true;
		return scan;
	}

	let limit = declared_count.min(DISPLAY_HEADER_LIMIT);
	for _ in 0..limit {
		let entry = match read_optional_header(reader) {
			Ok(entry) => entry,
			Err(_) => {
				scan.truncated = true;
				break;
			}
		};

		if entry.key == XEX_HEADER_FILE_FORMAT_INFO && scan.file_format_info_offset.is_none() {
			scan.file_format_info_offset = Some(entry.value);
		}

		scan.entries.push(entry);
	}

	scan
}

/// Encryption type codes from FILE_FORMAT_INFO
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionType {
	None,
	Normal,
	Unknown(u16),
}

impl From<u16> for EncryptionType {
	fn from(code: u16) -> Self {
		match code {
			0 => EncryptionType::None,
			1 => EncryptionType::Normal,
			other => EncryptionType::Unknown(other),
		}
	}
}

impl fmt::Display for EncryptionType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			EncryptionType::None => write!(f, "None"),
			EncryptionType::Normal => write!(f, "Normal (Encrypted)"),
			EncryptionType::Unknown(_) => write!(f, "Unknown"),
		}
	}
}

/// Compression type codes from FILE_FORMAT_INFO
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
	None,
	Basic,
	Normal,
	Delta,
	Unknown(u16),
}

impl From<u16> for CompressionType {
	fn from(code: u16) -> Self {
		match code {
			0 => CompressionType::None,
			1 => CompressionType::Basic,
			2 => CompressionType::Normal,
			3 => CompressionType::Delta,
			other => CompressionType::Unknown(other),
		}
	}
}

impl fmt::Display for CompressionType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			CompressionType::None => write!(f, "None"),
			CompressionType::Basic => write!(f, "Basic"),
			CompressionType::Normal => write!(f, "Normal"),
			CompressionType::Delta => write!(f, "Delta"),
			CompressionType::Unknown(_) => write!(f, "Unknown"),
		}
	}
}

/// FILE_FORMAT_INFO descriptor, host byte order. Type fields are kept raw;
/// unrecognized codes classify as `Unknown` for display, never rejected.
#[derive(Debug, Clone, Copy)]
pub struct FileFormatInfo {
	pub info_size: u32,
	pub encryption_type: u16,
	pub compression_type: u16,
}

impl FileFormatInfo {
	pub fn encryption(&self) -> EncryptionType {
		EncryptionType::from(self.encryption_type)
	}

	pub fn compression(&self) -> CompressionType {
		CompressionType::from(self.compression_type)
	}
}

/// Seeks to `offset` and reads the FILE_FORMAT_INFO descriptor.
pub fn read_file_format_info<R: Read + Seek>(
	reader: &mut R,
	offset: u32,
) -> Result<FileFormatInfo, XexError> {
	reader
		.seek(SeekFrom::Start(offset as u64))
		.map_err(|_| XexError::SeekError(offset))?;

	let mut raw = [0u8; FILE_FORMAT_INFO_SIZE];
	reader
		.read_exact(&mut raw)
		.map_err(|e| truncated_as(e, "FILE_FORMAT_INFO"))?;

	let mut cur = &raw[..];
	Ok(FileFormatInfo {
		info_size: cur.read_u32::<BigEndian>()?,
		encryption_type: cur.read_u16::<BigEndian>()?,
		compression_type: cur.read_u16::<BigEndian>()?,
	})
}
