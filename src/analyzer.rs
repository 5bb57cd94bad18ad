use crate::xex::{
	self, EncryptionType, FileFormatInfo, OptionalHeaderScan, XexHeader, DISPLAY_HEADER_LIMIT,
};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use tracing::warn;

/// Presentation flags for a single analysis run. These only select which
/// report blocks are printed; the decode sequence itself is the same for
/// every combination.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalyzeOptions {
	pub verbose: bool,
	pub show_encryption: bool,
}

/// Analyzes one XEX file and prints the report to stdout.
///
/// Failure to open or stat the file, a truncated primary header, and a bad
/// magic number are fatal. Anything that goes wrong after the primary header
/// decoded (short optional-header table, unreachable FILE_FORMAT_INFO) is
/// logged and the rest of the report stands.
pub fn analyze_file(path: &Path, opts: &AnalyzeOptions) -> Result<()> {
	let mut file =
		File::open(path).with_context(|| format!("cannot open file {:?}", path))?;
	let size = file
		.metadata()
		.with_context(|| format!("cannot stat file {:?}", path))?
		.len();

	println!("========================================");
	println!("XEX File Analysis Tool");
	println!("========================================\n");

	println!("File: {}", path.display());
	println!("Size: {} ({} bytes)\n", format_size(size), size);

	run_analysis(&mut file, opts)
}

/// Decode sequence over an already-open byte source. Split out from
/// [`analyze_file`] so it can run against an in-memory cursor.
fn run_analysis<R: Read + Seek>(reader: &mut R, opts: &AnalyzeOptions) -> Result<()> {
	let header = xex::read_header(reader).context("cannot read XEX header")?;
	print_header(&header, opts);

	let scan = xex::scan_optional_headers(reader, header.optional_header_count);
	print_optional_headers(&header, &scan, opts);

	match scan.file_format_info_offset {
		Some(offset) => print_file_format_info(reader, offset, opts),
		None if opts.show_encryption => {
			println!("=== ENCRYPTION STATUS ===");
			println!("WARNING: FILE_FORMAT_INFO header not found");
			println!("Cannot determine encryption status");
			println!("This may be an unusual or corrupted XEX file\n");
		}
		None => {}
	}

	println!("========================================");
	println!("Analysis complete!");
	println!("========================================");

	Ok(())
}

fn print_header(header: &XexHeader, opts: &AnalyzeOptions) {
	println!("=== XEX2 Header ===");
	println!("Magic:                XEX2 (valid)");
	println!("Module Flags:         0x{:08X}", header.module_flags);
	println!("PE Offset:            0x{:08X}", header.pe_offset);
	println!("Security Offset:      0x{:08X}", header.security_offset);
	println!("Optional Header Count: {}", header.optional_header_count);

	if opts.verbose {
		println!("\nVerbose mode: ON");
	}
	println!();
}

fn print_optional_headers(header: &XexHeader, scan: &OptionalHeaderScan, opts: &AnalyzeOptions) {
	let declared = header.optional_header_count;

	if scan.skipped {
		warn!(
			declared,
			"implausible optional header count, table not scanned"
		);
		return;
	}
	if declared == 0 {
		return;
	}

	if opts.verbose || opts.show_encryption {
		println!("=== Optional Headers ===");
		for (i, entry) in scan.entries.iter().enumerate() {
			match entry.label() {
				Some(label) => println!(
					"  [{:2}] Key: 0x{:08X}  Value: 0x{:08X} ({})",
					i, entry.key, entry.value, label
				),
				None => println!(
					"  [{:2}] Key: 0x{:08X}  Value: 0x{:08X}",
					i, entry.key, entry.value
				),
			}
		}

		if opts.verbose && declared > DISPLAY_HEADER_LIMIT {
			println!("  ... ({} more headers)", declared - DISPLAY_HEADER_LIMIT);
		}
		println!();
	}

	if scan.truncated {
		warn!(
			read = scan.entries.len(),
			declared, "optional header table ends early"
		);
	}
}

fn print_file_format_info<R: Read + Seek>(reader: &mut R, offset: u32, opts: &AnalyzeOptions) {
	println!("=== FILE_FORMAT_INFO (Encryption & Compression Details) ===");

	let info = match xex::read_file_format_info(reader, offset) {
		Ok(info) => info,
		Err(err) => {
			warn!("cannot read FILE_FORMAT_INFO at offset 0x{:08X}: {}", offset, err);
			println!();
			return;
		}
	};

	println!("Info Size:         {} bytes", info.info_size);
	println!(
		"Encryption Type:   {} ({})",
		info.encryption_type,
		info.encryption()
	);
	println!(
		"Compression Type:  {} ({})",
		info.compression_type,
		info.compression()
	);

	if opts.show_encryption {
		print_encryption_status(&info);
	}
	if opts.verbose {
		print_compression_analysis(&info);
	}
	println!();
}

fn print_encryption_status(info: &FileFormatInfo) {
	println!();
	println!("*** ENCRYPTION STATUS ***");
	match info.encryption() {
		EncryptionType::None => println!("This XEX file is NOT encrypted"),
		EncryptionType::Normal => {
			println!("This XEX file IS ENCRYPTED (Normal encryption)");
			println!("Decryption required before further processing");
		}
		EncryptionType::Unknown(code) => {
			println!("This XEX file has UNKNOWN encryption type ({})", code)
		}
	}
	println!("*************************");
}

fn print_compression_analysis(info: &FileFormatInfo) {
	use crate::xex::CompressionType;

	println!("\nCompression Analysis:");
	match info.compression() {
		CompressionType::None => println!("  - File is not compressed"),
		CompressionType::Delta => {
			println!("  - WARNING: Delta compression requires base file");
			println!("  - This compression type may not be supported by all tools");
		}
		_ => println!("  - Decompression may be required before processing"),
	}
}

fn format_size(size: u64) -> String {
	if size < 1024 {
		format!("{} bytes", size)
	} else if size < 1024 * 1024 {
		format!("{:.2} KB", size as f64 / 1024.0)
	} else {
		format!("{:.2} MB", size as f64 / (1024.0 * 1024.0))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::xex::{XEX2_MAGIC, XEX_HEADER_FILE_FORMAT_INFO};
	use byteorder::{BigEndian, WriteBytesExt};
	use std::io::Cursor;

	fn xex_bytes(optional_header_count: u32, entries: &[(u32, u32)]) -> Vec<u8> {
		let mut buf = Vec::new();
		buf.write_u32::<BigEndian>(XEX2_MAGIC).unwrap();
		buf.write_u32::<BigEndian>(0x0000_0001).unwrap();
		buf.write_u32::<BigEndian>(0x0000_3000).unwrap();
		buf.write_u32::<BigEndian>(0).unwrap();
		buf.write_u32::<BigEndian>(0x0000_1800).unwrap();
		buf.write_u32::<BigEndian>(optional_header_count).unwrap();
		for &(key, value) in entries {
			buf.write_u32::<BigEndian>(key).unwrap();
			buf.write_u32::<BigEndian>(value).unwrap();
		}
		buf
	}

	#[test]
	fn analysis_succeeds_without_optional_headers() {
		let mut cur = Cursor::new(xex_bytes(0, &[]));
		let opts = AnalyzeOptions::default();
		assert!(run_analysis(&mut cur, &opts).is_ok());
	}

	#[test]
	fn analysis_succeeds_with_implausible_count() {
		let mut cur = Cursor::new(xex_bytes(150, &[]));
		let opts = AnalyzeOptions::default();
		assert!(run_analysis(&mut cur, &opts).is_ok());
	}

	#[test]
	fn analysis_fails_on_bad_magic() {
		let mut bytes = xex_bytes(0, &[]);
		bytes[0] = b'M';
		bytes[1] = b'Z';
		let mut cur = Cursor::new(bytes);
		let opts = AnalyzeOptions::default();
		assert!(run_analysis(&mut cur, &opts).is_err());
	}

	#[test]
	fn analysis_fails_on_short_header() {
		let mut cur = Cursor::new(xex_bytes(0, &[])[..12].to_vec());
		let opts = AnalyzeOptions::default();
		assert!(run_analysis(&mut cur, &opts).is_err());
	}

	#[test]
	fn unreachable_descriptor_is_non_fatal() {
		// FILE_FORMAT_INFO points far past the end of the stream
		let mut cur = Cursor::new(xex_bytes(
			1,
			&[(XEX_HEADER_FILE_FORMAT_INFO, 0x7FFF_0000)],
		));
		let opts = AnalyzeOptions {
			verbose: true,
			show_encryption: true,
		};
		assert!(run_analysis(&mut cur, &opts).is_ok());
	}

	#[test]
	fn truncated_table_is_non_fatal() {
		let mut bytes = xex_bytes(
			5,
			&[
				(0x0001_0100, 0x0001_0000),
				(0x0001_0201, 0x8200_0000),
				(0xDEAD_BEEF, 0x42),
			],
		);
		bytes.extend(&[0x00, 0x00]); // half of a fourth entry
		let mut cur = Cursor::new(bytes);
		let opts = AnalyzeOptions {
			verbose: true,
			show_encryption: false,
		};
		assert!(run_analysis(&mut cur, &opts).is_ok());
	}

	#[test]
	fn descriptor_is_decoded_when_located() {
		let mut bytes = xex_bytes(1, &[(XEX_HEADER_FILE_FORMAT_INFO, 0x40)]);
		bytes.resize(0x40, 0);
		bytes.write_u32::<BigEndian>(0x01AC).unwrap();
		bytes.write_u16::<BigEndian>(1).unwrap(); // Normal encryption
		bytes.write_u16::<BigEndian>(0).unwrap(); // no compression
		let mut cur = Cursor::new(bytes);
		let opts = AnalyzeOptions::default();
		assert!(run_analysis(&mut cur, &opts).is_ok());
	}

	#[test]
	fn formats_sizes_per_magnitude() {
		assert_eq!(format_size(512), "512 bytes");
		assert_eq!(format_size(2048), "2.00 KB");
		assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
	}
}
