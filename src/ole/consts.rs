//! Compound file format constants

/// File signature, the first 8 bytes of every compound file
pub const MAGIC: &[u8; 8] = b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1";

/// Header plus one FAT sector and one directory sector at 512 bytes each
pub const MINIMAL_OLEFILE_SIZE: usize = 3 * 512;

/// Bytes per directory entry
pub const DIRENTRY_SIZE: usize = 128;

/// FAT locations that fit in the header itself
pub const HEADER_DIFAT_ENTRIES: usize = 109;

// Reserved sector numbers. Regular sectors are numbered from 0 up to
// 0xFFFFFFFA.

/// FAT entry of a sector holding DIFAT data
pub const DIFSECT: u32 = 0xFFFF_FFFC;
/// FAT entry of a sector holding FAT data
pub const FATSECT: u32 = 0xFFFF_FFFD;
/// Terminates a sector chain
pub const ENDOFCHAIN: u32 = 0xFFFF_FFFE;
/// Sector not in use
pub const FREESECT: u32 = 0xFFFF_FFFF;

/// Empty sibling or child link in the directory tree
pub const NOSTREAM: u32 = 0xFFFF_FFFF;

// Directory entry object types

pub const STGTY_STORAGE: u8 = 1;
pub const STGTY_STREAM: u8 = 2;
pub const STGTY_ROOT: u8 = 5;
