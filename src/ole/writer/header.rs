//! Compound file header
//!
//! Generates the 512-byte header: signature, version, sector shifts and
//! the locations of the directory, MiniFAT, DIFAT and first 109 FAT sectors.

use super::super::consts::*;

const MINOR_VERSION: u16 = 0x003E;
const BYTE_ORDER_MARK: u16 = 0xFFFE;
const MINI_SECTOR_SHIFT: u16 = 6;
const MINI_STREAM_CUTOFF: u32 = 4096;

/// Header fields chosen by the writer
///
/// Everything not stored here (signature, versions, shifts, cutoff) is
/// derived from the sector size.
#[derive(Debug, Clone)]
pub struct Header {
    /// 512 or 4096
    pub sector_size: usize,
    pub first_dir_sector: u32,
    pub dir_sector_count: u32,
    pub first_minifat_sector: u32,
    pub minifat_sector_count: u32,
    pub first_difat_sector: u32,
    pub difat_sector_count: u32,
    /// Every FAT sector; the first 109 are listed in the header
    pub fat_sectors: Vec<u32>,
}

impl Header {
    pub fn new(sector_size: usize) -> Self {
        Header {
            sector_size,
            first_dir_sector: 0,
            dir_sector_count: 0,
            first_minifat_sector: ENDOFCHAIN,
            minifat_sector_count: 0,
            first_difat_sector: ENDOFCHAIN,
            difat_sector_count: 0,
            fat_sectors: Vec::new(),
        }
    }

    /// Encode the header, zero-padded to one full sector
    ///
    /// # Returns
    ///
    /// `sector_size` bytes: 512 for version 3 files, 4096 for version 4
    pub fn encode(&self) -> Vec<u8> {
        let (major_version, sector_shift) = match self.sector_size {
            512 => (3u16, 9u16),
            _ => (4u16, 12u16),
        };
        // Version 3 files must leave the directory sector count at zero
        let dir_sectors = if major_version == 3 { 0 } else { self.dir_sector_count };

        let mut out = Vec::with_capacity(self.sector_size);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&[0u8; 16]);
        for word in [
            MINOR_VERSION,
            major_version,
            BYTE_ORDER_MARK,
            sector_shift,
            MINI_SECTOR_SHIFT,
        ] {
            out.extend_from_slice(&word.to_le_bytes());
        }
        out.extend_from_slice(&[0u8; 6]);
        for dword in [
            dir_sectors,
            self.fat_sectors.len() as u32,
            self.first_dir_sector,
            0,
            MINI_STREAM_CUTOFF,
            self.first_minifat_sector,
            self.minifat_sector_count,
            self.first_difat_sector,
            self.difat_sector_count,
        ] {
            out.extend_from_slice(&dword.to_le_bytes());
        }
        let listed = self.fat_sectors.iter().copied().chain(std::iter::repeat(FREESECT));
        for sector in listed.take(HEADER_DIFAT_ENTRIES) {
            out.extend_from_slice(&sector.to_le_bytes());
        }

        out.resize(self.sector_size, 0);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::binary::{read_u16_le, read_u32_le};

    #[test]
    fn test_encodes_512_byte_header() {
        let mut header = Header::new(512);
        header.first_dir_sector = 10;
        header.dir_sector_count = 4;
        header.fat_sectors = vec![1, 2, 3];

        let bytes = header.encode();
        assert_eq!(bytes.len(), 512);
        assert_eq!(&bytes[0..8], MAGIC);
        assert_eq!(read_u16_le(&bytes, 0x1C).unwrap(), 0xFFFE);
        assert_eq!(read_u32_le(&bytes, 0x28).unwrap(), 0);
        assert_eq!(read_u32_le(&bytes, 0x2C).unwrap(), 3);
        assert_eq!(read_u32_le(&bytes, 0x30).unwrap(), 10);
        assert_eq!(read_u32_le(&bytes, 0x3C).unwrap(), ENDOFCHAIN);
        assert_eq!(read_u32_le(&bytes, 0x4C + 8).unwrap(), 3);
        assert_eq!(read_u32_le(&bytes, 0x4C + 12).unwrap(), FREESECT);
        assert_eq!(read_u32_le(&bytes, 508).unwrap(), FREESECT);
    }

    #[test]
    fn test_encodes_4096_byte_header() {
        let mut header = Header::new(4096);
        header.dir_sector_count = 2;
        let bytes = header.encode();

        assert_eq!(bytes.len(), 4096);
        assert_eq!(read_u16_le(&bytes, 0x1A).unwrap(), 4);
        assert_eq!(read_u16_le(&bytes, 0x1E).unwrap(), 12);
        assert_eq!(read_u32_le(&bytes, 0x28).unwrap(), 2);
        assert!(bytes[512..].iter().all(|&b| b == 0));
    }
}
