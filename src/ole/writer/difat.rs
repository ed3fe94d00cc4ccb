//! DIFAT (Double Indirect FAT) generation for OLE2 files
//!
//! The header stores the first 109 FAT sector IDs. Any further FAT sectors
//! are listed in a chain of DIFAT sectors, each holding `sector_size / 4 - 1`
//! IDs followed by the ID of the next DIFAT sector.
//!
//! # Implementation Notes
//!
//! DIFAT sectors are allocated as one contiguous run, so each sector's
//! next pointer is simply the following sector. With 512-byte sectors a
//! workbook needs them only past roughly 6.8 MB.

use super::super::consts::*;

#[derive(Debug)]
pub struct DifatBuilder {
    /// FAT sector IDs beyond the first 109
    overflow_ids: Vec<u32>,
    sector_size: usize,
}

impl DifatBuilder {
    pub fn new(sector_size: usize) -> Self {
        Self {
            overflow_ids: Vec::new(),
            sector_size,
        }
    }

    /// Record the complete list of FAT sector IDs; only the overflow is kept
    pub fn set_fat_sectors(&mut self, fat_sectors: &[u32]) {
        self.overflow_ids = fat_sectors
            .get(HEADER_DIFAT_ENTRIES..)
            .map(<[u32]>::to_vec)
            .unwrap_or_default();
    }

    /// Generate the DIFAT chain
    ///
    /// # Arguments
    ///
    /// * `first_difat_sector` - Sector reserved for the first DIFAT sector;
    ///   the rest follow it contiguously
    ///
    /// # Returns
    ///
    /// One buffer per DIFAT sector, or none when the header holds every
    /// FAT sector ID
    pub fn generate_difat_sectors(&self, first_difat_sector: u32) -> Vec<Vec<u8>> {
        let ids_per_sector = (self.sector_size / 4) - 1;
        let chunks: Vec<&[u32]> = self.overflow_ids.chunks(ids_per_sector).collect();
        let count = chunks.len() as u32;

        chunks
            .into_iter()
            .enumerate()
            .map(|(idx, ids)| {
                let mut sector_data = vec![0xFFu8; self.sector_size];
                for (i, &id) in ids.iter().enumerate() {
                    sector_data[i * 4..i * 4 + 4].copy_from_slice(&id.to_le_bytes());
                }
                let next = if (idx as u32) + 1 < count {
                    first_difat_sector + idx as u32 + 1
                } else {
                    ENDOFCHAIN
                };
                let tail = self.sector_size - 4;
                sector_data[tail..].copy_from_slice(&next.to_le_bytes());
                sector_data
            })
            .collect()
    }
}
