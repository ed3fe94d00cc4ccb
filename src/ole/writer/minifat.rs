//! Mini stream packing
//!
//! Streams under the 4096-byte cutoff share one mini stream cut into
//! 64-byte mini sectors; the root entry points at it.
//!
//! # Performance
//!
//! Small streams are appended to a single growing buffer, so packing is
//! linear in their total size.

use super::super::consts::*;
use super::fat::table_sectors;

#[derive(Debug)]
pub struct MiniFatBuilder {
    /// Next-mini-sector links
    minifat: Vec<u32>,
    mini_sector_size: usize,
    /// Concatenated small streams, each padded to a mini sector boundary
    ministream_data: Vec<u8>,
}

impl MiniFatBuilder {
    pub fn new(mini_sector_size: usize) -> Self {
        Self {
            minifat: Vec::new(),
            mini_sector_size,
            ministream_data: Vec::new(),
        }
    }

    /// Append a small stream to the mini stream
    ///
    /// # Returns
    ///
    /// Its first mini sector, or `ENDOFCHAIN` for an empty stream
    pub fn allocate_mini_chain(&mut self, data: &[u8]) -> u32 {
        if data.is_empty() {
            return ENDOFCHAIN;
        }

        let num_mini_sectors = data.len().div_ceil(self.mini_sector_size) as u32;
        let start = self.minifat.len() as u32;
        let end = start + num_mini_sectors;

        self.minifat.extend(start + 1..end);
        self.minifat.push(ENDOFCHAIN);

        let padded_size = num_mini_sectors as usize * self.mini_sector_size;
        let offset = self.ministream_data.len();
        self.ministream_data.resize(offset + padded_size, 0);
        self.ministream_data[offset..offset + data.len()].copy_from_slice(data);

        start
    }

    pub fn ministream_data(&self) -> &[u8] {
        &self.ministream_data
    }

    pub fn ministream_size(&self) -> u64 {
        self.ministream_data.len() as u64
    }

    /// The MiniFAT in regular sectors
    ///
    /// # Arguments
    ///
    /// * `sector_size` - Regular sector size of the file
    ///
    /// # Returns
    ///
    /// One buffer per sector, empty when no small stream was added
    pub fn generate_minifat_sectors(&self, sector_size: usize) -> Vec<Vec<u8>> {
        table_sectors(&self.minifat, sector_size)
    }

    pub fn is_empty(&self) -> bool {
        self.minifat.is_empty()
    }
}
