//! Compound file layout and serialization
//!
//! # Implementation Notes
//!
//! Layout happens in one pass over the pending streams: large streams,
//! then the mini stream, the directory, the MiniFAT and finally the
//! DIFAT and FAT sectors. The FAT has to cover its own sectors, so its
//! size is found by iterating until the FAT and DIFAT counts stop changing.

use super::super::consts::*;
use super::super::file::OleError;
use super::difat::DifatBuilder;
use super::directory::DirectoryBuilder;
use super::fat::FatBuilder;
use super::header::Header;
use super::minifat::MiniFatBuilder;
use std::io::{Seek, SeekFrom, Write};

/// Stream path and contents in insertion order
type PendingStream = (Vec<String>, Vec<u8>);

/// Compound file writer
///
/// Streams and storages are collected in memory and laid out by
/// [`OleWriter::write_to`]. Regular sectors are handed out to large streams
/// in insertion order, so the first large stream added (a workbook's
/// `Workbook` stream) starts at sector 0. Directory order is independent of
/// that: siblings are sorted by name length, then case-insensitively.
///
/// No timestamps are written, so equal input gives equal bytes.
///
/// # Example
///
/// ```rust
/// use xlsplit::ole::writer::OleWriter;
///
/// let mut writer = OleWriter::new();
/// writer.create_stream(&["Workbook"], &[0u8; 8192])?;
/// writer.create_stream(&["\u{5}SummaryInformation"], b"props")?;
/// let bytes = writer.to_bytes()?;
/// assert!(xlsplit::ole::is_ole_file(&bytes));
/// # Ok::<(), xlsplit::ole::OleError>(())
/// ```
pub struct OleWriter {
    sector_size: usize,
    mini_sector_size: usize,
    /// Streams smaller than this go into the mini stream
    mini_stream_cutoff: usize,
    root_clsid: [u8; 16],
    streams: Vec<PendingStream>,
    /// Explicit storages in insertion order, without duplicates
    storages: Vec<Vec<String>>,
}

impl OleWriter {
    /// Empty writer using 512-byte sectors
    pub fn new() -> Self {
        Self {
            sector_size: 512,
            mini_sector_size: 64,
            mini_stream_cutoff: 4096,
            root_clsid: [0; 16],
            streams: Vec::new(),
            storages: Vec::new(),
        }
    }

    /// Empty writer using 512 or 4096-byte sectors
    pub fn with_sector_size(sector_size: usize) -> Result<Self, OleError> {
        if sector_size != 512 && sector_size != 4096 {
            return Err(OleError::InvalidData(format!(
                "Sector size must be 512 or 4096, got {}",
                sector_size
            )));
        }
        Ok(Self {
            sector_size,
            ..Self::new()
        })
    }

    /// Class of the root storage
    ///
    /// Excel 97-2003 workbooks carry `{00020820-0000-0000-C000-000000000046}`.
    pub fn set_root_clsid(&mut self, clsid: [u8; 16]) {
        self.root_clsid = clsid;
    }

    /// Add a stream, or replace the contents of an existing one
    ///
    /// A replaced stream keeps its place in the allocation order.
    ///
    /// # Arguments
    ///
    /// * `path` - Storage names followed by the stream name
    /// * `data` - Stream contents
    pub fn create_stream(&mut self, path: &[&str], data: &[u8]) -> Result<(), OleError> {
        let owned_path = owned_path(path)?;

        if let Some(slot) = self.streams.iter_mut().find(|(p, _)| p == &owned_path) {
            slot.1 = data.to_vec();
        } else {
            self.streams.push((owned_path, data.to_vec()));
        }

        Ok(())
    }

    /// Add an empty storage; missing parents are created on write
    ///
    /// # Arguments
    ///
    /// * `path` - Storage names from the root down
    ///
    /// # Returns
    ///
    /// An error for an empty path or a name over 31 UTF-16 units
    pub fn create_storage(&mut self, path: &[&str]) -> Result<(), OleError> {
        let owned_path = owned_path(path)?;
        if !self.storages.contains(&owned_path) {
            self.storages.push(owned_path);
        }
        Ok(())
    }

    /// Write the compound file to `writer`
    ///
    /// Sectors are assigned in this order: large streams, the mini stream,
    /// the directory, the MiniFAT, DIFAT sectors, FAT sectors.
    ///
    /// # Arguments
    ///
    /// * `writer` - Destination; sectors are written by seeking to their
    ///   offsets, so it must start empty
    ///
    /// # Returns
    ///
    /// An I/O error from `writer`, or `InvalidData` if the sector table
    /// fails its consistency check
    ///
    /// # Performance
    ///
    /// Each sector is written exactly once. Large streams are written
    /// straight from the writer's own copies; the mini stream and the
    /// tables are assembled in temporary buffers first.
    pub fn write_to<W: Write + Seek>(&self, writer: &mut W) -> Result<(), OleError> {
        let mut fat = FatBuilder::new(self.sector_size);
        let mut minifat = MiniFatBuilder::new(self.mini_sector_size);

        let (small, large): (Vec<&PendingStream>, Vec<&PendingStream>) = self
            .streams
            .iter()
            .partition(|(_, data)| data.len() < self.mini_stream_cutoff);

        let large_placed: Vec<(u32, &PendingStream)> = large
            .into_iter()
            .map(|stream| (fat.allocate_chain(stream.1.len()), stream))
            .collect();

        let small_placed: Vec<(u32, &PendingStream)> = small
            .into_iter()
            .map(|stream| (minifat.allocate_mini_chain(&stream.1), stream))
            .collect();

        let (ministream_start, ministream_size) = if minifat.is_empty() {
            (ENDOFCHAIN, 0u64)
        } else {
            (
                fat.allocate_chain(minifat.ministream_data().len()),
                minifat.ministream_size(),
            )
        };

        let mut directory = DirectoryBuilder::new(ministream_start, ministream_size);
        if self.root_clsid != [0u8; 16] {
            directory.set_root_clsid(self.root_clsid);
        }
        for storage_path in &self.storages {
            directory.add_storage_path(storage_path);
        }
        for (start, (path, data)) in large_placed.iter().chain(small_placed.iter()) {
            directory.add_stream_path(path, *start, data.len() as u64)?;
        }

        let dir_stream = directory.generate_directory_stream();
        let dir_sector_count = dir_stream.len().div_ceil(self.sector_size) as u32;
        let dir_start_sector = fat.allocate_chain(dir_stream.len());

        let minifat_sectors = minifat.generate_minifat_sectors(self.sector_size);
        let minifat_start_sector = if minifat_sectors.is_empty() {
            ENDOFCHAIN
        } else {
            fat.allocate_chain(minifat_sectors.len() * self.sector_size)
        };

        // FAT and DIFAT sectors describe themselves, so iterate to a fixed point
        let entries_per_fat_sector = self.sector_size as u32 / 4;
        let ids_per_difat_sector = entries_per_fat_sector - 1;
        let n_used = fat.total_sectors();
        let mut n_fat: u32 = 0;
        let mut n_difat: u32 = 0;
        loop {
            let new_n_fat = (n_used + n_fat + n_difat).div_ceil(entries_per_fat_sector);
            let new_n_difat = new_n_fat
                .saturating_sub(HEADER_DIFAT_ENTRIES as u32)
                .div_ceil(ids_per_difat_sector);
            if new_n_fat == n_fat && new_n_difat == n_difat {
                break;
            }
            n_fat = new_n_fat;
            n_difat = new_n_difat;
        }

        let difat_start_sector = fat.allocate_special(n_difat, DIFSECT);
        let fat_start_sector = fat.allocate_special(n_fat, FATSECT);

        fat.validate()
            .map_err(|e| OleError::InvalidData(format!("FAT validation failed: {}", e)))?;
        let fat_sectors_data = fat.generate_fat_sectors();

        let fat_sector_ids: Vec<u32> = (fat_start_sector..fat_start_sector + n_fat).collect();

        let mut difat = DifatBuilder::new(self.sector_size);
        difat.set_fat_sectors(&fat_sector_ids);
        let difat_sectors = difat.generate_difat_sectors(difat_start_sector);

        let mut header = Header::new(self.sector_size);
        header.first_dir_sector = dir_start_sector;
        header.dir_sector_count = dir_sector_count;
        header.first_minifat_sector = minifat_start_sector;
        header.minifat_sector_count = minifat_sectors.len() as u32;
        if !difat_sectors.is_empty() {
            header.first_difat_sector = difat_start_sector;
            header.difat_sector_count = difat_sectors.len() as u32;
        }
        header.fat_sectors = fat_sector_ids;

        writer.write_all(&header.encode())?;

        for (start, (_, data)) in &large_placed {
            self.write_chain(writer, *start, data)?;
        }
        if ministream_start != ENDOFCHAIN {
            self.write_chain(writer, ministream_start, minifat.ministream_data())?;
        }
        self.write_chain(writer, dir_start_sector, &dir_stream)?;
        if minifat_start_sector != ENDOFCHAIN {
            self.write_chain(writer, minifat_start_sector, &minifat_sectors.concat())?;
        }
        if n_fat > 0 {
            self.write_chain(writer, fat_start_sector, &fat_sectors_data.concat())?;
        }
        if !difat_sectors.is_empty() {
            self.write_chain(writer, difat_start_sector, &difat_sectors.concat())?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Write `data` into contiguous sectors starting at `start_sector`,
    /// zero-padding the final sector
    fn write_chain<W: Write + Seek>(
        &self,
        writer: &mut W,
        start_sector: u32,
        data: &[u8],
    ) -> Result<(), OleError> {
        if start_sector == ENDOFCHAIN || data.is_empty() {
            return Ok(());
        }

        let position = ((start_sector as u64) + 1) * (self.sector_size as u64);
        writer.seek(SeekFrom::Start(position))?;
        writer.write_all(data)?;

        let padding = data.len().div_ceil(self.sector_size) * self.sector_size - data.len();
        if padding > 0 {
            writer.write_all(&vec![0u8; padding])?;
        }
        Ok(())
    }

    /// Serialize the compound file into a byte vector
    ///
    /// # Returns
    ///
    /// The complete file, a whole number of sectors long
    pub fn to_bytes(&self) -> Result<Vec<u8>, OleError> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        self.write_to(&mut cursor)?;
        Ok(cursor.into_inner())
    }
}

impl Default for OleWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn owned_path(path: &[&str]) -> Result<Vec<String>, OleError> {
    if path.is_empty() {
        return Err(OleError::InvalidData("Empty path".to_string()));
    }
    if let Some(long) = path.iter().find(|name| name.encode_utf16().count() > 31) {
        return Err(OleError::InvalidData(format!(
            "Entry name '{}' exceeds 31 UTF-16 units",
            long
        )));
    }
    Ok(path.iter().map(|s| s.to_string()).collect())
}
