use super::consts::*;
use std::io::{self, Read, Seek, SeekFrom};
use zerocopy::{FromBytes, LE, U16, U32, U64};
use zerocopy_derive::FromBytes as DeriveFromBytes;

/// Directory entry as stored on disk
#[derive(Debug, Clone, DeriveFromBytes)]
#[repr(C)]
struct RawDirectoryEntry {
    /// UTF-16LE, NUL-terminated
    name: [u8; 64],
    /// Byte length of `name` counting the terminator
    name_len: U16<LE>,
    entry_type: u8,
    /// Red-black tree color, ignored on read
    node_color: u8,
    sid_left: U32<LE>,
    sid_right: U32<LE>,
    sid_child: U32<LE>,
    clsid: [u8; 16],
    state_bits: U32<LE>,
    creation_time: U64<LE>,
    modified_time: U64<LE>,
    start_sector: U32<LE>,
    stream_size: U64<LE>,
}

/// Compound file read and write failures
#[derive(Debug, thiserror::Error)]
pub enum OleError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Not an OLE file")]
    NotOleFile,
    #[error("Corrupted file: {0}")]
    CorruptedFile(String),
    #[error("Stream not found")]
    StreamNotFound,
}

impl From<crate::common::binary::BinaryError> for OleError {
    fn from(err: crate::common::binary::BinaryError) -> Self {
        OleError::InvalidData(err.to_string())
    }
}

/// A stream, storage or the root, as read from the directory
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    /// Position in the directory
    pub sid: u32,
    pub name: String,
    /// One of `STGTY_STREAM`, `STGTY_STORAGE`, `STGTY_ROOT`
    pub entry_type: u8,
    pub sid_left: u32,
    pub sid_right: u32,
    pub sid_child: u32,
    /// Raw CLSID bytes, little-endian GUID layout
    pub clsid: [u8; 16],
    /// Chain start, in the FAT or the MiniFAT depending on `is_minifat`
    pub start_sector: u32,
    pub size: u64,
    /// Whether this stream lives in the mini stream
    pub is_minifat: bool,
}

/// OLE2 structured storage reader
///
/// Parses the header, FAT, MiniFAT and directory up front; stream contents
/// are read on demand through [`OleFile::open_stream`].
#[derive(Debug)]
pub struct OleFile<R: Read + Seek> {
    reader: R,
    sector_size: usize,
    mini_sector_size: usize,
    /// Streams smaller than this live in the mini stream
    mini_stream_cutoff: u32,
    /// Next-sector links for regular sectors
    fat: Vec<u32>,
    /// Next-sector links for mini sectors
    minifat: Vec<u32>,
    first_dir_sector: u32,
    root: Option<DirectoryEntry>,
    /// Reachable entries by SID; unreachable slots stay `None`
    dir_entries: Vec<Option<DirectoryEntry>>,
    /// Root entry contents, read on first access to a small stream
    ministream: Option<Vec<u8>>,
}

/// Compound file header (first 512 bytes)
#[derive(Debug, Clone, DeriveFromBytes)]
#[repr(C)]
struct RawHeader {
    signature: [u8; 8],
    clsid: [u8; 16],
    minor_version: U16<LE>,
    /// 3 for 512-byte sectors, 4 for 4096-byte sectors
    major_version: U16<LE>,
    byte_order: U16<LE>,
    sector_shift: U16<LE>,
    mini_sector_shift: U16<LE>,
    reserved: [u8; 6],
    num_dir_sectors: U32<LE>,
    num_fat_sectors: U32<LE>,
    first_dir_sector: U32<LE>,
    transaction_signature: U32<LE>,
    mini_stream_cutoff: U32<LE>,
    first_minifat_sector: U32<LE>,
    num_minifat_sectors: U32<LE>,
    first_difat_sector: U32<LE>,
    num_difat_sectors: U32<LE>,
    /// First FAT sector locations
    difat: [U32<LE>; HEADER_DIFAT_ENTRIES],
}

impl RawHeader {
    fn validate(&self) -> Result<(usize, usize), OleError> {
        if &self.signature != MAGIC {
            return Err(OleError::NotOleFile);
        }
        if self.byte_order.get() != 0xFFFE {
            return Err(OleError::InvalidFormat("Invalid byte order".to_string()));
        }
        let shift = self.sector_shift.get();
        let mini_shift = self.mini_sector_shift.get();
        if !(7..=16).contains(&shift) || !(2..=shift).contains(&mini_shift) {
            return Err(OleError::InvalidFormat("Invalid sector shift".to_string()));
        }
        let sector_size = 1usize << shift;
        match (self.major_version.get(), sector_size) {
            (3, 512) | (4, 4096) => {},
            (3 | 4, _) => {
                return Err(OleError::InvalidFormat("Sector size mismatch".to_string()));
            },
            // Other versions are accepted as long as the geometry is sane
            _ => {},
        }
        Ok((sector_size, 1usize << mini_shift))
    }
}

/// Sectors of a chain, in order
///
/// # Arguments
///
/// * `table` - FAT or MiniFAT
/// * `start` - First sector of the chain
/// * `what` - Table name for error messages
fn sector_chain(table: &[u32], start: u32, what: &str) -> Result<Vec<u32>, OleError> {
    let mut sectors = Vec::new();
    let mut sector = start;
    while sector != ENDOFCHAIN {
        let next = *table.get(sector as usize).ok_or_else(|| {
            OleError::CorruptedFile(format!("{} chain leaves the table at sector {}", what, sector))
        })?;
        // A chain can visit each sector at most once
        if sectors.len() >= table.len() {
            return Err(OleError::CorruptedFile(format!("Cycle in {} chain", what)));
        }
        sectors.push(sector);
        sector = next;
    }
    Ok(sectors)
}

fn u32_entries(data: &[u8]) -> impl Iterator<Item = u32> + '_ {
    data.chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
}

impl<R: Read + Seek> OleFile<R> {
    /// Parse the header, allocation tables and directory of a compound file
    ///
    /// # Arguments
    ///
    /// * `reader` - Seekable source positioned anywhere
    ///
    /// # Returns
    ///
    /// [`OleError::NotOleFile`] when the signature or minimum size is wrong
    pub fn open(mut reader: R) -> Result<Self, OleError> {
        let file_size = reader.seek(SeekFrom::End(0))?;
        if file_size < MINIMAL_OLEFILE_SIZE as u64 {
            return Err(OleError::NotOleFile);
        }
        reader.seek(SeekFrom::Start(0))?;

        let mut bytes = [0u8; 512];
        reader.read_exact(&mut bytes)?;
        let header = RawHeader::read_from_bytes(&bytes)
            .map_err(|_| OleError::InvalidFormat("Truncated header".to_string()))?;
        let (sector_size, mini_sector_size) = header.validate()?;

        let mut ole = OleFile {
            reader,
            sector_size,
            mini_sector_size,
            mini_stream_cutoff: header.mini_stream_cutoff.get(),
            fat: Vec::new(),
            minifat: Vec::new(),
            first_dir_sector: header.first_dir_sector.get(),
            root: None,
            dir_entries: Vec::new(),
            ministream: None,
        };

        let fat_sectors = ole.fat_sector_locations(&header)?;
        for sector in fat_sectors {
            let data = ole.read_sector(sector)?;
            ole.fat.extend(u32_entries(&data));
        }

        ole.load_directory()?;
        if header.num_minifat_sectors.get() > 0 {
            let data = ole.read_fat_chain(header.first_minifat_sector.get())?;
            ole.minifat = u32_entries(&data).collect();
        }

        Ok(ole)
    }

    /// Locations of the FAT sectors: up to 109 in the header, the rest in
    /// a chain of DIFAT sectors whose last entry links to the next one
    fn fat_sector_locations(&mut self, header: &RawHeader) -> Result<Vec<u32>, OleError> {
        let in_use = |sector: &u32| *sector != FREESECT && *sector != ENDOFCHAIN;
        let mut sectors: Vec<u32> = header
            .difat
            .iter()
            .map(|s| s.get())
            .take_while(in_use)
            .collect();

        let per_sector = self.sector_size / 4 - 1;
        let mut next = header.first_difat_sector.get();
        for _ in 0..header.num_difat_sectors.get() {
            if !in_use(&next) {
                break;
            }
            let data = self.read_sector(next)?;
            let entries: Vec<u32> = u32_entries(&data).collect();
            sectors.extend(entries[..per_sector].iter().copied().take_while(in_use));
            next = entries[per_sector];
        }
        Ok(sectors)
    }

    /// Read the directory stream and index every entry reachable from the root
    fn load_directory(&mut self) -> Result<(), OleError> {
        let dir_data = self.read_fat_chain(self.first_dir_sector)?;

        let num_entries = dir_data.len() / DIRENTRY_SIZE;
        if num_entries == 0 {
            return Err(OleError::CorruptedFile("Empty directory".to_string()));
        }
        self.dir_entries = vec![None; num_entries];

        let root = self.parse_directory_entry(&dir_data[0..DIRENTRY_SIZE], 0)?;
        let root_child_sid = root.sid_child;
        self.root = Some(root);
        self.build_storage_tree(root_child_sid, &dir_data, 0)
    }

    /// Decode one 128-byte directory slot
    fn parse_directory_entry(&self, data: &[u8], sid: u32) -> Result<DirectoryEntry, OleError> {
        let raw = RawDirectoryEntry::read_from_bytes(data)
            .map_err(|_| OleError::InvalidFormat("Failed to parse directory entry".to_string()))?;

        let name_len = raw.name_len.get() as usize;
        let name = decode_utf16le(&raw.name[0..name_len.saturating_sub(2).min(64)]);

        // Version 3 files only use the low 32 bits of the size
        let size = match self.sector_size {
            512 => raw.stream_size.get() & 0xFFFF_FFFF,
            _ => raw.stream_size.get(),
        };

        Ok(DirectoryEntry {
            sid,
            name,
            entry_type: raw.entry_type,
            sid_left: raw.sid_left.get(),
            sid_right: raw.sid_right.get(),
            sid_child: raw.sid_child.get(),
            clsid: raw.clsid,
            start_sector: raw.start_sector.get(),
            size,
            is_minifat: raw.entry_type == STGTY_STREAM && size < self.mini_stream_cutoff as u64,
        })
    }

    /// Index an entry and everything below it in the sibling tree
    fn build_storage_tree(
        &mut self,
        child_sid: u32,
        dir_data: &[u8],
        depth: usize,
    ) -> Result<(), OleError> {
        if child_sid == NOSTREAM {
            return Ok(());
        }

        let sid = child_sid as usize;
        if sid >= self.dir_entries.len() || depth > self.dir_entries.len() {
            return Err(OleError::CorruptedFile(
                "Invalid directory entry index".to_string(),
            ));
        }

        // Already visited: a well-formed tree never revisits a node
        if self.dir_entries[sid].is_some() {
            return Ok(());
        }

        let offset = sid * DIRENTRY_SIZE;
        let entry =
            self.parse_directory_entry(&dir_data[offset..offset + DIRENTRY_SIZE], sid as u32)?;
        let (left, right, child) = (entry.sid_left, entry.sid_right, entry.sid_child);
        self.dir_entries[sid] = Some(entry);

        self.build_storage_tree(left, dir_data, depth + 1)?;
        self.build_storage_tree(right, dir_data, depth + 1)?;
        self.build_storage_tree(child, dir_data, depth + 1)
    }

    /// Read one sector; sector 0 starts right after the header
    fn read_sector(&mut self, sector_id: u32) -> Result<Vec<u8>, OleError> {
        let position = (sector_id as u64 + 1) * self.sector_size as u64;
        self.reader.seek(SeekFrom::Start(position))?;

        let mut buffer = vec![0u8; self.sector_size];
        self.reader.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    /// Concatenated sectors of a FAT chain
    fn read_fat_chain(&mut self, start_sector: u32) -> Result<Vec<u8>, OleError> {
        let sectors = sector_chain(&self.fat, start_sector, "FAT")?;
        let mut data = Vec::with_capacity(sectors.len() * self.sector_size);
        for sector in sectors {
            data.extend_from_slice(&self.read_sector(sector)?);
        }
        Ok(data)
    }

    /// Contents of a stream stored in the mini stream
    fn read_mini_stream(&mut self, start_sector: u32, size: u64) -> Result<Vec<u8>, OleError> {
        if self.ministream.is_none() {
            let root_start = self
                .root
                .as_ref()
                .map(|r| r.start_sector)
                .ok_or_else(|| OleError::CorruptedFile("No root entry".to_string()))?;
            self.ministream = Some(self.read_fat_chain(root_start)?);
        }
        let ministream = self.ministream.as_deref().unwrap_or_default();

        let step = self.mini_sector_size;
        let mut data = Vec::with_capacity(size as usize);
        for sector in sector_chain(&self.minifat, start_sector, "MiniFAT")? {
            let at = sector as usize * step;
            let chunk = ministream.get(at..at + step).ok_or_else(|| {
                OleError::CorruptedFile("Mini sector out of bounds".to_string())
            })?;
            data.extend_from_slice(chunk);
        }
        data.truncate(size as usize);
        Ok(data)
    }

    /// Paths of every stream, storage names first, in directory-tree order
    pub fn list_streams(&self) -> Vec<Vec<String>> {
        self.paths_of(STGTY_STREAM)
    }

    /// Paths of every storage, parents before children
    pub fn list_storages(&self) -> Vec<Vec<String>> {
        self.paths_of(STGTY_STORAGE)
    }

    fn paths_of(&self, entry_type: u8) -> Vec<Vec<String>> {
        let mut paths = Vec::new();
        if let Some(root) = &self.root {
            self.walk(root.sid_child, &[], &mut |entry, path| {
                if entry.entry_type == entry_type {
                    paths.push(path.to_vec());
                }
            });
        }
        paths
    }

    /// In-order traversal of a sibling tree, descending into storages
    fn walk(
        &self,
        sid: u32,
        parent: &[String],
        visit: &mut dyn FnMut(&DirectoryEntry, &[String]),
    ) {
        let Some(Some(entry)) = self.dir_entries.get(sid as usize) else {
            return;
        };

        self.walk(entry.sid_left, parent, visit);

        let mut path = parent.to_vec();
        path.push(entry.name.clone());
        visit(entry, &path);
        if entry.entry_type == STGTY_STORAGE {
            self.walk(entry.sid_child, &path, visit);
        }

        self.walk(entry.sid_right, parent, visit);
    }

    /// Read a whole stream
    ///
    /// # Arguments
    ///
    /// * `path` - Storage names followed by the stream name, matched
    ///   case-insensitively
    pub fn open_stream(&mut self, path: &[&str]) -> Result<Vec<u8>, OleError> {
        let entry = self.find_entry(path)?;

        if entry.entry_type != STGTY_STREAM {
            return Err(OleError::InvalidFormat("Not a stream".to_string()));
        }

        if entry.is_minifat {
            self.read_mini_stream(entry.start_sector, entry.size)
        } else {
            let mut data = self.read_fat_chain(entry.start_sector)?;
            if (data.len() as u64) < entry.size {
                return Err(OleError::CorruptedFile(format!(
                    "Stream '{}' shorter than its declared size",
                    entry.name
                )));
            }
            data.truncate(entry.size as usize);
            Ok(data)
        }
    }

    /// Entry at `path`; the empty path is the root
    fn find_entry(&self, path: &[&str]) -> Result<DirectoryEntry, OleError> {
        let root = self.root.as_ref().ok_or(OleError::StreamNotFound)?;
        path.iter()
            .try_fold(root, |parent, name| {
                self.find_sibling(parent.sid_child, name)
            })
            .cloned()
            .ok_or(OleError::StreamNotFound)
    }

    /// Search a sibling tree by name, ignoring ASCII case
    fn find_sibling(&self, sid: u32, name: &str) -> Option<&DirectoryEntry> {
        let entry = self.dir_entries.get(sid as usize)?.as_ref()?;

        if entry.name.eq_ignore_ascii_case(name) {
            return Some(entry);
        }

        self.find_sibling(entry.sid_left, name)
            .or_else(|| self.find_sibling(entry.sid_right, name))
    }

    /// CLSID of the root storage
    pub fn root_clsid(&self) -> [u8; 16] {
        self.root.as_ref().map(|r| r.clsid).unwrap_or([0; 16])
    }

    /// Whether a stream or storage exists at `path`
    pub fn exists(&self, path: &[&str]) -> bool {
        self.find_entry(path).is_ok()
    }

    /// Read every stream into memory, keeping storages and the root CLSID
    pub fn snapshot(&mut self) -> Result<CompoundSnapshot, OleError> {
        let storages = self.list_storages();
        let mut streams = Vec::new();
        for path in self.list_streams() {
            let parts: Vec<&str> = path.iter().map(String::as_str).collect();
            let data = self.open_stream(&parts)?;
            streams.push((path, data));
        }

        Ok(CompoundSnapshot {
            root_clsid: self.root_clsid(),
            storages,
            streams,
        })
    }
}

/// An entire compound file held in memory
///
/// Used as a prototype: a snapshot of a template is cloned, one stream is
/// replaced, and the result is written back out with
/// [`CompoundSnapshot::to_writer`].
#[derive(Debug, Clone, Default)]
pub struct CompoundSnapshot {
    pub root_clsid: [u8; 16],
    /// Storage paths, parents before children
    pub storages: Vec<Vec<String>>,
    /// Stream paths and contents in directory order
    pub streams: Vec<(Vec<String>, Vec<u8>)>,
}

impl CompoundSnapshot {
    /// Contents of a top-level stream, looked up case-insensitively
    pub fn stream(&self, name: &str) -> Option<&[u8]> {
        self.streams
            .iter()
            .find(|(path, _)| path.len() == 1 && path[0].eq_ignore_ascii_case(name))
            .map(|(_, data)| data.as_slice())
    }

    /// Replace the contents of a top-level stream, keeping its original name
    pub fn replace_stream(&mut self, name: &str, data: Vec<u8>) -> Result<(), OleError> {
        let slot = self
            .streams
            .iter_mut()
            .find(|(path, _)| path.len() == 1 && path[0].eq_ignore_ascii_case(name))
            .ok_or(OleError::StreamNotFound)?;
        slot.1 = data;
        Ok(())
    }

    /// Build an [`OleWriter`](super::writer::OleWriter) holding this snapshot
    pub fn to_writer(&self) -> Result<super::writer::OleWriter, OleError> {
        let mut writer = super::writer::OleWriter::new();
        writer.set_root_clsid(self.root_clsid);
        for storage in &self.storages {
            let parts: Vec<&str> = storage.iter().map(String::as_str).collect();
            writer.create_storage(&parts)?;
        }
        for (path, data) in &self.streams {
            let parts: Vec<&str> = path.iter().map(String::as_str).collect();
            writer.create_stream(&parts, data)?;
        }
        Ok(writer)
    }
}

fn decode_utf16le(bytes: &[u8]) -> String {
    let units = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|&unit| unit != 0);
    char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Whether `data` starts with the compound file signature and is large
/// enough to hold a header, a FAT sector and a directory sector
pub fn is_ole_file(data: &[u8]) -> bool {
    data.len() >= MINIMAL_OLEFILE_SIZE && data.starts_with(MAGIC)
}
