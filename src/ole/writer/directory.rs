//! Directory stream
//!
//! Siblings are ordered by UTF-16 length, then case-insensitively, with
//! `_VBA_PROJECT` and `__`-prefixed names after their peers. The middle
//! sibling becomes the storage's child; smaller names chain off its left
//! link and larger ones off its right link. All nodes are black.
//!
//! # Implementation Notes
//!
//! The ordering matches Apache POI's property comparator. Readers that
//! search the sibling tree by name miss entries placed out of order.

use super::super::consts::*;
use super::super::file::OleError;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Directory entry under construction
#[derive(Debug, Clone)]
pub struct DirectoryEntryBuilder {
    pub name: String,
    pub entry_type: u8,
    pub start_sector: u32,
    pub size: u64,
    pub sid_left: u32,
    pub sid_right: u32,
    pub sid_child: u32,
    pub clsid: [u8; 16],
}

impl DirectoryEntryBuilder {
    fn new(name: String, entry_type: u8, start_sector: u32, size: u64) -> Self {
        Self {
            name,
            entry_type,
            start_sector,
            size,
            sid_left: NOSTREAM,
            sid_right: NOSTREAM,
            sid_child: NOSTREAM,
            clsid: [0; 16],
        }
    }

    /// The 128-byte on-disk form
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(DIRENTRY_SIZE);
        let units: Vec<u16> = self.name.encode_utf16().take(31).collect();
        out.extend(units.iter().flat_map(|u| u.to_le_bytes()));
        out.resize(64, 0);
        // Byte length including the NUL terminator
        out.extend_from_slice(&(((units.len() + 1) * 2) as u16).to_le_bytes());
        out.extend_from_slice(&[self.entry_type, 1]);
        for link in [self.sid_left, self.sid_right, self.sid_child] {
            out.extend_from_slice(&link.to_le_bytes());
        }
        out.extend_from_slice(&self.clsid);
        // State bits, creation and modification times
        out.resize(116, 0);
        out.extend_from_slice(&self.start_sector.to_le_bytes());
        out.extend_from_slice(&self.size.to_le_bytes());
        out
    }
}

/// Collects entries in SID order and links them on output
pub struct DirectoryBuilder {
    entries: Vec<DirectoryEntryBuilder>,
    /// Storage SIDs by path; the root is the empty path
    storages: BTreeMap<Vec<String>, u32>,
    /// Child SIDs of every storage, in insertion order
    children: BTreeMap<u32, Vec<u32>>,
}

impl DirectoryBuilder {
    /// Directory whose root entry owns the mini stream
    pub fn new(ministream_start: u32, ministream_size: u64) -> Self {
        let root = DirectoryEntryBuilder::new(
            "Root Entry".to_string(),
            STGTY_ROOT,
            ministream_start,
            ministream_size,
        );
        Self {
            entries: vec![root],
            storages: BTreeMap::from([(Vec::new(), 0)]),
            children: BTreeMap::from([(0, Vec::new())]),
        }
    }

    pub fn set_root_clsid(&mut self, clsid: [u8; 16]) {
        self.entries[0].clsid = clsid;
    }

    fn push_entry(&mut self, parent: u32, entry: DirectoryEntryBuilder) -> u32 {
        let sid = self.entries.len() as u32;
        self.entries.push(entry);
        self.children.entry(parent).or_default().push(sid);
        sid
    }

    /// SID of the storage at `path`, creating it and its parents if needed
    ///
    /// # Arguments
    ///
    /// * `path` - Storage names from the root down; empty means the root
    ///
    /// # Returns
    ///
    /// The storage's SID
    pub fn add_storage_path(&mut self, path: &[String]) -> u32 {
        let mut parent = 0;
        for depth in 1..=path.len() {
            let prefix = &path[..depth];
            parent = match self.storages.get(prefix) {
                Some(&sid) => sid,
                None => {
                    let entry = DirectoryEntryBuilder::new(
                        prefix[depth - 1].clone(),
                        STGTY_STORAGE,
                        0,
                        0,
                    );
                    let sid = self.push_entry(parent, entry);
                    self.storages.insert(prefix.to_vec(), sid);
                    self.children.entry(sid).or_default();
                    sid
                },
            };
        }
        parent
    }

    /// Add a stream, creating its parent storages
    ///
    /// # Arguments
    ///
    /// * `full_path` - Storage names followed by the stream name
    /// * `start_sector` - First sector (or mini sector) of the stream
    /// * `size` - Stream length in bytes
    ///
    /// # Returns
    ///
    /// The stream's SID, or an error for an empty path
    pub fn add_stream_path(
        &mut self,
        full_path: &[String],
        start_sector: u32,
        size: u64,
    ) -> Result<u32, OleError> {
        let (name, parents) = full_path
            .split_last()
            .ok_or_else(|| OleError::InvalidData("Empty stream path".to_string()))?;
        let parent = self.add_storage_path(parents);
        let entry = DirectoryEntryBuilder::new(name.clone(), STGTY_STREAM, start_sector, size);
        Ok(self.push_entry(parent, entry))
    }

    /// Link siblings and encode every entry in SID order
    ///
    /// # Returns
    ///
    /// The directory stream, 128 bytes per entry
    pub fn generate_directory_stream(&mut self) -> Vec<u8> {
        for (&parent, kids) in &self.children {
            link_children(parent, kids, &mut self.entries);
        }
        self.entries.iter().flat_map(|entry| entry.to_bytes()).collect()
    }

    #[cfg(test)]
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

fn link_children(parent: u32, kids: &[u32], entries: &mut [DirectoryEntryBuilder]) {
    let mut sorted = kids.to_vec();
    sorted.sort_by(|&a, &b| compare_names(&entries[a as usize].name, &entries[b as usize].name));

    let Some(&middle) = sorted.get(sorted.len() / 2) else {
        entries[parent as usize].sid_child = NOSTREAM;
        return;
    };
    entries[parent as usize].sid_child = middle;

    let mid = sorted.len() / 2;
    for (i, &sid) in sorted.iter().enumerate() {
        let entry = &mut entries[sid as usize];
        entry.sid_left = if i > 0 && i <= mid { sorted[i - 1] } else { NOSTREAM };
        entry.sid_right = match sorted.get(i + 1) {
            Some(&next) if i >= mid => next,
            _ => NOSTREAM,
        };
    }
}

fn compare_names(a: &str, b: &str) -> Ordering {
    // Sorts after its peers of equal length
    let rank = |name: &str| match name {
        "_VBA_PROJECT" => 2,
        n if n.starts_with("__") => 1,
        _ => 0,
    };
    a.encode_utf16()
        .count()
        .cmp(&b.encode_utf16().count())
        .then_with(|| rank(a).cmp(&rank(b)))
        .then_with(|| a.to_uppercase().cmp(&b.to_uppercase()))
}
