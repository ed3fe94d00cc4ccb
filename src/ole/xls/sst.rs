//! Shared String Table (SST) reading and writing
//!
//! The SST payload is spread over an SST record and any number of CONTINUE
//! records. A string's character data may cross a record boundary; when it
//! does, the continuing record starts with a fresh option byte whose
//! `fHighByte` bit governs the remaining characters. Rich-text runs and
//! phonetic blocks cross boundaries without any such byte.
//!
//! Writing follows Apache POI's `SSTSerializer`: a string header is never
//! split, character data is, and an EXTSST index is emitted right after the
//! table with one entry per bucket of strings.

use std::collections::HashMap;

use crate::ole::xls::error::{XlsError, XlsResult};
use crate::ole::xls::records::{CONTINUE, EXTSST, MAX_RECORD_DATA, Record, SST};
use crate::ole::xls::strings::{self, FLAG_HIGH_BYTE, FLAG_PHONETIC, FLAG_RICH};

/// Excel indexes at most this many EXTSST buckets
const MAX_BUCKETS: usize = 128;
/// Smallest allowed bucket size
const MIN_BUCKET_SIZE: usize = 8;

/// The workbook's shared string table
#[derive(Debug, Clone, Default)]
pub struct SharedStrings {
    strings: Vec<String>,
    lookup: HashMap<String, u32>,
}

impl SharedStrings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the payloads of an SST record and its CONTINUE records
    ///
    /// # Arguments
    ///
    /// * `fragments` - SST payload first, then each CONTINUE payload in order
    pub fn parse(fragments: &[&[u8]]) -> XlsResult<Self> {
        let mut cursor = FragmentCursor::new(fragments);
        let _cst_total = cursor.read_u32()?;
        let cst_unique = cursor.read_u32()? as usize;

        let mut table = SharedStrings::new();
        for _ in 0..cst_unique {
            if cursor.at_end() {
                tracing::debug!(
                    declared = cst_unique,
                    found = table.len(),
                    "SST ended before its declared string count"
                );
                break;
            }
            let cch = cursor.read_u16()? as usize;
            let flags = cursor.read_u8()?;
            let runs = if flags & FLAG_RICH != 0 {
                cursor.read_u16()? as usize
            } else {
                0
            };
            let ext_len = if flags & FLAG_PHONETIC != 0 {
                cursor.read_u32()? as usize
            } else {
                0
            };
            let value = cursor.read_chars(cch, flags & FLAG_HIGH_BYTE != 0)?;
            cursor.skip(runs * 4 + ext_len)?;
            table.push(value);
        }
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn get(&self, index: u32) -> Option<&str> {
        self.strings.get(index as usize).map(String::as_str)
    }

    /// Index of a string, appending it if not already present
    pub fn intern(&mut self, value: &str) -> u32 {
        if let Some(&index) = self.lookup.get(value) {
            return index;
        }
        self.push(value.to_string())
    }

    fn push(&mut self, value: String) -> u32 {
        let index = self.strings.len() as u32;
        // Duplicates in a parsed table keep their slot; lookups find the first
        self.lookup.entry(value.clone()).or_insert(index);
        self.strings.push(value);
        index
    }

    /// Append SST, CONTINUE and EXTSST records to a `Workbook` stream buffer
    ///
    /// The EXTSST offsets are absolute, so `out` must hold the stream from
    /// its first byte.
    ///
    /// # Arguments
    ///
    /// * `out` - Stream written so far
    /// * `cst_total` - Number of LABELSST records referencing the table
    pub fn write_to(&self, out: &mut Vec<u8>, cst_total: u32) -> XlsResult<()> {
        let bucket_size = bucket_size(self.strings.len());
        let mut buckets: Vec<(u32, u16)> = Vec::new();

        let mut writer = ContinuedRecordWriter::new(out, SST);
        writer.push(&cst_total.to_le_bytes());
        writer.push(&(self.strings.len() as u32).to_le_bytes());

        for (i, value) in self.strings.iter().enumerate() {
            let cch = u16::try_from(strings::char_count(value)).map_err(|_| {
                XlsError::InvalidData(format!("shared string {} is too long", i))
            })?;
            let (flags, bytes) = strings::encode_chars(value);
            let width = if flags & FLAG_HIGH_BYTE != 0 { 2 } else { 1 };

            // Header plus the first character must share a record
            if writer.available() < 3 + width.min(bytes.len()) {
                writer.start_continue();
            }
            if i % bucket_size == 0 {
                buckets.push((writer.stream_pos() as u32, writer.record_offset() as u16));
            }
            writer.push(&cch.to_le_bytes());
            writer.push(&[flags]);
            writer.push_chars(flags, width, &bytes);
        }
        writer.finish();

        let mut data = Vec::with_capacity(2 + buckets.len() * 8);
        data.extend_from_slice(&(bucket_size as u16).to_le_bytes());
        for (ib, cb_offset) in buckets {
            data.extend_from_slice(&ib.to_le_bytes());
            data.extend_from_slice(&cb_offset.to_le_bytes());
            data.extend_from_slice(&0u16.to_le_bytes());
        }
        Record::new(EXTSST, data).write_to(out)
    }
}

/// Strings per EXTSST bucket, keeping the bucket count within Excel's limit
fn bucket_size(count: usize) -> usize {
    count
        .div_ceil(MAX_BUCKETS)
        .clamp(MIN_BUCKET_SIZE, u16::MAX as usize)
}

/// Writes one logical record that spills into CONTINUE records
///
/// Headers are patched in place once each record's length is known.
pub(crate) struct ContinuedRecordWriter<'a> {
    out: &'a mut Vec<u8>,
    record_type: u16,
    header_at: usize,
}

impl<'a> ContinuedRecordWriter<'a> {
    pub(crate) fn new(out: &'a mut Vec<u8>, record_type: u16) -> Self {
        let header_at = out.len();
        out.extend_from_slice(&[0u8; 4]);
        Self {
            out,
            record_type,
            header_at,
        }
    }

    /// Payload bytes left in the current record
    pub(crate) fn available(&self) -> usize {
        MAX_RECORD_DATA - (self.out.len() - self.header_at - 4)
    }

    pub(crate) fn stream_pos(&self) -> usize {
        self.out.len()
    }

    /// Offset from the current record's header to the write position
    pub(crate) fn record_offset(&self) -> usize {
        self.out.len() - self.header_at
    }

    pub(crate) fn push(&mut self, bytes: &[u8]) {
        self.out.extend_from_slice(bytes);
    }

    /// Write character data, repeating the option byte after each split
    pub(crate) fn push_chars(&mut self, flags: u8, width: usize, bytes: &[u8]) {
        let mut written = 0;
        while written < bytes.len() {
            let mut n = self.available().min(bytes.len() - written);
            n -= n % width;
            if n == 0 {
                self.start_continue();
                self.push(&[flags & FLAG_HIGH_BYTE]);
                continue;
            }
            self.out.extend_from_slice(&bytes[written..written + n]);
            written += n;
        }
    }

    pub(crate) fn start_continue(&mut self) {
        self.close();
        self.record_type = CONTINUE;
        self.header_at = self.out.len();
        self.out.extend_from_slice(&[0u8; 4]);
    }

    fn close(&mut self) {
        let len = (self.out.len() - self.header_at - 4) as u16;
        self.out[self.header_at..self.header_at + 2].copy_from_slice(&self.record_type.to_le_bytes());
        self.out[self.header_at + 2..self.header_at + 4].copy_from_slice(&len.to_le_bytes());
    }

    pub(crate) fn finish(mut self) {
        self.close();
    }
}

/// Reads across SST/CONTINUE payload boundaries
struct FragmentCursor<'a> {
    fragments: &'a [&'a [u8]],
    index: usize,
    pos: usize,
}

impl<'a> FragmentCursor<'a> {
    fn new(fragments: &'a [&'a [u8]]) -> Self {
        Self {
            fragments,
            index: 0,
            pos: 0,
        }
    }

    fn current(&self) -> &'a [u8] {
        self.fragments.get(self.index).copied().unwrap_or(&[])
    }

    /// Move past exhausted fragments; false when no data remains
    fn settle(&mut self) -> bool {
        while self.index < self.fragments.len() && self.pos >= self.current().len() {
            self.index += 1;
            self.pos = 0;
        }
        self.index < self.fragments.len()
    }

    fn at_end(&mut self) -> bool {
        !self.settle()
    }

    fn truncated() -> XlsError {
        XlsError::InvalidRecord {
            record_type: SST,
            message: "shared string table is truncated".to_string(),
        }
    }

    fn read_u8(&mut self) -> XlsResult<u8> {
        if !self.settle() {
            return Err(Self::truncated());
        }
        let b = self.current()[self.pos];
        self.pos += 1;
        Ok(b)
    }

    fn read_u16(&mut self) -> XlsResult<u16> {
        Ok(u16::from_le_bytes([self.read_u8()?, self.read_u8()?]))
    }

    fn read_u32(&mut self) -> XlsResult<u32> {
        Ok(u32::from_le_bytes([
            self.read_u8()?,
            self.read_u8()?,
            self.read_u8()?,
            self.read_u8()?,
        ]))
    }

    fn skip(&mut self, mut count: usize) -> XlsResult<()> {
        while count > 0 {
            if !self.settle() {
                return Err(Self::truncated());
            }
            let n = (self.current().len() - self.pos).min(count);
            self.pos += n;
            count -= n;
        }
        Ok(())
    }

    /// Read `cch` characters; a new fragment begins with its own option byte
    fn read_chars(&mut self, cch: usize, mut high_byte: bool) -> XlsResult<String> {
        let mut units: Vec<u16> = Vec::with_capacity(cch);
        while units.len() < cch {
            if self.pos >= self.current().len() {
                self.index += 1;
                self.pos = 0;
                if self.index >= self.fragments.len() || self.current().is_empty() {
                    return Err(Self::truncated());
                }
                high_byte = self.current()[0] & FLAG_HIGH_BYTE != 0;
                self.pos = 1;
                continue;
            }
            let data = &self.current()[self.pos..];
            let remaining = cch - units.len();
            if high_byte {
                let n = (data.len() / 2).min(remaining);
                if n == 0 {
                    return Err(XlsError::InvalidRecord {
                        record_type: CONTINUE,
                        message: "character split across records".to_string(),
                    });
                }
                units.extend(
                    data[..n * 2]
                        .chunks_exact(2)
                        .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]])),
                );
                self.pos += n * 2;
            } else {
                let n = data.len().min(remaining);
                units.extend(data[..n].iter().map(|&b| b as u16));
                self.pos += n;
            }
        }
        Ok(String::from_utf16_lossy(&units))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ole::xls::records::RecordIter;

    fn payloads(stream: &[u8]) -> (Vec<Vec<u8>>, Option<Vec<u8>>) {
        let mut fragments = Vec::new();
        let mut extsst = None;
        for item in RecordIter::new(stream) {
            let (_, record) = item.unwrap();
            match record.record_type {
                SST | CONTINUE => fragments.push(record.data),
                EXTSST => extsst = Some(record.data),
                other => panic!("unexpected record 0x{:04X}", other),
            }
        }
        (fragments, extsst)
    }

    fn reparse(table: &SharedStrings, prefix: usize) -> (SharedStrings, Vec<u8>, Vec<u8>) {
        let mut out = vec![0u8; prefix];
        table.write_to(&mut out, 7).unwrap();
        let (fragments, extsst) = payloads(&out[prefix..]);
        let refs: Vec<&[u8]> = fragments.iter().map(Vec::as_slice).collect();
        (SharedStrings::parse(&refs).unwrap(), out, extsst.unwrap())
    }

    #[test]
    fn test_intern_deduplicates() {
        let mut table = SharedStrings::new();
        assert_eq!(table.intern("A"), 0);
        assert_eq!(table.intern("B"), 1);
        assert_eq!(table.intern("A"), 0);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1), Some("B"));
    }

    #[test]
    fn test_small_table_round_trip() {
        let mut table = SharedStrings::new();
        for s in ["IDINVC", "CNTITEM", "Prüfung", "发票号"] {
            table.intern(s);
        }
        let (back, out, extsst) = reparse(&table, 0);
        assert_eq!(back.strings, table.strings);
        // cstTotal is written as given
        assert_eq!(&out[4..8], &7u32.to_le_bytes());
        // One bucket starting right after the 8-byte SST header
        assert_eq!(&extsst[0..2], &8u16.to_le_bytes());
        assert_eq!(&extsst[2..6], &12u32.to_le_bytes());
        assert_eq!(&extsst[6..8], &12u16.to_le_bytes());
    }

    #[test]
    fn test_long_strings_split_with_option_byte() {
        let mut table = SharedStrings::new();
        table.intern(&"a".repeat(10_000));
        table.intern(&"ж".repeat(9_000));
        table.intern("tail");
        let (back, out, _) = reparse(&table, 0);
        assert_eq!(back.strings, table.strings);

        let (fragments, _) = payloads(&out);
        assert!(fragments.len() >= 3);
        assert!(fragments.iter().all(|f| f.len() <= MAX_RECORD_DATA));
    }

    #[test]
    fn test_extsst_offsets_are_absolute() {
        let mut table = SharedStrings::new();
        for i in 0..20 {
            table.intern(&format!("s{}", i));
        }
        let prefix = 100;
        let (_, out, extsst) = reparse(&table, prefix);
        // 20 strings in buckets of 8: three entries
        assert_eq!(extsst.len(), 2 + 3 * 8);
        for bucket in 0..3 {
            let at = 2 + bucket * 8;
            let ib = u32::from_le_bytes(extsst[at..at + 4].try_into().unwrap()) as usize;
            let expected = format!("s{}", bucket * 8);
            assert_eq!(&out[ib + 3..ib + 3 + expected.len()], expected.as_bytes());
        }
    }

    #[test]
    fn test_parse_split_with_mode_switch() {
        // "abcd" starts compressed and continues as UTF-16 in a CONTINUE
        let first: Vec<u8> = [
            &1u32.to_le_bytes()[..],
            &1u32.to_le_bytes()[..],
            &[0x04, 0x00, 0x00, b'a', b'b'],
        ]
        .concat();
        let second = vec![0x01, b'c', 0x00, b'd', 0x00];
        let table = SharedStrings::parse(&[&first, &second]).unwrap();
        assert_eq!(table.get(0), Some("abcd"));
    }

    #[test]
    fn test_parse_skips_rich_and_phonetic_blocks() {
        let mut data = Vec::new();
        data.extend_from_slice(&2u32.to_le_bytes());
        data.extend_from_slice(&2u32.to_le_bytes());
        // "xy" with one run and a 6-byte phonetic block
        data.extend_from_slice(&[0x02, 0x00, FLAG_RICH | FLAG_PHONETIC]);
        data.extend_from_slice(&1u16.to_le_bytes());
        data.extend_from_slice(&6u32.to_le_bytes());
        data.extend_from_slice(b"xy");
        data.extend_from_slice(&[0u8; 4]);
        // The phonetic block spills into the next fragment without an option byte
        let (head, tail) = data.split_at(data.len());
        let mut next = vec![0u8; 6];
        next.extend_from_slice(&[0x01, 0x00, 0x00, b'z']);
        let table = SharedStrings::parse(&[head, tail, &next]).unwrap();
        assert_eq!(table.get(0), Some("xy"));
        assert_eq!(table.get(1), Some("z"));
    }

    #[test]
    fn test_truncated_table_is_error() {
        let mut data = Vec::new();
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&[0x05, 0x00, 0x00, b'a']);
        assert!(SharedStrings::parse(&[&data]).is_err());
    }
}
