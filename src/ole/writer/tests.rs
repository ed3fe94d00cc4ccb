//! Round-trip tests: files produced by the writer must be readable by the reader.

use super::super::file::{CompoundSnapshot, OleFile};
use super::core::OleWriter;
use std::io::Cursor;

fn reopen(writer: &OleWriter) -> OleFile<Cursor<Vec<u8>>> {
    let data = writer.to_bytes().unwrap();
    assert!(data.len() >= 1536);
    assert_eq!(&data[0..8], b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1");
    OleFile::open(Cursor::new(data)).unwrap()
}

#[test]
fn test_write_simple_ole_file() {
    let mut writer = OleWriter::new();
    writer
        .create_stream(&["TestStream"], b"Hello, World!")
        .unwrap();

    let mut ole = reopen(&writer);
    let stream_data = ole.open_stream(&["TestStream"]).unwrap();
    assert_eq!(stream_data, b"Hello, World!");
}

#[test]
fn test_write_multiple_streams() {
    let mut writer = OleWriter::new();
    writer.create_stream(&["Workbook"], &vec![0xAAu8; 5000]).unwrap();
    writer.create_stream(&["Small1"], b"Small").unwrap();
    writer.create_stream(&["Small2"], b"Data").unwrap();
    writer.create_stream(&["Large2"], &vec![0xBBu8; 10000]).unwrap();

    let mut ole = reopen(&writer);

    assert_eq!(ole.open_stream(&["Small1"]).unwrap(), b"Small");
    assert_eq!(ole.open_stream(&["small2"]).unwrap(), b"Data");

    let workbook = ole.open_stream(&["Workbook"]).unwrap();
    assert_eq!(workbook.len(), 5000);
    assert!(workbook.iter().all(|&b| b == 0xAA));

    let large2 = ole.open_stream(&["Large2"]).unwrap();
    assert_eq!(large2.len(), 10000);
    assert!(large2.iter().all(|&b| b == 0xBB));
}

#[test]
fn test_first_large_stream_starts_at_sector_zero() {
    let mut writer = OleWriter::new();
    writer.create_stream(&["\u{5}SummaryInformation"], &[1u8; 200]).unwrap();
    writer.create_stream(&["Workbook"], &[7u8; 4096]).unwrap();

    let data = writer.to_bytes().unwrap();
    // Sector 0 begins right after the 512-byte header
    assert!(data[512..512 + 4096].iter().all(|&b| b == 7));
}

#[test]
fn test_write_empty_stream() {
    let mut writer = OleWriter::new();
    writer.create_stream(&["Empty"], b"").unwrap();

    let mut ole = reopen(&writer);
    assert!(ole.open_stream(&["Empty"]).unwrap().is_empty());
}

#[test]
fn test_nested_storage_round_trip() {
    let mut writer = OleWriter::new();
    writer.create_storage(&["_VBA_PROJECT_CUR"]).unwrap();
    writer.create_storage(&["Empty"]).unwrap();
    writer
        .create_stream(&["_VBA_PROJECT_CUR", "PROJECT"], b"ID=\"{}\"")
        .unwrap();
    writer.create_stream(&["Workbook"], &[3u8; 4200]).unwrap();

    let mut ole = reopen(&writer);
    assert_eq!(
        ole.open_stream(&["_VBA_PROJECT_CUR", "PROJECT"]).unwrap(),
        b"ID=\"{}\""
    );

    let storages = ole.list_storages();
    assert!(storages.contains(&vec!["_VBA_PROJECT_CUR".to_string()]));
    assert!(storages.contains(&vec!["Empty".to_string()]));
    assert_eq!(ole.list_streams().len(), 2);
}

#[test]
fn test_many_streams_directory_spans_sectors() {
    let mut writer = OleWriter::new();
    let names: Vec<String> = (0..40).map(|i| format!("Stream{:02}", i)).collect();
    for (i, name) in names.iter().enumerate() {
        writer.create_stream(&[name.as_str()], &vec![i as u8; 100 + i]).unwrap();
    }

    let mut ole = reopen(&writer);
    assert_eq!(ole.list_streams().len(), 40);
    for (i, name) in names.iter().enumerate() {
        let data = ole.open_stream(&[name.as_str()]).unwrap();
        assert_eq!(data.len(), 100 + i);
        assert!(data.iter().all(|&b| b == i as u8));
    }
}

#[test]
fn test_large_file_needs_difat() {
    // 109 FAT sectors cover 109 * 128 * 512 bytes; exceed that
    let mut writer = OleWriter::new();
    let big = vec![0x5Au8; 109 * 128 * 512 + 4096];
    writer.create_stream(&["Big"], &big).unwrap();

    let mut ole = reopen(&writer);
    let back = ole.open_stream(&["Big"]).unwrap();
    assert_eq!(back.len(), big.len());
    assert_eq!(back[back.len() - 1], 0x5A);
}

#[test]
fn test_root_clsid_and_snapshot_round_trip() {
    let clsid = [
        0x20, 0x08, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0xC0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x46,
    ];
    let mut writer = OleWriter::new();
    writer.set_root_clsid(clsid);
    writer.create_stream(&["Workbook"], &[9u8; 5000]).unwrap();
    writer.create_stream(&["\u{5}DocumentSummaryInformation"], &[4u8; 300]).unwrap();

    let mut ole = reopen(&writer);
    assert_eq!(ole.root_clsid(), clsid);

    let mut snapshot: CompoundSnapshot = ole.snapshot().unwrap();
    assert_eq!(snapshot.root_clsid, clsid);
    assert_eq!(snapshot.stream("WORKBOOK").map(<[u8]>::len), Some(5000));

    snapshot.replace_stream("Workbook", vec![1u8; 4096]).unwrap();
    assert!(snapshot.replace_stream("Missing", Vec::new()).is_err());

    let rewritten = snapshot.to_writer().unwrap();
    let mut again = reopen(&rewritten);
    assert_eq!(again.root_clsid(), clsid);
    assert_eq!(again.open_stream(&["Workbook"]).unwrap(), vec![1u8; 4096]);
    assert_eq!(
        again
            .open_stream(&["\u{5}DocumentSummaryInformation"])
            .unwrap(),
        vec![4u8; 300]
    );
}

#[test]
fn test_output_is_deterministic() {
    let build = || {
        let mut writer = OleWriter::new();
        writer.create_storage(&["B"]).unwrap();
        writer.create_storage(&["A"]).unwrap();
        writer.create_stream(&["Workbook"], &[1u8; 6000]).unwrap();
        writer.create_stream(&["A", "x"], b"inner").unwrap();
        writer.to_bytes().unwrap()
    };
    assert_eq!(build(), build());
}
