use std::fs;
use std::path::Path;

use imoger_core::{process, Operation, ProcessOptions};
use tempfile::tempdir;

/// JPEG whose only metadata is an EXIF DateTimeOriginal of `value` ("YYYY:MM:DD HH:MM:SS").
fn jpeg_taken_at(value: &str) -> Vec<u8> {
    let mut tiff = Vec::new();
    tiff.extend_from_slice(b"MM\x00\x2a\x00\x00\x00\x08");
    tiff.extend_from_slice(&1u16.to_be_bytes());
    tiff.extend_from_slice(&0x8769u16.to_be_bytes());
    tiff.extend_from_slice(&4u16.to_be_bytes());
    tiff.extend_from_slice(&1u32.to_be_bytes());
    tiff.extend_from_slice(&26u32.to_be_bytes());
    tiff.extend_from_slice(&0u32.to_be_bytes());
    tiff.extend_from_slice(&1u16.to_be_bytes());
    tiff.extend_from_slice(&0x9003u16.to_be_bytes());
    tiff.extend_from_slice(&2u16.to_be_bytes());
    tiff.extend_from_slice(&20u32.to_be_bytes());
    tiff.extend_from_slice(&44u32.to_be_bytes());
    tiff.extend_from_slice(&0u32.to_be_bytes());
    tiff.extend_from_slice(value.as_bytes());
    tiff.push(0);

    let mut jpeg = vec![0xff, 0xd8, 0xff, 0xe1];
    jpeg.extend_from_slice(&((8 + tiff.len()) as u16).to_be_bytes());
    jpeg.extend_from_slice(b"Exif\x00\x00");
    jpeg.extend_from_slice(&tiff);
    jpeg.extend_from_slice(&[0xff, 0xd9]);
    jpeg
}

fn silent(_: &str, _: u64, _: u64, _: &str) {}

fn listing(root: &Path) -> Vec<String> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else {
                let rel = path.strip_prefix(root).unwrap();
                out.push(rel.to_string_lossy().replace('\\', "/"));
            }
        }
    }
    out.sort();
    out
}

struct Fixture {
    _dir: tempfile::TempDir,
    search: std::path::PathBuf,
    target: std::path::PathBuf,
}

/// a and b share a capture second, c is a day later, d has no EXIF, notes.txt is ignored.
fn fixture() -> Fixture {
    let dir = tempdir().unwrap();
    let search = dir.path().join("camera");
    let target = dir.path().join("library");
    fs::create_dir_all(search.join("nested")).unwrap();
    fs::create_dir_all(&target).unwrap();

    fs::write(search.join("a.JPG"), jpeg_taken_at("2023:05:01 10:00:00")).unwrap();
    fs::write(search.join("b.JPG"), jpeg_taken_at("2023:05:01 10:00:00")).unwrap();
    fs::write(search.join("c.JPG"), jpeg_taken_at("2023:05:02 09:00:00")).unwrap();
    fs::write(search.join("d.JPG"), b"\xff\xd8\xff\xd9").unwrap();
    fs::write(search.join("notes.txt"), b"hello").unwrap();
    fs::write(search.join("nested").join("e.jpg"), jpeg_taken_at("2023:05:01 10:00:00")).unwrap();

    Fixture {
        _dir: dir,
        search,
        target,
    }
}

#[test]
fn test_flat_copy() {
    let fx = fixture();
    let options = ProcessOptions {
        search: fx.search.clone(),
        target: fx.target.clone(),
        ..Default::default()
    };

    let result = process(&options, &silent).unwrap();

    assert_eq!(result.total_files, 4);
    assert_eq!(result.transferred, 3);
    assert_eq!(result.skipped.len(), 1);
    assert!(result.skipped[0].path.ends_with("d.JPG"));
    assert!(result.is_success());
    assert_eq!(
        listing(&fx.target),
        vec![
            "20230501_100000_01.JPG",
            "20230501_100000_02.JPG",
            "20230502_090000_01.JPG",
        ]
    );
    assert!(fx.search.join("a.JPG").exists());
}

#[test]
fn test_recursive_move_with_date_directories() {
    let fx = fixture();
    let options = ProcessOptions {
        search: fx.search.clone(),
        target: fx.target.clone(),
        recursive: true,
        date_directories: true,
        operation: Operation::Move,
        ..Default::default()
    };

    let result = process(&options, &silent).unwrap();

    assert_eq!(result.transferred, 4);
    assert_eq!(
        listing(&fx.target),
        vec![
            "2023/05/01/20230501_100000_01.JPG",
            "2023/05/01/20230501_100000_02.JPG",
            "2023/05/01/20230501_100000_03.jpg",
            "2023/05/02/20230502_090000_01.JPG",
        ]
    );
    // Only the skipped image and the non-image stay behind
    assert_eq!(listing(&fx.search), vec!["d.JPG", "notes.txt"]);
}

#[test]
fn test_second_run_reports_conflicts() {
    let fx = fixture();
    let options = ProcessOptions {
        search: fx.search.clone(),
        target: fx.target.clone(),
        ..Default::default()
    };

    process(&options, &silent).unwrap();
    let again = process(&options, &silent).unwrap();

    assert_eq!(again.transferred, 0);
    assert_eq!(again.failed.len(), 3);
    assert!(!again.is_success());
}

#[test]
fn test_dry_run_touches_nothing_and_writes_report() {
    let fx = fixture();
    let report_path = fx.search.parent().unwrap().join("plan.json");
    let options = ProcessOptions {
        search: fx.search.clone(),
        target: fx.target.clone(),
        date_directories: true,
        dry_run: true,
        report: Some(report_path.clone()),
        ..Default::default()
    };

    let result = process(&options, &silent).unwrap();

    assert!(result.dry_run);
    assert_eq!(result.planned, 3);
    assert_eq!(result.transferred, 0);
    assert!(listing(&fx.target).is_empty());

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(json["summary"]["planned"], 3);
    assert_eq!(json["entries"][2]["destination"], "2023/05/02/20230502_090000_01.JPG");
    assert_eq!(json["entries"][2]["outcome"], "planned");
}

#[test]
fn test_missing_target_fails_before_transfers() {
    let fx = fixture();
    let options = ProcessOptions {
        search: fx.search.clone(),
        target: fx.target.join("does-not-exist"),
        operation: Operation::Move,
        ..Default::default()
    };

    assert!(process(&options, &silent).is_err());
    assert!(fx.search.join("a.JPG").exists());
}
