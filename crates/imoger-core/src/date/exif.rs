use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Seek};
use std::path::Path;

use chrono::NaiveDate;
use exif::{DateTime, In, Reader, Tag, Value};

use super::{Timestamp, TimestampError};

/// Capture tags in priority order. `DateTime` is the last-modified stamp and is ignored.
const CAPTURE_TAGS: [Tag; 2] = [Tag::DateTimeOriginal, Tag::DateTimeDigitized];

/// Extract the capture timestamp from the EXIF block of a file on disk.
pub fn extract_exif_timestamp(path: &Path) -> Result<Timestamp, TimestampError> {
    let file = File::open(path).map_err(|e| TimestampError::Unreadable(e.to_string()))?;
    extract_from_reader(&mut BufReader::new(file))
}

/// Extract the capture timestamp from raw image bytes.
pub fn extract_from_bytes(bytes: &[u8]) -> Result<Timestamp, TimestampError> {
    extract_from_reader(&mut Cursor::new(bytes))
}

fn extract_from_reader<R: BufRead + Seek>(reader: &mut R) -> Result<Timestamp, TimestampError> {
    let exif = match Reader::new().read_from_container(reader) {
        Ok(exif) => exif,
        Err(exif::Error::Io(e)) => return Err(TimestampError::Unreadable(e.to_string())),
        Err(_) => return Err(TimestampError::Missing),
    };

    let mut malformed = None;
    for tag in CAPTURE_TAGS {
        let Some(field) = exif.get_field(tag, In::PRIMARY) else {
            continue;
        };
        match parse_exif_datetime(&field.value) {
            Ok(ts) => return Ok(ts),
            Err(e) => {
                malformed.get_or_insert(e);
            }
        }
    }

    Err(malformed.unwrap_or(TimestampError::Missing))
}

fn parse_exif_datetime(value: &Value) -> Result<Timestamp, TimestampError> {
    let raw = match value {
        Value::Ascii(parts) => parts.first().ok_or(TimestampError::Missing)?,
        other => return Err(TimestampError::Malformed(format!("unexpected value type {:?}", other))),
    };
    let text = String::from_utf8_lossy(raw).trim_end_matches('\0').to_string();

    let dt = DateTime::from_ascii(raw).map_err(|_| TimestampError::Malformed(text.clone()))?;

    NaiveDate::from_ymd_opt(i32::from(dt.year), u32::from(dt.month), u32::from(dt.day))
        .and_then(|d| d.and_hms_opt(u32::from(dt.hour), u32::from(dt.minute), u32::from(dt.second)))
        .ok_or(TimestampError::Malformed(text))
}
