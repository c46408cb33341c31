//! Minimal EXIF reader for fraud metadata checks
//!
//! Only IFD0 is read, and only the four ASCII tags the metadata indicator
//! needs. JPEG files carry EXIF in an APP1 segment, PNG files in an `eXIf`
//! chunk. Both wrap the same TIFF structure.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const TAG_MAKE: u16 = 0x010F;
pub const TAG_MODEL: u16 = 0x0110;
pub const TAG_SOFTWARE: u16 = 0x0131;
pub const TAG_DATETIME: u16 = 0x0132;
const TYPE_ASCII: u16 = 2;

/// Editing tools whose name in the `Software` tag raises suspicion
pub const EDITING_SOFTWARE: [&str; 5] = ["photoshop", "gimp", "paint.net", "canva", "pixlr"];

/// EXIF timestamp layout
pub const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExifError {
    #[error("EXIF data truncated at offset {0}")]
    Truncated(usize),

    #[error("Unknown TIFF byte order")]
    BadByteOrder,

    #[error("Bad TIFF magic number {0}")]
    BadMagic(u16),
}

/// The IFD0 fields used by the metadata indicator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExifSummary {
    pub make: Option<String>,
    pub model: Option<String>,
    pub software: Option<String>,
    pub datetime: Option<String>,
}

/// Outcome of the metadata indicator for one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataCheck {
    /// Suspicion score in `[0, 1]`
    pub score: f64,
    /// Short descriptions of what raised the score
    pub findings: Vec<String>,
}

/// Reads IFD0 from a JPEG or PNG file
///
/// Returns `Ok(None)` when the file carries no EXIF block at all.
pub fn read_exif(bytes: &[u8]) -> Result<Option<ExifSummary>, ExifError> {
    match locate_tiff(bytes)? {
        Some(tiff) => parse_tiff(tiff).map(Some),
        None => Ok(None),
    }
}

/// Scores the EXIF metadata of an image
///
/// Missing EXIF scores 0.3 and unreadable EXIF scores 0.2. Otherwise editing
/// software adds 0.4, each missing DateTime/Make/Model adds 0.2, a future
/// timestamp adds 0.3 and an unparsable one adds 0.2. Capped at 1.0.
pub fn metadata_score(bytes: &[u8], now: DateTime<Utc>) -> MetadataCheck {
    let summary = match read_exif(bytes) {
        Ok(Some(summary)) => summary,
        Ok(None) => {
            return MetadataCheck {
                score: 0.3,
                findings: vec!["no EXIF metadata".to_string()],
            }
        }
        Err(err) => {
            return MetadataCheck {
                score: 0.2,
                findings: vec![format!("unreadable EXIF metadata: {}", err)],
            }
        }
    };

    let mut score = 0.0;
    let mut findings = Vec::new();

    if let Some(software) = &summary.software {
        let lower = software.to_lowercase();
        if EDITING_SOFTWARE.iter().any(|editor| lower.contains(editor)) {
            score += 0.4;
            findings.push(format!("edited with {}", software));
        }
    }

    for (name, value) in [
        ("DateTime", &summary.datetime),
        ("Make", &summary.make),
        ("Model", &summary.model),
    ] {
        if value.is_none() {
            score += 0.2;
            findings.push(format!("missing {}", name));
        }
    }

    if let Some(raw) = &summary.datetime {
        match NaiveDateTime::parse_from_str(raw, EXIF_DATETIME_FORMAT) {
            Ok(taken) if taken > now.naive_utc() => {
                score += 0.3;
                findings.push(format!("timestamp {} is in the future", raw));
            }
            Ok(_) => {}
            Err(_) => {
                score += 0.2;
                findings.push(format!("unparsable timestamp '{}'", raw));
            }
        }
    }

    MetadataCheck {
        score: f64::min(score, 1.0),
        findings,
    }
}

fn locate_tiff(bytes: &[u8]) -> Result<Option<&[u8]>, ExifError> {
    if bytes.starts_with(&[0xFF, 0xD8]) {
        return locate_in_jpeg(bytes);
    }
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        return locate_in_png(bytes);
    }
    Ok(None)
}

fn locate_in_jpeg(bytes: &[u8]) -> Result<Option<&[u8]>, ExifError> {
    let mut pos = 2;
    while pos + 4 <= bytes.len() {
        if bytes[pos] != 0xFF {
            return Ok(None);
        }
        let marker = bytes[pos + 1];
        // Start of scan or end of image: no more metadata segments
        if marker == 0xDA || marker == 0xD9 {
            return Ok(None);
        }
        let len = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
        if len < 2 {
            return Err(ExifError::Truncated(pos));
        }
        let end = pos + 2 + len;
        if end > bytes.len() {
            return Err(ExifError::Truncated(pos));
        }
        let data = &bytes[pos + 4..end];
        if marker == 0xE1 && data.starts_with(b"Exif\0\0") {
            return Ok(Some(&data[6..]));
        }
        pos = end;
    }
    Ok(None)
}

fn locate_in_png(bytes: &[u8]) -> Result<Option<&[u8]>, ExifError> {
    let mut pos = 8;
    while pos + 8 <= bytes.len() {
        let len = u32::from_be_bytes([bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]])
            as usize;
        let kind = &bytes[pos + 4..pos + 8];
        let data_start = pos + 8;
        let data_end = data_start
            .checked_add(len)
            .ok_or(ExifError::Truncated(pos))?;
        if data_end > bytes.len() {
            return Err(ExifError::Truncated(pos));
        }
        match kind {
            b"eXIf" => return Ok(Some(&bytes[data_start..data_end])),
            b"IDAT" | b"IEND" => return Ok(None),
            _ => {}
        }
        // Skip the chunk CRC
        pos = data_end + 4;
    }
    Ok(None)
}

#[derive(Clone, Copy)]
enum ByteOrder {
    Little,
    Big,
}

struct Tiff<'a> {
    data: &'a [u8],
    order: ByteOrder,
}

impl<'a> Tiff<'a> {
    fn slice(&self, offset: usize, len: usize) -> Result<&'a [u8], ExifError> {
        offset
            .checked_add(len)
            .and_then(|end| self.data.get(offset..end))
            .ok_or(ExifError::Truncated(offset))
    }

    fn u16_at(&self, offset: usize) -> Result<u16, ExifError> {
        let b = self.slice(offset, 2)?;
        Ok(match self.order {
            ByteOrder::Little => u16::from_le_bytes([b[0], b[1]]),
            ByteOrder::Big => u16::from_be_bytes([b[0], b[1]]),
        })
    }

    fn u32_at(&self, offset: usize) -> Result<u32, ExifError> {
        let b = self.slice(offset, 4)?;
        Ok(match self.order {
            ByteOrder::Little => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            ByteOrder::Big => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
        })
    }
}

fn parse_tiff(data: &[u8]) -> Result<ExifSummary, ExifError> {
    let order = match data.get(0..2) {
        Some(b"II") => ByteOrder::Little,
        Some(b"MM") => ByteOrder::Big,
        Some(_) => return Err(ExifError::BadByteOrder),
        None => return Err(ExifError::Truncated(0)),
    };
    let tiff = Tiff { data, order };

    let magic = tiff.u16_at(2)?;
    if magic != 42 {
        return Err(ExifError::BadMagic(magic));
    }

    let ifd0 = tiff.u32_at(4)? as usize;
    let count = tiff.u16_at(ifd0)? as usize;
    let mut summary = ExifSummary::default();

    for i in 0..count {
        let entry = ifd0 + 2 + i * 12;
        let tag = tiff.u16_at(entry)?;
        let field_type = tiff.u16_at(entry + 2)?;
        if field_type != TYPE_ASCII {
            continue;
        }
        let slot = match tag {
            TAG_MAKE => &mut summary.make,
            TAG_MODEL => &mut summary.model,
            TAG_SOFTWARE => &mut summary.software,
            TAG_DATETIME => &mut summary.datetime,
            _ => continue,
        };

        let len = tiff.u32_at(entry + 4)? as usize;
        let raw = if len <= 4 {
            tiff.slice(entry + 8, len)?
        } else {
            tiff.slice(tiff.u32_at(entry + 8)? as usize, len)?
        };
        let text = String::from_utf8_lossy(raw)
            .trim_end_matches('\0')
            .trim()
            .to_string();
        if !text.is_empty() {
            *slot = Some(text);
        }
    }

    Ok(summary)
}
