//! Pre-built Test Fixtures
//!
//! Ready-made claim photos and claim details. Images are generated with the
//! `image` crate so every fixture decodes; the seed changes the pixels and
//! therefore the content hash.

use std::io::Cursor;

use chrono::{Days, NaiveDate, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

use core_kernel::UserId;
use domain_claims::claim::{Angle, NewClaim};
use domain_claims::exif::{TAG_DATETIME, TAG_MAKE, TAG_MODEL, TAG_SOFTWARE};
use domain_claims::ingest::ImageUpload;

/// Generated photos for ingest and scoring tests
pub struct ImageFixtures;

impl ImageFixtures {
    /// Patterned RGB image
    pub fn rgb(seed: u8, width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            let v = ((x * 7 + y * 13) as u8).wrapping_mul(seed | 1);
            Rgb([v, v.wrapping_add(seed), 255 - v])
        })
    }

    /// Flat single-colour image; no edges and no colour variance
    pub fn flat(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([128, 128, 128]))
    }

    pub fn png(seed: u8, width: u32, height: u32) -> Vec<u8> {
        encode(DynamicImage::ImageRgb8(Self::rgb(seed, width, height)), ImageFormat::Png)
    }

    pub fn gif(seed: u8, width: u32, height: u32) -> Vec<u8> {
        encode(DynamicImage::ImageRgb8(Self::rgb(seed, width, height)), ImageFormat::Gif)
    }

    pub fn jpeg(seed: u8, width: u32, height: u32) -> Vec<u8> {
        let mut out = Vec::new();
        let img = Self::rgb(seed, width, height);
        JpegEncoder::new_with_quality(&mut out, 90)
            .encode_image(&img)
            .expect("JPEG encoding of an in-memory image");
        out
    }

    /// JPEG with an EXIF APP1 segment holding the given IFD0 ASCII tags
    pub fn jpeg_with_exif(seed: u8, tags: &[(u16, &str)]) -> Vec<u8> {
        let jpeg = Self::jpeg(seed, 96, 72);
        let mut payload = b"Exif\0\0".to_vec();
        payload.extend_from_slice(&ExifBuilder::tiff_block(tags));

        let mut out = jpeg[..2].to_vec();
        out.extend_from_slice(&[0xFF, 0xE1]);
        out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
        out.extend_from_slice(&payload);
        out.extend_from_slice(&jpeg[2..]);
        out
    }

    /// JPEG carrying complete camera metadata
    pub fn camera_jpeg(seed: u8) -> Vec<u8> {
        Self::jpeg_with_exif(
            seed,
            &[
                (TAG_MAKE, "Canon"),
                (TAG_MODEL, "EOS 90D"),
                (TAG_DATETIME, "2024:01:15 10:30:00"),
            ],
        )
    }

    /// JPEG saved by an editing tool
    pub fn edited_jpeg(seed: u8) -> Vec<u8> {
        Self::jpeg_with_exif(seed, &[(TAG_SOFTWARE, "Adobe Photoshop 25.0")])
    }

    /// Upload of a generated PNG for an angle
    pub fn upload(seed: u8, angle: Angle) -> ImageUpload {
        ImageUpload {
            bytes: Self::png(seed, 96, 72),
            angle,
            filename: format!("{}_{}.png", angle, seed),
        }
    }

    /// One upload per required angle
    pub fn all_angles(seed: u8) -> Vec<ImageUpload> {
        Angle::REQUIRED
            .into_iter()
            .enumerate()
            .map(|(i, angle)| Self::upload(seed.wrapping_add(i as u8), angle))
            .collect()
    }
}

fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format)
        .expect("encoding of an in-memory image");
    out.into_inner()
}

/// Builds raw TIFF/EXIF structures
pub struct ExifBuilder;

impl ExifBuilder {
    /// Little-endian TIFF block with one IFD holding ASCII tags
    pub fn tiff_block(tags: &[(u16, &str)]) -> Vec<u8> {
        const TYPE_ASCII: u16 = 2;

        let mut out = b"II".to_vec();
        out.extend_from_slice(&42u16.to_le_bytes());
        out.extend_from_slice(&8u32.to_le_bytes());
        out.extend_from_slice(&(tags.len() as u16).to_le_bytes());

        let mut heap_offset = 8 + 2 + tags.len() * 12 + 4;
        let mut heap = Vec::new();
        for (tag, value) in tags {
            let mut bytes = value.as_bytes().to_vec();
            bytes.push(0);
            out.extend_from_slice(&tag.to_le_bytes());
            out.extend_from_slice(&TYPE_ASCII.to_le_bytes());
            out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            if bytes.len() <= 4 {
                bytes.resize(4, 0);
                out.extend_from_slice(&bytes);
            } else {
                out.extend_from_slice(&(heap_offset as u32).to_le_bytes());
                heap_offset += bytes.len();
                heap.extend_from_slice(&bytes);
            }
        }
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&heap);
        out
    }
}

/// Fixed claim details
pub struct ClaimFixtures;

impl ClaimFixtures {
    pub fn policy_number() -> &'static str {
        "POL-2024-0001"
    }

    /// An accident a few days ago
    pub fn accident_date() -> NaiveDate {
        Utc::now().date_naive() - Days::new(3)
    }

    pub fn new_claim(owner_id: UserId) -> NewClaim {
        NewClaim {
            owner_id,
            policy_number: Self::policy_number().to_string(),
            accident_date: Self::accident_date(),
            location: "Market Street".to_string(),
            description: "Side impact at junction".to_string(),
        }
    }
}
