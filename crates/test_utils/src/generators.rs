//! Property-based test data generators
//!
//! proptest strategies for claim photos and claim details.

use chrono::{Days, NaiveDate, Utc};
use proptest::prelude::*;

use core_kernel::{Currency, UserId};
use domain_claims::claim::{Angle, NewClaim};
use domain_claims::ingest::ImageUpload;

use crate::fixtures::ImageFixtures;

/// Any angle, including unknown
pub fn angle_strategy() -> impl Strategy<Value = Angle> {
    prop_oneof![
        Just(Angle::Front),
        Just(Angle::Back),
        Just(Angle::Left),
        Just(Angle::Right),
        Just(Angle::Unknown),
    ]
}

/// One of the four verification angles
pub fn required_angle_strategy() -> impl Strategy<Value = Angle> {
    prop::sample::select(Angle::REQUIRED.to_vec())
}

pub fn currency_strategy() -> impl Strategy<Value = Currency> {
    prop_oneof![
        Just(Currency::USD),
        Just(Currency::EUR),
        Just(Currency::GBP),
        Just(Currency::INR),
    ]
}

/// Width and height that pass the minimum-dimension check
pub fn image_dimensions_strategy() -> impl Strategy<Value = (u32, u32)> {
    (50u32..=160, 50u32..=160)
}

/// A decodable PNG upload
pub fn upload_strategy() -> impl Strategy<Value = ImageUpload> {
    (any::<u8>(), image_dimensions_strategy(), angle_strategy()).prop_map(
        |(seed, (width, height), angle)| ImageUpload {
            bytes: ImageFixtures::png(seed, width, height),
            angle,
            filename: format!("{}_{}.png", angle, seed),
        },
    )
}

/// Between zero and `max` uploads
pub fn uploads_strategy(max: usize) -> impl Strategy<Value = Vec<ImageUpload>> {
    prop::collection::vec(upload_strategy(), 0..=max)
}

/// An accident date within the last year
pub fn accident_date_strategy() -> impl Strategy<Value = NaiveDate> {
    (0u64..365).prop_map(|days_ago| Utc::now().date_naive() - Days::new(days_ago))
}

/// Valid claim details for a fixed owner
pub fn new_claim_strategy(owner_id: UserId) -> impl Strategy<Value = NewClaim> {
    (
        "POL-[0-9]{4}-[0-9]{4}",
        accident_date_strategy(),
        "[A-Z][a-z]{3,12} (Street|Road|Avenue)",
        "[a-z ]{10,60}",
    )
        .prop_map(move |(policy_number, accident_date, location, description)| NewClaim {
            owner_id,
            policy_number,
            accident_date,
            location,
            description,
        })
}
