use std::collections::HashSet;
use std::io::Cursor;

use chrono::NaiveDate;
use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb, RgbImage};
use proptest::prelude::*;

use rx_lens_core::reminders::{derive_reminders, IdAllocator};
use rx_lens_core::{ImageNormalizer, ResolvedMedicine};

fn pattern(width: u32, height: u32, seed: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        Luma([((x.wrapping_mul(31) ^ y.wrapping_mul(17) ^ seed) % 256) as u8])
    })
}

fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Vec::new();
    image.write_to(&mut Cursor::new(&mut buf), format).unwrap();
    buf
}

fn any_format() -> impl Strategy<Value = ImageFormat> {
    prop_oneof![Just(ImageFormat::Png), Just(ImageFormat::Jpeg)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn threshold_output_is_binary(
        width in 1u32..40,
        height in 1u32..40,
        seed in any::<u32>(),
    ) {
        let out = ImageNormalizer::default().threshold(&pattern(width, height, seed));

        prop_assert_eq!(out.dimensions(), (width, height));
        prop_assert!(out.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn normalized_uploads_are_doubled_and_binary(
        width in 1u32..48,
        height in 1u32..48,
        seed in any::<u32>(),
        color in any::<bool>(),
        format in any_format(),
    ) {
        let raster = if color {
            DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
                let v = (x.wrapping_mul(13) ^ y.wrapping_mul(7) ^ seed) as u8;
                Rgb([v, v.wrapping_add(85), v.wrapping_add(170)])
            }))
        } else {
            DynamicImage::ImageLuma8(pattern(width, height, seed))
        };
        let bytes = encode(raster, format);

        let out = ImageNormalizer::default().normalize(&bytes).unwrap();

        prop_assert_eq!(out.dimensions(), (width * 2, height * 2));
        prop_assert!(out.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn reminders_two_per_medicine_with_distinct_ids(
        names in proptest::collection::vec("[A-Za-z]{1,12}", 0..40),
        existing in proptest::collection::vec(0u64..10_000, 0..20),
    ) {
        let medicines: Vec<ResolvedMedicine> = names
            .iter()
            .map(|n| ResolvedMedicine::new(n.clone(), "Generic"))
            .collect();
        let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let mut ids = IdAllocator::after(existing.iter().copied());

        let reminders = derive_reminders(&medicines, today, &mut ids).unwrap();

        prop_assert_eq!(reminders.len(), medicines.len() * 2);
        let unique: HashSet<u64> = reminders.iter().map(|r| r.id).collect();
        prop_assert_eq!(unique.len(), reminders.len());
        let max_existing = existing.iter().copied().max().unwrap_or(0);
        prop_assert!(reminders.iter().all(|r| r.id > max_existing));
    }
}
