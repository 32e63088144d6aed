mod common;

use common::{MemoryLoader, cube_from_fn, manager_with_scan};
use hyspec_core::annotation::{Contour, Rect};
use hyspec_core::normalize::{
    Channel, FixedNormalization, NormalizationContext, NormalizationScheme, ObjectNormalization,
    SimpleNormalization,
};
use hyspec_core::{ContourSet, SpectralCube};

fn quantize(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[test]
fn unconfigured_pipeline_shows_simple_normalized_bands() {
    let scan = cube_from_fn((3, 4, 5), |y, x, b| (y * 7 + x * 3 + b * b) as f32);
    let mut manager = manager_with_scan(scan.clone(), MemoryLoader::default());

    let outcome = manager.update_image(4, 2, 0);
    assert!(!outcome.is_empty());
    let image = manager.display_image().unwrap();
    assert_eq!(image.dimensions(), (4, 3));

    let ctx = NormalizationContext::default();
    for (channel, band) in [(Channel::Red, 4), (Channel::Green, 2), (Channel::Blue, 0)] {
        let expected = SimpleNormalization
            .normalize(scan.band(band), channel, &ctx)
            .unwrap();
        for ((y, x), v) in expected.indexed_iter() {
            let pixel = image.get_pixel(x as u32, y as u32);
            assert_eq!(pixel.0[channel.index()], quantize(*v), "{channel:?} at ({y}, {x})");
        }
    }
}

#[test]
fn band_indices_clamp_to_last_band() {
    let scan = cube_from_fn((2, 2, 2), |_, x, b| (x + b * 10) as f32);
    let mut manager = manager_with_scan(scan, MemoryLoader::default());
    manager.set_normalization(Box::new(FixedNormalization::new(0.0, 20.0)));

    manager.update_image(0, 1, 40);
    let image = manager.display_image().unwrap();
    // band 1 at x = 1 is 11 → 11 / 20
    assert_eq!(image.get_pixel(1, 0).0[2], quantize(11.0 / 20.0));
    assert_eq!(image.get_pixel(1, 0).0[1], image.get_pixel(1, 0).0[2]);
}

#[test]
fn failed_normalization_falls_back_to_raw_band() {
    let mut manager = manager_with_scan(SpectralCube::filled(2, 3, 3, 0.5), MemoryLoader::default());
    manager.set_normalization(Box::new(ObjectNormalization::default()));

    manager.update_image(0, 1, 2);
    let image = manager.display_image().unwrap();
    assert!(image.pixels().all(|p| p.0 == [128, 128, 128]));
}

#[test]
fn object_normalization_uses_contour_context() {
    let scan = cube_from_fn((4, 4, 1), |y, x, _| (y * 4 + x) as f32);
    let mut manager = manager_with_scan(scan, MemoryLoader::default());
    manager.set_contours(ContourSet::new(vec![Contour::from_rect("leaf", Rect::new(1, 1, 3, 3))]));
    manager.set_normalization(Box::new(ObjectNormalization::default()));

    manager.update_image(0, 0, 0);
    let image = manager.display_image().unwrap();
    // object pixels span 5..=10; samples outside clip
    assert_eq!(image.get_pixel(1, 1).0, [0, 0, 0]);
    assert_eq!(image.get_pixel(2, 2).0, [255, 255, 255]);
    assert_eq!(image.get_pixel(3, 3).0, [255, 255, 255]);
    assert_eq!(image.get_pixel(0, 0).0, [0, 0, 0]);
}

#[test]
fn output_image_writes_resized_png() {
    let scan = cube_from_fn((3, 4, 3), |y, x, b| (y + x + b) as f32);
    let mut manager = manager_with_scan(scan, MemoryLoader::default());
    let path = std::env::temp_dir().join(format!("hyspec-output-{}.png", std::process::id()));

    let outcome = manager.output_image(0, 1, 2, &path, 8, 6).unwrap();
    assert!(!outcome.is_empty());
    let written = image::open(&path).unwrap();
    assert_eq!((written.width(), written.height()), (8, 6));
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn state_dump_lists_scan_and_wavelengths() {
    let mut manager = manager_with_scan(SpectralCube::filled(2, 2, 3, 1.5), MemoryLoader::default());
    manager.calc_norm_data();

    let dump = manager.state_dump();
    assert!(dump.contains("scan: leaf.json shape [2, 2, 3] min 1.5 max 1.5"), "{dump}");
    assert!(dump.contains("black: - (not loaded)"), "{dump}");
    assert!(dump.contains("normalization: simple"), "{dump}");
    assert!(dump.contains("2: 2.00 nm"), "{dump}");
}
