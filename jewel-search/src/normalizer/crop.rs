//! Query image localization
//!
//! When the captioning service locates the jewelry in a query photo, the
//! photo is cropped to that region before image embedding so that hands,
//! mannequins and backgrounds do not dominate the vector.

use crate::types::{BoundingBox, ImageRef};
use image::{ImageError, ImageFormat};
use std::io::Cursor;

/// Crop `image` to `region`, re-encoded as PNG
///
/// Returns `Ok(None)` when the region covers no pixels of the decoded image.
///
/// # Errors
/// Fails if the image cannot be decoded or the crop cannot be re-encoded.
pub fn crop_to_region(image: &ImageRef, region: &BoundingBox) -> Result<Option<ImageRef>, ImageError> {
    let decoded = image::load_from_memory(image.bytes())?;
    let Some((x, y, width, height)) = region.to_pixels(decoded.width(), decoded.height()) else {
        return Ok(None);
    };

    let cropped = decoded.crop_imm(x, y, width, height);
    let mut encoded = Cursor::new(Vec::new());
    cropped.write_to(&mut encoded, ImageFormat::Png)?;
    Ok(Some(ImageRef::new(encoded.into_inner())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    const RED: Rgb<u8> = Rgb([200, 0, 0]);
    const BLUE: Rgb<u8> = Rgb([0, 0, 200]);

    /// 200×100 PNG, red on the left half, blue on the right
    fn two_tone_png() -> ImageRef {
        let img = RgbImage::from_fn(200, 100, |x, _| if x < 100 { RED } else { BLUE });
        let mut encoded = Cursor::new(Vec::new());
        img.write_to(&mut encoded, ImageFormat::Png).unwrap();
        ImageRef::new(encoded.into_inner())
    }

    #[test]
    fn test_crop_keeps_only_region() {
        let region = BoundingBox::from_array([0.0, 500.0, 1000.0, 1000.0]);
        let cropped = crop_to_region(&two_tone_png(), &region).unwrap().unwrap();

        let decoded = image::load_from_memory(cropped.bytes()).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (100, 100));
        assert!(decoded.pixels().all(|p| *p == BLUE));
        assert_eq!(cropped.mime_type(), Some("image/png"));
    }

    #[test]
    fn test_empty_region_is_none() {
        let region = BoundingBox::from_array([300.0, 300.0, 300.0, 700.0]);
        assert!(crop_to_region(&two_tone_png(), &region).unwrap().is_none());
    }

    #[test]
    fn test_undecodable_image_is_error() {
        let region = BoundingBox::from_array([0.0, 0.0, 1000.0, 1000.0]);
        assert!(crop_to_region(&ImageRef::new(vec![0xFF, 0xD8, 0xFF]), &region).is_err());
    }
}
