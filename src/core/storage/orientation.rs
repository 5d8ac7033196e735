//! Orientation handling: EXIF orientation lookup and rotation normalization.

use crate::core::model::Rotation;
use exif::{In, Reader, Tag};
use image::DynamicImage;
use std::io::Cursor;

/// Read the rotation implied by a file's EXIF orientation tag.
///
/// Files without EXIF data, or with an unreadable tag, are upright.
pub fn read_rotation(bytes: &[u8]) -> Rotation {
    let mut cursor = Cursor::new(bytes);
    let exif = match Reader::new().read_from_container(&mut cursor) {
        Ok(exif) => exif,
        Err(_) => return Rotation::Deg0,
    };

    exif.get_field(Tag::Orientation, In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
        .map(Rotation::from_exif_orientation)
        .unwrap_or_default()
}

/// Rotate stored pixels clockwise by the recorded rotation so they are upright
pub fn apply_rotation(image: &DynamicImage, rotation: Rotation) -> DynamicImage {
    match rotation {
        Rotation::Deg0 => image.clone(),
        Rotation::Deg90 => image.rotate90(),
        Rotation::Deg180 => image.rotate180(),
        Rotation::Deg270 => image.rotate270(),
    }
}
