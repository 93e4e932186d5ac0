//! Canonical raster representation shared by every backend.
//!
//! All images are straight-alpha RGBA8 (`image::RgbaImage`), whatever the producing tool wrote.

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::task::Size;
use image::{DynamicImage, RgbaImage};
use std::path::Path;

pub use image::Rgba;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOrigin {
    Rendered,
    Cached,
    /// Synthesized because the backend failed; holds the failure text.
    Placeholder { reason: String },
}

/// One backend's image for the current session.
#[derive(Debug, Clone)]
pub struct RenderedImage {
    pub backend: Backend,
    pub image: RgbaImage,
    pub origin: ImageOrigin,
}

impl RenderedImage {
    pub fn new(backend: Backend, image: RgbaImage, origin: ImageOrigin) -> Self {
        Self {
            backend,
            image,
            origin,
        }
    }

    pub fn size(&self) -> Size {
        Size::new(self.image.width(), self.image.height())
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.origin, ImageOrigin::Placeholder { .. })
    }

    pub fn failure(&self) -> Option<&str> {
        match &self.origin {
            ImageOrigin::Placeholder { reason } => Some(reason),
            _ => None,
        }
    }
}

/// Forces any decoded image into the canonical RGBA8 format.
///
/// Some tools emit RGB (no alpha) or 16-bit output; the conversion is unconditional.
pub fn to_canonical(image: DynamicImage) -> RgbaImage {
    match image {
        DynamicImage::ImageRgba8(img) => img,
        other => other.to_rgba8(),
    }
}

pub fn load(path: &Path) -> Result<RgbaImage> {
    let image = image::open(path).map_err(|source| Error::Image {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(to_canonical(image))
}

pub fn save_png(image: &RgbaImage, path: &Path) -> Result<()> {
    image
        .save_with_format(path, image::ImageFormat::Png)
        .map_err(|source| Error::Image {
            path: path.to_path_buf(),
            source,
        })
}

/// Crops `image` to `target`, keeping the center.
///
/// Sizes larger than the image on either axis are clamped to the image.
pub fn center_crop(image: &RgbaImage, target: Size) -> RgbaImage {
    let w = target.width.min(image.width());
    let h = target.height.min(image.height());
    let x = (image.width() - w) / 2;
    let y = (image.height() - h) / 2;
    image::imageops::crop_imm(image, x, y, w, h).to_image()
}

/// Rescales `image` to fit into `bounds` keeping its aspect ratio.
pub fn scale_to_fit(image: &RgbaImage, bounds: Size) -> RgbaImage {
    let size = Size::new(image.width(), image.height()).fit_within(bounds);
    image::imageops::resize(
        image,
        size.width,
        size.height,
        image::imageops::FilterType::Lanczos3,
    )
}

pub fn filled(size: Size, color: Rgba<u8>) -> RgbaImage {
    RgbaImage::from_pixel(size.width, size.height, color)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn rgb_is_promoted_to_opaque_rgba() {
        let rgb = RgbImage::from_pixel(2, 2, image::Rgb([10, 20, 30]));
        let rgba = to_canonical(DynamicImage::ImageRgb8(rgb));
        assert_eq!(rgba.get_pixel(1, 1), &Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn center_crop_takes_the_middle_rows() {
        let mut img = filled(Size::new(4, 6), Rgba([0, 0, 0, 255]));
        img.put_pixel(0, 1, Rgba([255, 0, 0, 255]));
        img.put_pixel(0, 2, Rgba([0, 255, 0, 255]));

        let cropped = center_crop(&img, Size::new(4, 2));
        assert_eq!(cropped.dimensions(), (4, 2));
        assert_eq!(cropped.get_pixel(0, 0), &Rgba([0, 255, 0, 255]));
    }

    #[test]
    fn center_crop_clamps_to_the_image() {
        let img = filled(Size::new(3, 3), Rgba([1, 2, 3, 4]));
        assert_eq!(center_crop(&img, Size::new(10, 2)).dimensions(), (3, 2));
    }

    #[test]
    fn scale_to_fit_preserves_aspect() {
        let img = filled(Size::new(100, 50), Rgba([0, 0, 0, 255]));
        assert_eq!(scale_to_fit(&img, Size::square(300)).dimensions(), (300, 150));
    }

    #[test]
    fn png_round_trip_keeps_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img.png");
        let mut img = filled(Size::new(3, 2), Rgba([255, 255, 255, 0]));
        img.put_pixel(2, 1, Rgba([9, 8, 7, 128]));
        save_png(&img, &path).unwrap();
        assert_eq!(load(&path).unwrap(), img);
    }
}
