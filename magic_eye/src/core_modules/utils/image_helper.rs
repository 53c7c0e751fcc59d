// Bridges between `PixelBuffer` and the `image` crate: in-memory conversion plus PNG
// load/save for runners and tests that want to look at a result.

pub mod image_helper {
    use crate::core_modules::pixel::pixel::Pixel;
    use crate::core_modules::pixel_buffer::PixelBuffer;
    use image::{ImageEncoder, RgbaImage};
    use std::path::Path;

    pub fn to_rgba_image(buffer: &PixelBuffer) -> RgbaImage {
        RgbaImage::from_fn(buffer.width() as u32, buffer.height() as u32, |x, y| {
            buffer
                .get(x as isize, y as isize)
                .unwrap_or(Pixel::TRANSPARENT)
                .into()
        })
    }

    pub fn from_rgba_image(image: &RgbaImage) -> PixelBuffer {
        PixelBuffer::from_fn(image.width() as usize, image.height() as usize, |x, y| {
            Pixel::from(*image.get_pixel(x as u32, y as u32))
        })
    }

    /// Decodes any format the `image` crate understands into RGBA.
    pub fn load(path: impl AsRef<Path>) -> Result<PixelBuffer, image::error::ImageError> {
        let image = image::open(path)?.to_rgba8();
        Ok(from_rgba_image(&image))
    }

    pub fn save(path: impl AsRef<Path>, buffer: &PixelBuffer) -> Result<(), image::error::ImageError> {
        let output = std::fs::File::create(path)?;
        let encoder = image::codecs::png::PngEncoder::new(std::io::BufWriter::new(output));

        encoder.write_image(
            &buffer.to_rgba_bytes(),
            buffer.width() as u32,
            buffer.height() as u32,
            image::ExtendedColorType::Rgba8,
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {

    use super::image_helper::*;
    use crate::core_modules::pixel::pixel::Pixel;
    use crate::core_modules::pixel_buffer::PixelBuffer;

    fn gradient(width: usize, height: usize) -> PixelBuffer {
        PixelBuffer::from_fn(width, height, |x, y| {
            Pixel::new((x * 20) as u8, (y * 30) as u8, 7, 255 - x as u8)
        })
    }

    #[test]
    fn rgba_image_conversion_preserves_pixels() {
        let buffer = gradient(5, 3);
        let image = to_rgba_image(&buffer);
        assert_eq!(image.dimensions(), (5, 3));
        assert_eq!(image.get_pixel(4, 2).0, [80, 60, 7, 251]);
        assert_eq!(from_rgba_image(&image), buffer);
    }

    #[test]
    fn save_and_load_gradient_file() {
        let buffer = gradient(12, 9);
        let path = std::env::temp_dir().join(format!("magic_eye_gradient_{}.png", std::process::id()));

        save(&path, &buffer).expect("Error Saving File.");
        let loaded = load(&path).expect("Error Loading File.");
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded, buffer);
    }
}
