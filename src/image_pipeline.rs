//! Decoding of image bytes fetched from the content session.

use image::GenericImageView;
use zune_core::{colorspace::ColorSpace, options::DecoderOptions};
use zune_jpeg::JpegDecoder;

const JPEG_SOI: [u8; 2] = [0xff, 0xd8];

/// Decoded image as tightly packed 8-bit RGBA rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pixmap {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl Pixmap {
    /// RGBA value of one pixel.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = ((y as usize) * (self.width as usize) + x as usize) * 4;
        let pixel = self.rgba.get(offset..offset + 4)?;
        Some([pixel[0], pixel[1], pixel[2], pixel[3]])
    }
}

/// Cover art from some services carries junk after the JPEG end marker,
/// which the strict decoder in `image` rejects.
fn decode_lenient_jpeg(bytes: &[u8]) -> Option<Pixmap> {
    if !bytes.starts_with(&JPEG_SOI) {
        return None;
    }
    let options = DecoderOptions::new_cmd()
        .set_strict_mode(false)
        .jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(bytes, options);
    let rgba = decoder.decode().ok()?;
    let (width, height) = decoder.dimensions()?;
    if rgba.len() != width * height * 4 {
        return None;
    }
    Some(Pixmap {
        width: u32::try_from(width).ok()?,
        height: u32::try_from(height).ok()?,
        rgba,
    })
}

/// Decodes any format the `image` crate knows, retrying damaged JPEGs with a
/// lenient decoder.
pub fn decode_image(bytes: &[u8]) -> Result<Pixmap, String> {
    match image::load_from_memory(bytes) {
        Ok(decoded) => {
            let (width, height) = decoded.dimensions();
            Ok(Pixmap {
                width,
                height,
                rgba: decoded.into_rgba8().into_raw(),
            })
        }
        Err(err) => decode_lenient_jpeg(bytes).ok_or_else(|| err.to_string()),
    }
}
