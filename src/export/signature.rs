use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignatureError {
    #[error("not a base64 data URL")]
    NotDataUrl,
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("unsupported image format")]
    UnsupportedFormat,
    #[error("PNG decode failed: {0}")]
    Png(#[from] png::DecodingError),
    #[error("unreadable or truncated JPEG")]
    Jpeg,
}

/// Pixel data ready for a PDF image XObject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageData {
    /// JPEG bytes embedded as-is (DCTDecode) with the number of colour
    /// components from the frame header.
    Jpeg { bytes: Vec<u8>, components: u8 },
    /// 8-bit RGB, alpha already flattened onto white.
    Rgb(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureImage {
    pub width: u32,
    pub height: u32,
    pub data: ImageData,
}

/// Decodes a `data:image/...;base64,` URL as produced by a signature pad.
pub fn decode_data_url(url: &str) -> Result<SignatureImage, SignatureError> {
    let rest = url.trim().strip_prefix("data:").ok_or(SignatureError::NotDataUrl)?;
    let (meta, payload) = rest.split_once(',').ok_or(SignatureError::NotDataUrl)?;
    if !meta.ends_with(";base64") {
        return Err(SignatureError::NotDataUrl);
    }
    let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD.decode(cleaned)?;

    match imagesize::image_type(&bytes).map_err(|_| SignatureError::UnsupportedFormat)? {
        imagesize::ImageType::Png => decode_png(&bytes),
        imagesize::ImageType::Jpeg => decode_jpeg(bytes),
        _ => Err(SignatureError::UnsupportedFormat),
    }
}

fn decode_png(bytes: &[u8]) -> Result<SignatureImage, SignatureError> {
    let mut decoder = png::Decoder::new(Cursor::new(bytes));
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder.read_info()?;
    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buf)?;
    let pixels = &buf[..info.buffer_size()];

    let rgb = match info.color_type {
        png::ColorType::Rgb => pixels.to_vec(),
        png::ColorType::Rgba => pixels
            .chunks_exact(4)
            .flat_map(|p| [over_white(p[0], p[3]), over_white(p[1], p[3]), over_white(p[2], p[3])])
            .collect(),
        png::ColorType::Grayscale => pixels.iter().flat_map(|&g| [g, g, g]).collect(),
        png::ColorType::GrayscaleAlpha => pixels
            .chunks_exact(2)
            .flat_map(|p| {
                let g = over_white(p[0], p[1]);
                [g, g, g]
            })
            .collect(),
        png::ColorType::Indexed => return Err(SignatureError::UnsupportedFormat),
    };

    Ok(SignatureImage {
        width: info.width,
        height: info.height,
        data: ImageData::Rgb(rgb),
    })
}

fn over_white(channel: u8, alpha: u8) -> u8 {
    let c = u16::from(channel);
    let a = u16::from(alpha);
    ((c * a + 255 * (255 - a) + 127) / 255) as u8
}

/// Only the header is parsed; the scan data is embedded untouched, so a
/// payload cut short before the end-of-image marker is refused here.
fn decode_jpeg(bytes: Vec<u8>) -> Result<SignatureImage, SignatureError> {
    if !has_end_marker(&bytes) {
        return Err(SignatureError::Jpeg);
    }
    let size = imagesize::blob_size(&bytes).map_err(|_| SignatureError::Jpeg)?;
    let components = jpeg_components(&bytes).ok_or(SignatureError::Jpeg)?;
    Ok(SignatureImage {
        width: u32::try_from(size.width).map_err(|_| SignatureError::Jpeg)?,
        height: u32::try_from(size.height).map_err(|_| SignatureError::Jpeg)?,
        data: ImageData::Jpeg { bytes, components },
    })
}

/// EOI (FF D9) at the end, ignoring zero padding some encoders append.
fn has_end_marker(bytes: &[u8]) -> bool {
    let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    bytes[..end].ends_with(&[0xFF, 0xD9])
}

/// Component count from the first SOFn segment.
fn jpeg_components(bytes: &[u8]) -> Option<u8> {
    let mut i = 2;
    while i + 4 <= bytes.len() {
        if bytes[i] != 0xFF {
            return None;
        }
        let marker = bytes[i + 1];
        let len = usize::from(u16::from_be_bytes([bytes[i + 2], bytes[i + 3]]));
        let is_sof = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_sof {
            // length(2) precision(1) height(2) width(2) components(1)
            return bytes.get(i + 9).copied().filter(|c| matches!(c, 1 | 3 | 4));
        }
        i += 2 + len;
    }
    None
}
