use crate::error::EngineError;
use flate2::Compression;
use flate2::write::ZlibEncoder;
use lopdf::{Dictionary, Object, Stream};
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Bmp,
}

/// Pixel data ready to be placed on a PDF page.
#[derive(Debug, Clone)]
pub struct RasterImage {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub pixels: Pixels,
}

#[derive(Debug, Clone)]
pub enum Pixels {
    /// Untouched JPEG stream, embedded with DCTDecode.
    Jpeg { data: Vec<u8>, components: u8 },
    /// 8-bit samples, one or three channels, plus optional 8-bit alpha.
    Raw {
        samples: Vec<u8>,
        gray: bool,
        alpha: Option<Vec<u8>>,
    },
}

/// Detect format from raw bytes
pub fn detect_image_format(data: &[u8]) -> Option<ImageFormat> {
    if data.len() < 4 {
        return None;
    }
    if data[0] == 0xFF && data[1] == 0xD8 && data[2] == 0xFF {
        Some(ImageFormat::Jpeg)
    } else if data[0] == 0x89 && data[1] == 0x50 && data[2] == 0x4E && data[3] == 0x47 {
        Some(ImageFormat::Png)
    } else if data[0] == 0x42 && data[1] == 0x4D {
        Some(ImageFormat::Bmp)
    } else {
        None
    }
}

/// Decode (or, for JPEG, inspect) an image file so it can be embedded.
pub fn prepare_image(name: &str, data: Vec<u8>) -> Result<RasterImage, EngineError> {
    let format =
        detect_image_format(&data).ok_or_else(|| EngineError::UnsupportedImage(name.to_string()))?;

    if format == ImageFormat::Jpeg {
        let sof = parse_jpeg_header(&data).map_err(|reason| EngineError::Image {
            name: name.to_string(),
            reason,
        })?;
        return Ok(RasterImage {
            name: name.to_string(),
            width: sof.width,
            height: sof.height,
            pixels: Pixels::Jpeg {
                data,
                components: sof.components,
            },
        });
    }

    let decoded = ::image::load_from_memory(&data).map_err(|e| EngineError::Image {
        name: name.to_string(),
        reason: e.to_string(),
    })?;
    let (width, height) = (decoded.width(), decoded.height());
    let color = decoded.color();

    let pixels = match (color.has_color(), color.has_alpha()) {
        (false, false) => Pixels::Raw {
            samples: decoded.to_luma8().into_raw(),
            gray: true,
            alpha: None,
        },
        (true, false) => Pixels::Raw {
            samples: decoded.to_rgb8().into_raw(),
            gray: false,
            alpha: None,
        },
        (_, true) => {
            let rgba = decoded.to_rgba8().into_raw();
            let mut rgb = Vec::with_capacity(rgba.len() / 4 * 3);
            let mut alpha = Vec::with_capacity(rgba.len() / 4);
            for px in rgba.chunks_exact(4) {
                rgb.extend_from_slice(&px[..3]);
                alpha.push(px[3]);
            }
            // Fully opaque images do not need a soft mask.
            let alpha = alpha.iter().any(|&a| a != u8::MAX).then_some(alpha);
            Pixels::Raw {
                samples: rgb,
                gray: false,
                alpha,
            }
        }
    };

    Ok(RasterImage {
        name: name.to_string(),
        width,
        height,
        pixels,
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct JpegHeader {
    width: u32,
    height: u32,
    components: u8,
}

/// Parse JPEG SOF marker to get dimensions and component count
fn parse_jpeg_header(data: &[u8]) -> Result<JpegHeader, String> {
    let mut i = 2; // skip FF D8
    while i + 1 < data.len() {
        if data[i] != 0xFF {
            i += 1;
            continue;
        }
        let marker = data[i + 1];
        i += 2;

        // Baseline, extended and progressive frames
        if marker == 0xC0 || marker == 0xC1 || marker == 0xC2 {
            if i + 8 > data.len() {
                return Err("JPEG SOF marker truncated".into());
            }
            let height = ((data[i + 3] as u32) << 8) | (data[i + 4] as u32);
            let width = ((data[i + 5] as u32) << 8) | (data[i + 6] as u32);
            let components = data[i + 7];
            if width == 0 || height == 0 {
                return Err("JPEG has zero dimension".into());
            }
            return Ok(JpegHeader {
                width,
                height,
                components,
            });
        }

        // Standalone markers carry no length
        if marker == 0x01 || (0xD0..=0xD8).contains(&marker) {
            continue;
        }
        if i + 1 >= data.len() {
            break;
        }
        let seg_len = ((data[i] as usize) << 8) | (data[i + 1] as usize);
        i += seg_len;
    }
    Err("Could not find JPEG SOF marker".into())
}

impl RasterImage {
    /// Build the image XObject and, when the image has transparency, its soft mask.
    pub fn to_streams(&self) -> Result<(Stream, Option<Stream>), EngineError> {
        let mut dict = image_dict(self.width, self.height);
        match &self.pixels {
            Pixels::Jpeg { data, components } => {
                let space = match components {
                    1 => "DeviceGray",
                    4 => "DeviceCMYK",
                    _ => "DeviceRGB",
                };
                dict.set("ColorSpace", Object::Name(space.as_bytes().to_vec()));
                dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
                Ok((Stream::new(dict, data.clone()), None))
            }
            Pixels::Raw {
                samples,
                gray,
                alpha,
            } => {
                let space: &[u8] = if *gray { b"DeviceGray" } else { b"DeviceRGB" };
                dict.set("ColorSpace", Object::Name(space.to_vec()));
                dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
                let main = Stream::new(dict, deflate(samples)?);

                let mask = match alpha {
                    Some(alpha) => {
                        let mut mask_dict = image_dict(self.width, self.height);
                        mask_dict.set("ColorSpace", Object::Name(b"DeviceGray".to_vec()));
                        mask_dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
                        Some(Stream::new(mask_dict, deflate(alpha)?))
                    }
                    None => None,
                };
                Ok((main, mask))
            }
        }
    }
}

fn image_dict(width: u32, height: u32) -> Dictionary {
    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"XObject".to_vec()));
    dict.set("Subtype", Object::Name(b"Image".to_vec()));
    dict.set("Width", Object::Integer(width as i64));
    dict.set("Height", Object::Integer(height as i64));
    dict.set("BitsPerComponent", Object::Integer(8));
    dict
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, EngineError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Create content stream that draws an image XObject
pub fn create_image_content_stream(
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    image_name: &str,
) -> Vec<u8> {
    let mut content = Vec::new();
    content.extend_from_slice(b"q\n");
    content.extend_from_slice(format!("{} 0 0 {} {} {} cm\n", width, height, x, y).as_bytes());
    content.extend_from_slice(format!("/{} Do\n", image_name).as_bytes());
    content.extend_from_slice(b"Q\n");
    content
}
