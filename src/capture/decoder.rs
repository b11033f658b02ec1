//! Wire-format decoding into the BGR24 layout frames travel in.

use zune_jpeg::JpegDecoder;

use super::CaptureError;

/// Compressed or packed formats a device may hand us
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    Mjpeg,
    Yuyv,
}

/// Decoded BGR24 pixels plus their dimensions.
pub struct Decoded {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

pub fn decode_frame(
    data: &[u8],
    format: WireFormat,
    width: u32,
    height: u32,
) -> Result<Decoded, CaptureError> {
    match format {
        WireFormat::Mjpeg => {
            let mut decoder = JpegDecoder::new(data);
            let mut pixels = decoder
                .decode()
                .map_err(|e| CaptureError::Decode(format!("{e:?}")))?;
            let (w, h) = decoder
                .dimensions()
                .ok_or_else(|| CaptureError::Decode("jpeg without dimensions".into()))?;
            if pixels.len() != w * h * 3 {
                return Err(CaptureError::Decode(format!(
                    "jpeg decoded to {} bytes for {w}x{h}",
                    pixels.len()
                )));
            }
            // zune emits RGB
            for px in pixels.chunks_exact_mut(3) {
                px.swap(0, 2);
            }
            Ok(Decoded {
                pixels,
                width: w as u32,
                height: h as u32,
            })
        }
        WireFormat::Yuyv => Ok(Decoded {
            pixels: yuyv_to_bgr(data, width, height)?,
            width,
            height,
        }),
    }
}

/// BT.601 limited-range YUYV (YUY2) to BGR24.
pub fn yuyv_to_bgr(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>, CaptureError> {
    let pixels = width as usize * height as usize;
    if width % 2 != 0 || data.len() < pixels * 2 {
        return Err(CaptureError::Decode(format!(
            "yuyv buffer of {} bytes does not cover {width}x{height}",
            data.len()
        )));
    }

    let mut out = Vec::with_capacity(pixels * 3);
    for quad in data[..pixels * 2].chunks_exact(4) {
        let (y0, u, y1, v) = (quad[0], quad[1], quad[2], quad[3]);
        push_bgr(&mut out, y0, u, v);
        push_bgr(&mut out, y1, u, v);
    }
    Ok(out)
}

fn push_bgr(out: &mut Vec<u8>, y: u8, u: u8, v: u8) {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let clamp = |x: i32| ((x + 128) >> 8).clamp(0, 255) as u8;
    out.push(clamp(298 * c + 516 * d));
    out.push(clamp(298 * c - 100 * d - 208 * e));
    out.push(clamp(298 * c + 409 * e));
}
