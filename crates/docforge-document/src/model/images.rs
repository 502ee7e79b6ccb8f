// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image XObject decoding and pixel blanking.

use docforge_core::BoundingBox;
use docforge_core::error::{ForgeError, Result};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use lopdf::{Object, Stream};
use tracing::debug;

use super::matrix::Matrix;

fn dimension(stream: &Stream, key: &[u8]) -> Option<u32> {
    match stream.dict.get(key) {
        Ok(Object::Integer(v)) if *v > 0 => Some(*v as u32),
        _ => None,
    }
}

fn filter_is(stream: &Stream, name: &[u8]) -> bool {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(n)) => n == name,
        Ok(Object::Array(filters)) => {
            matches!(filters.last(), Some(Object::Name(n)) if n == name)
        }
        _ => false,
    }
}

/// Decode an image XObject to RGB. Supports 8-bit gray/RGB samples (raw or
/// Flate) and DCT (JPEG) data; anything else yields `None`.
pub fn decode_image(stream: &Stream) -> Option<RgbImage> {
    let width = dimension(stream, b"Width")?;
    let height = dimension(stream, b"Height")?;

    if filter_is(stream, b"DCTDecode") {
        return image::load_from_memory(&stream.content)
            .ok()
            .map(|img| img.to_rgb8());
    }

    let bits = match stream.dict.get(b"BitsPerComponent") {
        Ok(Object::Integer(b)) => *b,
        _ => 8,
    };
    if bits != 8 {
        return None;
    }
    let data = stream.decompressed_content().ok().or_else(|| {
        stream
            .dict
            .get(b"Filter")
            .is_err()
            .then(|| stream.content.clone())
    })?;

    let pixels = (width as usize) * (height as usize);
    if data.len() >= pixels * 3 {
        RgbImage::from_raw(width, height, data[..pixels * 3].to_vec())
    } else if data.len() >= pixels {
        let gray = image::GrayImage::from_raw(width, height, data[..pixels].to_vec())?;
        Some(DynamicImage::ImageLuma8(gray).to_rgb8())
    } else {
        None
    }
}

/// Pixel rectangle of `region` inside an image placed with `placement`.
pub fn pixel_rect(placement: &Matrix, region: &BoundingBox, width: u32, height: u32) -> Option<Rect> {
    let unit = placement
        .invert()?
        .transform_box(region)
        .intersection(&BoundingBox::new(0.0, 0.0, 1.0, 1.0))?;
    let x0 = (unit.x0 * width as f32).floor().max(0.0) as u32;
    let x1 = (unit.x1 * width as f32).ceil().min(width as f32) as u32;
    // Image rows run top to bottom, unit space bottom to top.
    let y0 = ((1.0 - unit.y1) * height as f32).floor().max(0.0) as u32;
    let y1 = ((1.0 - unit.y0) * height as f32).ceil().min(height as f32) as u32;
    (x1 > x0 && y1 > y0).then(|| Rect::at(x0 as i32, y0 as i32).of_size(x1 - x0, y1 - y0))
}

/// A copy of `stream` with the pixels under `region` painted black and the
/// samples re-encoded as Flate RGB. `None` when the image cannot be decoded.
pub fn blank_region(
    stream: &Stream,
    placement: &Matrix,
    region: &BoundingBox,
) -> Result<Option<Stream>> {
    let Some(mut img) = decode_image(stream) else {
        return Ok(None);
    };
    let (width, height) = img.dimensions();
    if let Some(rect) = pixel_rect(placement, region, width, height) {
        debug!(?rect, width, height, "blanking image pixels");
        draw_filled_rect_mut(&mut img, rect, Rgb([0, 0, 0]));
    }

    let mut dict = stream.dict.clone();
    let stale: [&[u8]; 4] = [b"Filter", b"DecodeParms", b"Decode", b"Length"];
    for key in stale {
        dict.remove(key);
    }
    dict.set("ColorSpace", Object::Name(b"DeviceRGB".to_vec()));
    dict.set("BitsPerComponent", 8);
    dict.set("Width", width as i64);
    dict.set("Height", height as i64);

    let mut out = Stream::new(dict, img.into_raw());
    out.compress()
        .map_err(|e| ForgeError::Image(format!("re-encoding image: {e}")))?;
    Ok(Some(out))
}
