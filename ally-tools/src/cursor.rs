//! Screenshot post-processing: scale to the viewport, draw the cursor, encode.
use ally_common::Viewport;
use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::imageops::{self, FilterType};
use image::{ImageOutputFormat, Rgba, RgbaImage};
use std::io::Cursor;

/// Arrow pointer, tip at the top-left pixel. `#` outline, `.` fill.
const ARROW: [&str; 19] = [
    "#           ",
    "##          ",
    "#.#         ",
    "#..#        ",
    "#...#       ",
    "#....#      ",
    "#.....#     ",
    "#......#    ",
    "#.......#   ",
    "#........#  ",
    "#.........# ",
    "#......#####",
    "#...#..#    ",
    "#..# #..#   ",
    "#.#  #..#   ",
    "##    #..#  ",
    "#     #..#  ",
    "       #..# ",
    "        ##  ",
];

fn arrow_sprite() -> RgbaImage {
    let width = ARROW[0].len() as u32;
    let mut sprite = RgbaImage::new(width, ARROW.len() as u32);
    for (y, row) in ARROW.iter().enumerate() {
        for (x, cell) in row.bytes().enumerate() {
            let px = match cell {
                b'#' => Rgba([0, 0, 0, 255]),
                b'.' => Rgba([255, 255, 255, 255]),
                _ => continue,
            };
            sprite.put_pixel(x as u32, y as u32, px);
        }
    }
    sprite
}

/// Turn a raw PNG capture into the base64 PNG sent to the model.
///
/// Captures from HiDPI displays are larger than the viewport; they are scaled
/// down so model coordinates and image pixels agree.
pub fn render_frame(png: &[u8], viewport: Viewport, cursor: Option<(u32, u32)>) -> Result<String> {
    let capture = image::load_from_memory(png).context("decoding screenshot")?;
    let mut frame = if (capture.width(), capture.height()) == (viewport.width, viewport.height) {
        capture.to_rgba8()
    } else {
        capture
            .resize_exact(viewport.width, viewport.height, FilterType::Lanczos3)
            .to_rgba8()
    };

    if let Some((x, y)) = cursor {
        imageops::overlay(&mut frame, &arrow_sprite(), i64::from(x), i64::from(y));
    }

    let mut buf = Vec::new();
    frame
        .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
        .context("encoding screenshot")?;
    Ok(STANDARD.encode(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::DynamicImage;

    fn white_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
            .unwrap();
        buf
    }

    fn decode(b64: &str) -> RgbaImage {
        let bytes = STANDARD.decode(b64).unwrap();
        image::load_from_memory(&bytes).unwrap().to_rgba8()
    }

    #[test]
    fn hidpi_capture_is_scaled_to_viewport() {
        let out = render_frame(&white_png(200, 100), Viewport::new(100, 50), None).unwrap();
        let frame = decode(&out);
        assert_eq!(frame.dimensions(), (100, 50));
    }

    #[test]
    fn cursor_tip_is_drawn_at_position() {
        let out = render_frame(&white_png(64, 64), Viewport::new(64, 64), Some((10, 20))).unwrap();
        let frame = decode(&out);
        assert_eq!(*frame.get_pixel(10, 20), Rgba([0, 0, 0, 255]));
        assert_eq!(*frame.get_pixel(9, 20), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn cursor_at_the_edge_is_clipped() {
        let out = render_frame(&white_png(32, 32), Viewport::new(32, 32), Some((32, 32))).unwrap();
        assert_eq!(decode(&out).dimensions(), (32, 32));
    }

    #[test]
    fn garbage_bytes_are_an_error() {
        assert!(render_frame(b"not a png", Viewport::default(), None).is_err());
    }
}
