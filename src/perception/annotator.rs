//! Draw numbered boxes for the observed elements onto a viewport screenshot.
//!
//! Boxes arrive in CSS pixels; `scale` converts them to screenshot pixels
//! (device pixel ratio).

use crate::errors::{WebPilotError, WebPilotResult};
use crate::perception::observation::ObservedElement;

const FORM_FIELD: [u8; 4] = [68, 200, 68, 230];
const CLICKABLE: [u8; 4] = [255, 68, 68, 230];
const OTHER: [u8; 4] = [68, 110, 255, 230];

fn element_colour(element: &ObservedElement) -> [u8; 4] {
    if element.element.form_field {
        FORM_FIELD
    } else if element.element.clickable {
        CLICKABLE
    } else {
        OTHER
    }
}

/// Returns PNG-encoded bytes of the annotated image.
pub fn annotate_image(
    src_bytes: &[u8],
    elements: &[ObservedElement],
    scale: f64,
) -> WebPilotResult<Vec<u8>> {
    let img = image::load_from_memory(src_bytes)
        .map_err(|e| WebPilotError::Perception(format!("annotate load: {e}")))?;
    let mut canvas = img.to_rgba8();
    let (w, _) = canvas.dimensions();

    let label_scale: u32 = if w > 1600 { 2 } else { 1 };
    let box_thickness: i32 = if w > 1600 { 3 } else { 2 };

    for observed in elements {
        let bbox = &observed.element.bbox;
        let x1 = (bbox.x * scale).round() as i32;
        let y1 = (bbox.y * scale).round() as i32;
        let x2 = (bbox.right() * scale).round() as i32;
        let y2 = (bbox.bottom() * scale).round() as i32;
        let col = element_colour(observed);

        draw_rect(&mut canvas, x1, y1, x2, y2, col, box_thickness);

        let label = observed.id.to_string();
        let label_h_px = (5 * label_scale + 4 * label_scale) as i32;
        draw_label(&mut canvas, x1.max(0), (y1 - label_h_px).max(0), &label, col, label_scale);
    }

    let mut out = Vec::new();
    image::DynamicImage::ImageRgba8(canvas)
        .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
        .map_err(|e| WebPilotError::Perception(format!("PNG encode: {e}")))?;
    Ok(out)
}

// ── Drawing primitives ──────────────────────────────────────────────────────

fn draw_rect(
    canvas: &mut image::RgbaImage,
    x1: i32, y1: i32, x2: i32, y2: i32,
    col: [u8; 4],
    thickness: i32,
) {
    let (w, h) = canvas.dimensions();
    let (iw, ih) = (w as i32, h as i32);
    let mut plot = |x: i32, y: i32| {
        if (0..iw).contains(&x) && (0..ih).contains(&y) {
            blend(canvas, x as u32, y as u32, col);
        }
    };
    for t in 0..thickness {
        for x in x1..=x2 {
            plot(x, y1 + t);
            plot(x, y2 - t);
        }
        for y in y1..=y2 {
            plot(x1 + t, y);
            plot(x2 - t, y);
        }
    }
}

/// Dark plate with the numeric id rendered in the element colour.
fn draw_label(
    canvas: &mut image::RgbaImage,
    x: i32, y: i32,
    text: &str,
    col: [u8; 4],
    scale: u32,
) {
    let (w, h) = canvas.dimensions();
    let step = 5 * scale + scale;
    let pad = 2 * scale;
    let plate_w = text.len() as u32 * step + pad * 2;
    let plate_h = 5 * scale + pad * 2;
    let (x, y) = (x as u32, y as u32);

    for dy in 0..plate_h {
        for dx in 0..plate_w {
            let (px, py) = (x + dx, y + dy);
            if px < w && py < h {
                let p = canvas.get_pixel_mut(px, py);
                for channel in 0..3 {
                    p[channel] = (p[channel] as f32 * 0.2) as u8;
                }
                p[3] = 255;
            }
        }
    }

    for (i, c) in text.chars().enumerate() {
        let Some(digit) = c.to_digit(10) else { continue };
        let gx = x + pad + i as u32 * step;
        let glyph = DIGITS[digit as usize];
        for (row, bits) in glyph.iter().enumerate() {
            for bit in 0..5u32 {
                if (bits >> (4 - bit)) & 1 == 0 {
                    continue;
                }
                for sy in 0..scale {
                    for sx in 0..scale {
                        let px = gx + bit * scale + sx;
                        let py = y + pad + row as u32 * scale + sy;
                        if px < w && py < h {
                            blend(canvas, px, py, col);
                        }
                    }
                }
            }
        }
    }
}

fn blend(canvas: &mut image::RgbaImage, x: u32, y: u32, col: [u8; 4]) {
    let p = canvas.get_pixel_mut(x, y);
    let a = col[3] as f32 / 255.0;
    for channel in 0..3 {
        p[channel] = (p[channel] as f32 * (1.0 - a) + col[channel] as f32 * a).round() as u8;
    }
    p[3] = 255;
}

/// 5×5 bitmap digits.
const DIGITS: [[u8; 5]; 10] = [
    [0b01110, 0b10001, 0b10001, 0b10001, 0b01110],
    [0b00100, 0b01100, 0b00100, 0b00100, 0b01110],
    [0b01110, 0b10001, 0b00110, 0b01000, 0b11111],
    [0b11110, 0b00001, 0b00110, 0b00001, 0b11110],
    [0b00110, 0b01010, 0b10010, 0b11111, 0b00010],
    [0b11111, 0b10000, 0b11110, 0b00001, 0b11110],
    [0b01110, 0b10000, 0b11110, 0b10001, 0b01110],
    [0b11111, 0b00001, 0b00010, 0b00100, 0b00100],
    [0b01110, 0b10001, 0b01110, 0b10001, 0b01110],
    [0b01110, 0b10001, 0b01111, 0b00001, 0b01110],
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::Rect;
    use crate::testing::{candidate, blank_png};

    #[test]
    fn draws_box_in_element_colour() {
        let png = blank_png(200, 100);
        let mut element = candidate(1, "button", "OK", Rect::new(20.0, 30.0, 40.0, 20.0));
        element.clickable = true;
        let observed = vec![ObservedElement { id: 1, element }];

        let out = annotate_image(&png, &observed, 1.0).unwrap();
        let img = image::load_from_memory(&out).unwrap().to_rgba8();
        assert_eq!(img.dimensions(), (200, 100));
        let edge = img.get_pixel(40, 30);
        assert!(edge[0] > 200 && edge[1] < 120, "expected red edge, got {edge:?}");
        let inside = img.get_pixel(40, 40);
        assert_eq!(inside[0], 255);
        assert_eq!(inside[1], 255);
    }

    #[test]
    fn scale_maps_css_pixels_to_device_pixels() {
        let png = blank_png(400, 200);
        let element = candidate(1, "input", "q", Rect::new(10.0, 20.0, 50.0, 20.0));
        let observed = vec![ObservedElement { id: 3, element }];
        let out = annotate_image(&png, &observed, 2.0).unwrap();
        let img = image::load_from_memory(&out).unwrap().to_rgba8();
        let edge = img.get_pixel(120, 40);
        assert!(edge[1] > edge[0], "expected green edge at scaled position, got {edge:?}");
    }

    #[test]
    fn garbage_input_is_a_perception_error() {
        let err = annotate_image(b"not an image", &[], 1.0).unwrap_err();
        assert!(matches!(err, WebPilotError::Perception(_)));
    }
}
