use image::{Rgba, RgbaImage};
use imageproc::drawing::{
    draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut, text_size,
};
use imageproc::rect::Rect;
use rusttype::{Font, Scale};

use crate::effect::Rgb;

/// 2D RGBA drawing surface backing the overlay renderer and the recording
/// compositor. Pixels carry their opacity in the alpha channel; compositing
/// onto video happens later via source-over blending, so draw calls write
/// straight alpha instead of blending against existing surface content.
pub struct Surface {
    image: RgbaImage,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width.max(1), height.max(1)),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Clear the whole surface to fully transparent.
    pub fn clear(&mut self) {
        for pixel in self.image.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }
    }

    fn color(rgb: Rgb, alpha: f32) -> Rgba<u8> {
        let a = (alpha.clamp(0.0, 1.0) * 255.0).round() as u8;
        Rgba([rgb.r, rgb.g, rgb.b, a])
    }

    /// Fill an axis-aligned rectangle given its top-left corner and size.
    pub fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, rgb: Rgb, alpha: f32) {
        let (w, h) = (w.round() as i64, h.round() as i64);
        if w <= 0 || h <= 0 {
            return;
        }
        let rect = Rect::at(x.round() as i32, y.round() as i32).of_size(w as u32, h as u32);
        draw_filled_rect_mut(&mut self.image, rect, Self::color(rgb, alpha));
    }

    /// Stroke an axis-aligned rectangle outline. Thickness grows inward.
    pub fn stroke_rect(
        &mut self,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        thickness: u32,
        rgb: Rgb,
        alpha: f32,
    ) {
        let color = Self::color(rgb, alpha);
        for i in 0..thickness.max(1) as i32 {
            let rw = w.round() as i64 - 2 * i as i64;
            let rh = h.round() as i64 - 2 * i as i64;
            if rw <= 0 || rh <= 0 {
                break;
            }
            let rect =
                Rect::at(x.round() as i32 + i, y.round() as i32 + i).of_size(rw as u32, rh as u32);
            draw_hollow_rect_mut(&mut self.image, rect, color);
        }
    }

    /// Draw a line segment. `dash` is an (on, off) pixel pattern; `None`
    /// draws solid.
    pub fn draw_line(
        &mut self,
        start: (f32, f32),
        end: (f32, f32),
        dash: Option<(f32, f32)>,
        rgb: Rgb,
        alpha: f32,
    ) {
        let color = Self::color(rgb, alpha);
        match dash {
            None => draw_line_segment_mut(&mut self.image, start, end, color),
            Some((on, off)) => {
                let (dx, dy) = (end.0 - start.0, end.1 - start.1);
                let length = (dx * dx + dy * dy).sqrt();
                if length < f32::EPSILON {
                    return;
                }
                let (ux, uy) = (dx / length, dy / length);
                let period = (on + off).max(1.0);
                let mut t = 0.0f32;
                while t < length {
                    let seg_end = (t + on).min(length);
                    draw_line_segment_mut(
                        &mut self.image,
                        (start.0 + ux * t, start.1 + uy * t),
                        (start.0 + ux * seg_end, start.1 + uy * seg_end),
                        color,
                    );
                    t += period;
                }
            }
        }
    }

    /// Draw text centered on the given point.
    pub fn draw_text_centered(
        &mut self,
        font: &Font<'static>,
        size: f32,
        text: &str,
        cx: f32,
        cy: f32,
        rgb: Rgb,
        alpha: f32,
    ) {
        let scale = Scale::uniform(size);
        let (tw, th) = text_size(scale, font, text);
        let x = cx.round() as i32 - tw / 2;
        let y = cy.round() as i32 - th / 2;
        draw_text_mut(&mut self.image, Self::color(rgb, alpha), x, y, scale, font, text);
    }

    /// Scaled copy of the surface for compositing onto a differently sized
    /// target.
    pub fn scaled_to(&self, width: u32, height: u32) -> RgbaImage {
        if width == self.width() && height == self.height() {
            return self.image.clone();
        }
        image::imageops::resize(
            &self.image,
            width.max(1),
            height.max(1),
            image::imageops::FilterType::Triangle,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opaque_pixels(surface: &Surface) -> usize {
        surface.image().pixels().filter(|p| p[3] > 0).count()
    }

    #[test]
    fn clear_resets_every_pixel() {
        let mut surface = Surface::new(32, 32);
        surface.fill_rect(4.0, 4.0, 8.0, 8.0, Rgb::WHITE, 1.0);
        assert!(opaque_pixels(&surface) > 0);
        surface.clear();
        assert_eq!(opaque_pixels(&surface), 0);
    }

    #[test]
    fn fill_rect_writes_alpha_channel() {
        let mut surface = Surface::new(16, 16);
        surface.fill_rect(0.0, 0.0, 4.0, 4.0, Rgb { r: 10, g: 20, b: 30 }, 0.5);
        let pixel = surface.image().get_pixel(1, 1);
        assert_eq!(pixel[0], 10);
        assert_eq!(pixel[3], 128);
    }

    #[test]
    fn out_of_bounds_draws_are_clipped() {
        let mut surface = Surface::new(16, 16);
        surface.fill_rect(-10.0, -10.0, 100.0, 100.0, Rgb::WHITE, 1.0);
        surface.stroke_rect(-5.0, -5.0, 50.0, 50.0, 2, Rgb::WHITE, 1.0);
        surface.draw_line((-20.0, 8.0), (40.0, 8.0), None, Rgb::WHITE, 1.0);
        assert_eq!(opaque_pixels(&surface), 16 * 16);
    }

    #[test]
    fn dashed_line_leaves_gaps() {
        let mut surface = Surface::new(64, 8);
        surface.draw_line((0.0, 4.0), (63.0, 4.0), Some((5.0, 5.0)), Rgb::WHITE, 1.0);
        let row: Vec<bool> = (0..64)
            .map(|x| surface.image().get_pixel(x, 4)[3] > 0)
            .collect();
        assert!(row.iter().any(|&p| p), "dashes must draw something");
        assert!(!row.iter().all(|&p| p), "dashes must leave gaps");
    }

    #[test]
    fn solid_line_is_continuous() {
        let mut surface = Surface::new(64, 8);
        surface.draw_line((0.0, 4.0), (63.0, 4.0), None, Rgb::WHITE, 1.0);
        assert!((0..64).all(|x| surface.image().get_pixel(x, 4)[3] > 0));
    }

    #[test]
    fn zero_sized_rects_are_ignored() {
        let mut surface = Surface::new(8, 8);
        surface.fill_rect(2.0, 2.0, 0.0, 0.0, Rgb::WHITE, 1.0);
        surface.stroke_rect(2.0, 2.0, 0.0, 4.0, 1, Rgb::WHITE, 1.0);
        assert_eq!(opaque_pixels(&surface), 0);
    }

    #[test]
    fn scaled_copy_has_requested_dimensions() {
        let mut surface = Surface::new(32, 16);
        surface.fill_rect(0.0, 0.0, 32.0, 16.0, Rgb::WHITE, 1.0);
        let scaled = surface.scaled_to(64, 32);
        assert_eq!(scaled.dimensions(), (64, 32));
    }
}
