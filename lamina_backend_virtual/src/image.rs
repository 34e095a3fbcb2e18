// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Software ARGB32 images.

use kurbo::{Rect, Size};
use lamina_core::output::PixelSize;
use lamina_core::output_layer::{Argb32, BufferHandle, RenderTarget};
use lamina_core::region::Region;

/// An in-memory ARGB32 image, one swapchain slot.
///
/// A pixel is covered by a rectangle when its center is.
#[derive(Clone, PartialEq)]
pub struct VirtualImage {
    handle: BufferHandle,
    size: PixelSize,
    pixels: Vec<Argb32>,
    clip: Option<Vec<Rect>>,
}

impl core::fmt::Debug for VirtualImage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VirtualImage")
            .field("handle", &self.handle)
            .field("size", &self.size)
            .field("clip", &self.clip)
            .finish_non_exhaustive()
    }
}

impl VirtualImage {
    /// Creates a transparent image.
    #[must_use]
    pub fn new(handle: BufferHandle, size: PixelSize) -> Self {
        let len = size.width as usize * size.height as usize;
        Self {
            handle,
            size,
            pixels: vec![Argb32::TRANSPARENT; len],
            clip: None,
        }
    }

    /// Image size in pixels.
    #[must_use]
    pub fn pixel_size(&self) -> PixelSize {
        self.size
    }

    /// Reads one pixel. `None` outside the image.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<Argb32> {
        if x >= self.size.width || y >= self.size.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.size.width as usize + x as usize)
            .copied()
    }

    /// All pixels, row by row.
    #[must_use]
    pub fn pixels(&self) -> &[Argb32] {
        &self.pixels
    }

    fn fill_clipped(&mut self, rect: Rect, color: Argb32) {
        let x0 = to_pixel(rect.x0, self.size.width);
        let x1 = to_pixel(rect.x1, self.size.width);
        let y0 = to_pixel(rect.y0, self.size.height);
        let y1 = to_pixel(rect.y1, self.size.height);
        let stride = self.size.width as usize;
        for y in y0..y1 {
            let row = y as usize * stride;
            self.pixels[row + x0 as usize..row + x1 as usize].fill(color);
        }
    }
}

impl RenderTarget for VirtualImage {
    fn buffer(&self) -> BufferHandle {
        self.handle
    }

    fn size(&self) -> Size {
        self.size.to_size()
    }

    fn set_clip(&mut self, clip: Option<&Region>) {
        self.clip = clip.map(|region| region.rects().to_vec());
    }

    fn fill_rect(&mut self, rect: Rect, color: Argb32) {
        let rect = rect.abs();
        match self.clip.take() {
            Some(clip) => {
                for c in &clip {
                    let part = rect.intersect(*c);
                    if part.width() > 0.0 && part.height() > 0.0 {
                        self.fill_clipped(part, color);
                    }
                }
                self.clip = Some(clip);
            }
            None => self.fill_clipped(rect, color),
        }
    }
}

/// Index of the first pixel whose center lies at or after `v`, clamped to
/// `0..=max`.
#[expect(
    clippy::cast_possible_truncation,
    reason = "value is rounded and clamped to the image extent"
)]
fn to_pixel(v: f64, max: u32) -> u32 {
    (v - 0.5).ceil().clamp(0.0, f64::from(max)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Argb32 = Argb32::rgb(0xff, 0, 0);

    fn image() -> VirtualImage {
        VirtualImage::new(BufferHandle(1), PixelSize::new(8, 4))
    }

    #[test]
    fn fill_covers_pixel_centers() {
        let mut img = image();
        img.fill_rect(Rect::new(1.0, 1.0, 3.0, 2.0), RED);
        assert_eq!(img.pixel(1, 1), Some(RED));
        assert_eq!(img.pixel(2, 1), Some(RED));
        assert_eq!(img.pixel(3, 1), Some(Argb32::TRANSPARENT));
        assert_eq!(img.pixel(1, 2), Some(Argb32::TRANSPARENT));
        assert_eq!(img.pixel(8, 0), None);
    }

    #[test]
    fn fill_is_clipped() {
        let mut img = image();
        img.set_clip(Some(&Region::from_rect(Rect::new(0.0, 0.0, 2.0, 4.0))));
        img.fill_rect(Rect::new(0.0, 0.0, 8.0, 4.0), RED);
        assert_eq!(img.pixel(1, 3), Some(RED));
        assert_eq!(img.pixel(2, 0), Some(Argb32::TRANSPARENT));

        img.set_clip(None);
        img.fill_rect(Rect::new(6.0, 0.0, 8.0, 1.0), Argb32::WHITE);
        assert_eq!(img.pixel(7, 0), Some(Argb32::WHITE));
    }

    #[test]
    fn fill_outside_is_ignored() {
        let mut img = image();
        img.fill_rect(Rect::new(-10.0, -10.0, -1.0, 20.0), RED);
        img.fill_rect(Rect::new(20.0, 0.0, 30.0, 4.0), RED);
        assert!(img.pixels().iter().all(|p| *p == Argb32::TRANSPARENT));
    }
}
