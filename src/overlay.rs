//! Transparent raster layers drawn over the live video.
//!
//! Two layers share the video's pixel space: the marker layer shows the
//! current frame's landmarks and keeps nothing between frames, the path layer
//! shows the recorded scribble.

use anyhow::{Context, Result};
use base64::Engine;
use embedded_graphics::{
    pixelcolor::Rgb888,
    prelude::*,
    primitives::{Circle, PrimitiveStyle, Polyline},
};
use image::{ImageFormat, Rgba, RgbaImage};
use std::convert::Infallible;
use std::io::Cursor;

use crate::config::OverlayConfig;
use crate::detector::{HandObservation, Landmark};
use crate::transform::PixelTransform;

/// An RGBA surface that starts fully transparent
pub struct Layer {
    image: RgbaImage,
    /// Bumped on every clear or draw so viewers know when to re-upload
    revision: u64,
}

impl Layer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
            revision: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Resize the backing buffer. Contents are discarded.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.image = RgbaImage::new(width, height);
        self.revision += 1;
    }

    pub fn clear(&mut self) {
        for pixel in self.image.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }
        self.revision += 1;
    }

    pub fn is_blank(&self) -> bool {
        self.image.pixels().all(|p| p.0[3] == 0)
    }

    pub fn transform(&self) -> PixelTransform {
        PixelTransform::for_buffer(self.width(), self.height())
    }

    pub fn to_png(&self) -> Result<Vec<u8>> {
        if self.width() == 0 || self.height() == 0 {
            anyhow::bail!("Layer has no pixels to export");
        }
        let mut buf = Vec::new();
        self.image
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .context("Failed to encode layer as PNG")?;
        Ok(buf)
    }

    /// `data:image/png;base64,...`
    pub fn to_data_url(&self) -> Result<String> {
        let png = self.to_png()?;
        Ok(format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(png)
        ))
    }
}

impl OriginDimensions for Layer {
    fn size(&self) -> Size {
        Size::new(self.width(), self.height())
    }
}

impl DrawTarget for Layer {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let (width, height) = (self.width(), self.height());
        for Pixel(point, color) in pixels {
            if point.x >= 0 && (point.x as u32) < width && point.y >= 0 && (point.y as u32) < height {
                self.image.put_pixel(
                    point.x as u32,
                    point.y as u32,
                    Rgba([color.r(), color.g(), color.b(), 255]),
                );
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct OverlayStyle {
    pub marker_radius: u32,
    pub marker_color: Rgb888,
    pub stroke_color: Rgb888,
    pub stroke_width: u32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self::from(&OverlayConfig::default())
    }
}

impl From<&OverlayConfig> for OverlayStyle {
    fn from(config: &OverlayConfig) -> Self {
        Self {
            marker_radius: config.marker_radius,
            marker_color: config.marker_rgb(),
            stroke_color: config.stroke_rgb(),
            stroke_width: config.stroke_width.max(1),
        }
    }
}

fn drawn(result: Result<(), Infallible>) {
    match result {
        Ok(()) => {}
        Err(infallible) => match infallible {},
    }
}

fn to_point(transform: &PixelTransform, landmark: Landmark) -> Point {
    let p = transform.to_pixel(landmark);
    Point::new(p.x.round() as i32, p.y.round() as i32)
}

/// Marker and path layers sized to the video
pub struct Overlay {
    markers: Layer,
    path: Layer,
    style: OverlayStyle,
}

impl Overlay {
    pub fn new(style: OverlayStyle) -> Self {
        Self {
            markers: Layer::new(0, 0),
            path: Layer::new(0, 0),
            style,
        }
    }

    /// Match both backing buffers to the video's capture size
    pub fn resize(&mut self, width: u32, height: u32) {
        self.markers.resize(width, height);
        self.path.resize(width, height);
    }

    pub fn markers(&self) -> &Layer {
        &self.markers
    }

    pub fn path(&self) -> &Layer {
        &self.path
    }

    /// Redraw the marker layer from this frame's hands only.
    pub fn draw_markers(&mut self, hands: &[HandObservation]) {
        self.markers.clear();
        let transform = self.markers.transform();
        let diameter = self.style.marker_radius * 2 + 1;
        let fill = PrimitiveStyle::with_fill(self.style.marker_color);

        for hand in hands {
            for &landmark in &hand.landmarks {
                let center = to_point(&transform, landmark);
                drawn(
                    Circle::with_center(center, diameter)
                        .into_styled(fill)
                        .draw(&mut self.markers),
                );
            }
        }
    }

    /// Redraw the path layer as one polyline through `points` in order.
    ///
    /// Fewer than two points leave the layer blank.
    pub fn draw_path(&mut self, points: &[Landmark]) {
        self.path.clear();
        if points.len() < 2 {
            return;
        }

        let transform = self.path.transform();
        let vertices: Vec<Point> = points.iter().map(|&lm| to_point(&transform, lm)).collect();
        drawn(
            Polyline::new(&vertices)
                .into_styled(PrimitiveStyle::with_stroke(
                    self.style.stroke_color,
                    self.style.stroke_width,
                ))
                .draw(&mut self.path),
        );
    }
}
