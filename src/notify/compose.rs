//! Product image composition onto a branded template
//!
//! Composition is CPU-bound, so the monitor runs it on the blocking pool
//! under a timeout and falls back to the raw image when it fails or is slow.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Fraction of the template's shorter side the product image may cover
const PRODUCT_SCALE: f32 = 0.8;

/// Composes a product photo into a notification image
pub trait ImageCompositor: Send + Sync {
    /// Composed PNG bytes, or `None` on any decode/encode failure
    fn compose(&self, product: &[u8]) -> Option<Vec<u8>>;
}

/// Pastes the product photo, scaled to fit, at the centre of a template
pub struct OverlayCompositor {
    template: DynamicImage,
}

impl OverlayCompositor {
    pub fn new(template: DynamicImage) -> Self {
        Self { template }
    }

    pub fn from_bytes(template: &[u8]) -> Result<Self, image::ImageError> {
        Ok(Self::new(image::load_from_memory(template)?))
    }

    pub fn from_path(path: &Path) -> Result<Self, image::ImageError> {
        Ok(Self::new(image::open(path)?))
    }
}

impl ImageCompositor for OverlayCompositor {
    fn compose(&self, product: &[u8]) -> Option<Vec<u8>> {
        let product = match image::load_from_memory(product) {
            Ok(img) => img,
            Err(e) => {
                tracing::debug!("Cannot decode product image: {}", e);
                return None;
            }
        };

        let (tw, th) = self.template.dimensions();
        let (pw, ph) = product.dimensions();
        if tw == 0 || th == 0 || pw == 0 || ph == 0 {
            return None;
        }

        let max_side = (tw.min(th) as f32 * PRODUCT_SCALE) as u32;
        let scale = (max_side as f32 / pw.max(ph) as f32).min(1.0);
        let (nw, nh) = (
            ((pw as f32 * scale) as u32).max(1),
            ((ph as f32 * scale) as u32).max(1),
        );
        let resized = product.resize(nw, nh, FilterType::Lanczos3);

        let mut canvas = self.template.to_rgba8();
        let x = (tw as i64 - resized.width() as i64) / 2;
        let y = (th as i64 - resized.height() as i64) / 2;
        imageops::overlay(&mut canvas, &resized.to_rgba8(), x, y);

        let mut out = Cursor::new(Vec::new());
        match DynamicImage::ImageRgba8(canvas).write_to(&mut out, ImageFormat::Png) {
            Ok(()) => Some(out.into_inner()),
            Err(e) => {
                tracing::debug!("Cannot encode composed image: {}", e);
                None
            }
        }
    }
}

/// Run `compositor` on the blocking pool, giving up after `limit`
pub async fn compose_with_timeout(
    compositor: Arc<dyn ImageCompositor>,
    product: Vec<u8>,
    limit: Duration,
) -> Option<Vec<u8>> {
    let task = tokio::task::spawn_blocking(move || compositor.compose(&product));
    match tokio::time::timeout(limit, task).await {
        Ok(Ok(composed)) => composed,
        Ok(Err(e)) => {
            tracing::warn!("Image composition task failed: {}", e);
            None
        }
        Err(_) => {
            tracing::warn!("Image composition exceeded {:?}", limit);
            None
        }
    }
}
