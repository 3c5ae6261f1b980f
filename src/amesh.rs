use std::io::Cursor;

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Timelike};
use chrono_tz::Tz;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use reqwest::StatusCode;
use tracing::debug;

use crate::config::AmeshConfig;
use crate::error::{FetchError, Layer};

const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Overlay frames are published every five minutes.
const FRAME_INTERVAL_MINUTES: u32 = 5;

/// Overlay frame URL for `now`, with the minute floored to the frame interval.
pub fn overlay_url(mesh_url_prefix: &str, now: &DateTime<Tz>) -> String {
    format!(
        "{}/{:04}{:02}{:02}{:02}{:02}.gif",
        mesh_url_prefix.trim_end_matches('/'),
        now.year(),
        now.month(),
        now.day(),
        now.hour(),
        now.minute() / FRAME_INTERVAL_MINUTES * FRAME_INTERVAL_MINUTES
    )
}

/// Draw base, overlay and mask at the origin of a transparent canvas the
/// size of the overlay. Later layers win wherever they are opaque.
pub fn composite(base: &DynamicImage, overlay: &DynamicImage, mask: &DynamicImage) -> RgbaImage {
    let mut out = RgbaImage::new(overlay.width(), overlay.height());
    for layer in [base, overlay, mask] {
        draw_over(&mut out, &layer.to_rgba8());
    }
    out
}

/// Source-over `src` onto `dst` at the origin, clipped to both bounds.
fn draw_over(dst: &mut RgbaImage, src: &RgbaImage) {
    let width = dst.width().min(src.width());
    let height = dst.height().min(src.height());
    for y in 0..height {
        for x in 0..width {
            let d = dst.get_pixel_mut(x, y);
            *d = over(*src.get_pixel(x, y), *d);
        }
    }
}

fn div_round(n: u32, d: u32) -> u32 {
    (n + d / 2) / d
}

/// Integer Porter-Duff "over" on straight-alpha pixels. An opaque
/// destination stays exactly opaque.
fn over(src: Rgba<u8>, dst: Rgba<u8>) -> Rgba<u8> {
    let sa = u32::from(src[3]);
    match sa {
        0 => return dst,
        255 => return src,
        _ => {}
    }

    let da = u32::from(dst[3]);
    // Destination weight, still scaled by 255.
    let dw = div_round(da * (255 - sa), 255);
    let out_a = sa + dw;
    if out_a == 0 {
        return Rgba([0, 0, 0, 0]);
    }

    let mut out = [0u8; 4];
    for c in 0..3 {
        let premultiplied = u32::from(src[c]) * sa + u32::from(dst[c]) * dw;
        out[c] = div_round(premultiplied, out_a).min(255) as u8;
    }
    out[3] = out_a.min(255) as u8;
    Rgba(out)
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageFormat::Png)
        .context("Failed to encode composite as PNG")?;
    Ok(buf.into_inner())
}

/// Fetches the three radar layers for a point in time.
///
/// Every call hits the network for all layers; nothing is cached.
pub struct AmeshClient {
    client: reqwest::Client,
    config: AmeshConfig,
}

impl AmeshClient {
    pub fn new(config: AmeshConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, config })
    }

    /// Fetch and composite the radar image for `now`.
    ///
    /// The overlay is requested first so that a missing frame aborts before
    /// the base map and mask are downloaded or anything is decoded.
    pub async fn fetch_composite(&self, now: &DateTime<Tz>) -> Result<RgbaImage, FetchError> {
        let overlay_url = overlay_url(&self.config.mesh_url_prefix, now);
        let overlay_bytes = self.fetch(Layer::Overlay, &overlay_url).await?;
        let base_bytes = self.fetch(Layer::Base, &self.config.base_map_url).await?;
        let mask_bytes = self.fetch(Layer::Mask, &self.config.mask_url).await?;

        let base = decode(Layer::Base, &self.config.base_map_url, &base_bytes)?;
        let overlay = decode(Layer::Overlay, &overlay_url, &overlay_bytes)?;
        let mask = decode(Layer::Mask, &self.config.mask_url, &mask_bytes)?;

        Ok(composite(&base, &overlay, &mask))
    }

    async fn fetch(&self, layer: Layer, url: &str) -> Result<Vec<u8>, FetchError> {
        debug!("Fetching {} image: {}", layer, url);

        let transient = |source| FetchError::Transient {
            layer,
            url: url.to_string(),
            source,
        };

        let response = self.client.get(url).send().await.map_err(transient)?;

        if layer == Layer::Overlay && response.status() == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound {
                url: url.to_string(),
            });
        }

        let bytes = response
            .error_for_status()
            .map_err(transient)?
            .bytes()
            .await
            .map_err(transient)?;

        Ok(bytes.to_vec())
    }
}

fn decode(layer: Layer, url: &str, bytes: &[u8]) -> Result<DynamicImage, FetchError> {
    image::load_from_memory(bytes).map_err(|source| FetchError::Decode {
        layer,
        url: url.to_string(),
        source,
    })
}
