//! Monitor capture source.
//!
//! Wraps `xcap` monitor enumeration and returns frames as RGB8 buffers.
//! Each call re-enumerates monitors so hot-plugged or re-ordered displays do
//! not invalidate a long-lived source.

use anyhow::{Context, Result, bail};
use image::{DynamicImage, RgbImage};
use tracing::trace;
use xcap::Monitor;

use super::ScreenSource;

/// Captures a single display, selected by index (0 is the first monitor
/// reported by the OS).
#[derive(Debug, Clone)]
pub struct MonitorSource {
    display: usize,
}

impl MonitorSource {
    pub fn new(display: usize) -> Self {
        Self { display }
    }

    pub fn display(&self) -> usize {
        self.display
    }
}

impl Default for MonitorSource {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ScreenSource for MonitorSource {
    fn capture(&mut self) -> Result<RgbImage> {
        let monitors = Monitor::all().context("Failed to enumerate monitors")?;
        if monitors.is_empty() {
            bail!("No monitors available");
        }
        let Some(monitor) = monitors.get(self.display) else {
            bail!(
                "Display {} not found ({} available)",
                self.display,
                monitors.len()
            );
        };
        let rgba = monitor
            .capture_image()
            .with_context(|| format!("Failed to capture display {}", self.display))?;
        trace!(
            target: "pixelbot::providers",
            display = self.display,
            width = rgba.width(),
            height = rgba.height(),
            "Captured frame"
        );
        Ok(DynamicImage::ImageRgba8(rgba).to_rgb8())
    }
}
