/*!
Capability providers (orchestration layer).

This module only defines the narrow contracts the engine calls through —
screen capture, pattern matching, input injection — plus the small shared
enums those contracts speak. Concrete implementations live in their own files:

- `capture.rs` -> `MonitorSource`    (xcap-backed monitor capture)
- `matcher.rs` -> `TemplateMatcher`  (sliding-window template matching)
- `input.rs`   -> `EnigoInjector`    (Enigo-backed mouse/keyboard, dry-run aware)

The engine owns no provider state beyond the trait objects; everything a
provider needs crosses the call boundary as arguments. Engine tests swap in
crate-internal mocks so no test ever touches a real screen or input device.

Adding a new provider backend:
1. Create `src/providers/your_backend.rs`
2. Implement the relevant trait
3. Expose with `pub use self::your_backend::YourBackend;`
*/

use anyhow::Result;
use image::RgbImage;
use std::time::Duration;

pub mod capture;
pub mod input;
pub mod matcher;

pub use capture::MonitorSource;
pub use input::EnigoInjector;
pub use matcher::TemplateMatcher;

/// Produces frames of the live screen. Every call must return a fresh frame.
pub trait ScreenSource: Send {
    fn capture(&mut self) -> Result<RgbImage>;
}

/// Searches a source frame for the best occurrence of a template.
///
/// The returned score is raw: its polarity (higher- or lower-is-better)
/// depends on the method. The engine normalizes to "higher is better, [0,1]"
/// before thresholding.
pub trait PatternMatcher: Send {
    fn best_match(
        &self,
        source: &RgbImage,
        template: &RgbImage,
        method: MatchMethod,
    ) -> Result<RawMatch>;
}

/// Injects mouse and keyboard input. All calls are synchronous and block for
/// their configured interval/duration.
pub trait InputInjector: Send {
    /// Move to `(x, y)` and click `clicks` times, sleeping `interval` between clicks.
    fn click(
        &mut self,
        x: i32,
        y: i32,
        button: MouseButton,
        clicks: u32,
        interval: Duration,
    ) -> Result<()>;

    /// Move the cursor to `(x, y)`, animating over `duration` when nonzero.
    fn move_mouse(&mut self, x: i32, y: i32, duration: Duration) -> Result<()>;

    /// Press and release a named key (e.g. "enter", "f5", "a").
    fn press_key(&mut self, key: &str) -> Result<()>;

    /// Type literal text, sleeping `interval` between characters when nonzero.
    fn type_text(&mut self, text: &str, interval: Duration) -> Result<()>;
}

/// Best raw match found by a [`PatternMatcher`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawMatch {
    /// Raw method-polarity score (see [`MatchMethod::normalize`]).
    pub score: f64,
    /// Top-left x of the best window in the source frame.
    pub x: u32,
    /// Top-left y of the best window in the source frame.
    pub y: u32,
}

/// Mouse button enumeration.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum MouseButton {
    #[default]
    Left,
    Middle,
    Right,
}

impl MouseButton {
    /// Parse a button name case-insensitively. Returns `None` for unknown names.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "left" => Some(MouseButton::Left),
            "middle" => Some(MouseButton::Middle),
            "right" => Some(MouseButton::Right),
            _ => None,
        }
    }
}

/// Template-matching method selection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum MatchMethod {
    /// Zero-mean normalized cross-correlation. Raw score in [-1, 1], higher is better.
    #[default]
    CcoeffNormed,
    /// Normalized squared difference. Raw score in [0, 1], lower is better.
    SqdiffNormed,
}

impl MatchMethod {
    /// Parse a method name case-insensitively. Returns `None` for unknown names.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "ccoeff" | "ccoeff_normed" => Some(MatchMethod::CcoeffNormed),
            "sqdiff" | "sqdiff_normed" => Some(MatchMethod::SqdiffNormed),
            _ => None,
        }
    }

    /// Map a raw score onto the uniform "higher is better, [0,1]" scale.
    /// Inverse-distance methods invert (score = 1 − distance).
    pub fn normalize(self, raw: f64) -> f64 {
        let score = match self {
            MatchMethod::CcoeffNormed => raw,
            MatchMethod::SqdiffNormed => 1.0 - raw,
        };
        score.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Mock providers shared by engine tests.

    use super::*;
    use std::sync::{Arc, Mutex};

    /// A screen source that always returns the same prepared frame and counts
    /// how often it was asked to capture.
    pub struct StaticScreen {
        frame: RgbImage,
        captures: Arc<Mutex<usize>>,
    }

    impl StaticScreen {
        pub fn new(frame: RgbImage) -> (Self, Arc<Mutex<usize>>) {
            let captures = Arc::new(Mutex::new(0));
            (
                Self {
                    frame,
                    captures: captures.clone(),
                },
                captures,
            )
        }
    }

    impl ScreenSource for StaticScreen {
        fn capture(&mut self) -> Result<RgbImage> {
            *self.captures.lock().unwrap() += 1;
            Ok(self.frame.clone())
        }
    }

    /// A screen source whose capture always fails.
    pub struct FailingScreen;

    impl ScreenSource for FailingScreen {
        fn capture(&mut self) -> Result<RgbImage> {
            anyhow::bail!("capture device unavailable")
        }
    }

    /// Everything a [`RecordingInjector`] was asked to do.
    #[derive(Debug, Clone, PartialEq)]
    pub enum InjectedEvent {
        Click {
            x: i32,
            y: i32,
            button: MouseButton,
            clicks: u32,
        },
        Move {
            x: i32,
            y: i32,
        },
        Key(String),
        Text(String),
    }

    /// An injector that records events instead of touching real devices.
    pub struct RecordingInjector {
        log: Arc<Mutex<Vec<InjectedEvent>>>,
    }

    impl RecordingInjector {
        pub fn new() -> (Self, Arc<Mutex<Vec<InjectedEvent>>>) {
            let log = Arc::new(Mutex::new(Vec::new()));
            (Self { log: log.clone() }, log)
        }
    }

    impl InputInjector for RecordingInjector {
        fn click(
            &mut self,
            x: i32,
            y: i32,
            button: MouseButton,
            clicks: u32,
            _interval: Duration,
        ) -> Result<()> {
            self.log.lock().unwrap().push(InjectedEvent::Click {
                x,
                y,
                button,
                clicks,
            });
            Ok(())
        }

        fn move_mouse(&mut self, x: i32, y: i32, _duration: Duration) -> Result<()> {
            self.log.lock().unwrap().push(InjectedEvent::Move { x, y });
            Ok(())
        }

        fn press_key(&mut self, key: &str) -> Result<()> {
            self.log.lock().unwrap().push(InjectedEvent::Key(key.into()));
            Ok(())
        }

        fn type_text(&mut self, text: &str, _interval: Duration) -> Result<()> {
            self.log.lock().unwrap().push(InjectedEvent::Text(text.into()));
            Ok(())
        }
    }

    /// Build a solid-color RGB frame.
    pub fn solid_frame(w: u32, h: u32, rgb: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(w, h, image::Rgb(rgb))
    }

    /// Build a frame with a contrasting rectangular patch at `(px, py)`.
    pub fn frame_with_patch(
        w: u32,
        h: u32,
        bg: [u8; 3],
        px: u32,
        py: u32,
        pw: u32,
        ph: u32,
        fg: [u8; 3],
    ) -> RgbImage {
        let mut img = solid_frame(w, h, bg);
        for y in py..(py + ph).min(h) {
            for x in px..(px + pw).min(w) {
                img.put_pixel(x, y, image::Rgb(fg));
            }
        }
        img
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn button_names_parse_case_insensitively() {
        assert_eq!(MouseButton::from_name("LEFT"), Some(MouseButton::Left));
        assert_eq!(MouseButton::from_name(" right "), Some(MouseButton::Right));
        assert_eq!(MouseButton::from_name("fourth"), None);
    }

    #[test]
    fn method_normalization_inverts_distance_and_clamps() {
        assert_eq!(MatchMethod::SqdiffNormed.normalize(0.0), 1.0);
        assert_eq!(MatchMethod::SqdiffNormed.normalize(1.0), 0.0);
        assert_eq!(MatchMethod::CcoeffNormed.normalize(0.97), 0.97);
        // Negative correlation clamps to zero rather than leaking out of range.
        assert_eq!(MatchMethod::CcoeffNormed.normalize(-0.4), 0.0);
    }
}
