use anyhow::{Context, Result};
use enigo::Keyboard as _;
use enigo::Mouse as _;
use enigo::{Button as EButton, Coordinate, Direction, Enigo, Key, Settings};
use std::thread;
use std::time::Duration;
use tracing::{info, trace};

use super::{InputInjector, MouseButton};

/// Upper bound on interpolation steps for an animated mouse move.
const MAX_MOVE_STEPS: u32 = 120;

/// Enigo-backed input injection with optional dry-run mode.
/// In dry-run mode, intended input is only logged and no device is touched;
/// Enigo is never even initialized.
pub struct EnigoInjector {
    dry_run: bool,
    enigo: Option<Enigo>,
}

impl EnigoInjector {
    /// Create a new injector.
    /// - dry_run: when true, only logs instead of simulating real input.
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            enigo: None,
        }
    }

    /// Returns whether the injector is currently in dry-run mode.
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Enable or disable dry-run mode dynamically.
    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.dry_run = dry_run;
    }

    fn ensure_enigo(&mut self) -> Result<&mut Enigo> {
        if self.enigo.is_none() {
            trace!(target: "pixelbot::providers", "Initializing Enigo");
            self.enigo =
                Some(Enigo::new(&Settings::default()).context("Failed to initialize Enigo")?);
        }
        Ok(self.enigo.as_mut().expect("Enigo must be initialized"))
    }
}

impl InputInjector for EnigoInjector {
    fn click(
        &mut self,
        x: i32,
        y: i32,
        button: MouseButton,
        clicks: u32,
        interval: Duration,
    ) -> Result<()> {
        let clicks = clicks.max(1);
        if self.dry_run {
            info!(target: "pixelbot::providers", x, y, ?button, clicks, "DRY-RUN click");
            return Ok(());
        }
        let enigo = self.ensure_enigo()?;
        trace!(target: "pixelbot::providers", x, y, ?button, clicks, "click");
        enigo.move_mouse(x, y, Coordinate::Abs)?;
        let btn = map_mouse_button(button);
        for i in 0..clicks {
            enigo.button(btn, Direction::Click)?;
            if i + 1 < clicks {
                thread::sleep(interval);
            }
        }
        Ok(())
    }

    fn move_mouse(&mut self, x: i32, y: i32, duration: Duration) -> Result<()> {
        if self.dry_run {
            info!(target: "pixelbot::providers", x, y, ?duration, "DRY-RUN move_mouse");
            return Ok(());
        }
        let enigo = self.ensure_enigo()?;
        trace!(target: "pixelbot::providers", x, y, ?duration, "move_mouse");
        if duration.is_zero() {
            enigo.move_mouse(x, y, Coordinate::Abs)?;
            return Ok(());
        }

        // Animate with linear interpolation from the current position.
        let (sx, sy) = enigo.location()?;
        let steps = ((duration.as_secs_f64() * 60.0).ceil() as u32).clamp(1, MAX_MOVE_STEPS);
        let pause = duration / steps;
        for k in 1..=steps {
            let t = k as f64 / steps as f64;
            let ix = sx + ((x - sx) as f64 * t).round() as i32;
            let iy = sy + ((y - sy) as f64 * t).round() as i32;
            enigo.move_mouse(ix, iy, Coordinate::Abs)?;
            thread::sleep(pause);
        }
        Ok(())
    }

    fn press_key(&mut self, key: &str) -> Result<()> {
        if self.dry_run {
            info!(target: "pixelbot::providers", %key, "DRY-RUN press_key");
            return Ok(());
        }
        let parsed =
            parse_key(key).with_context(|| format!("Unrecognized key name '{key}'"))?;
        let enigo = self.ensure_enigo()?;
        trace!(target: "pixelbot::providers", %key, "press_key");
        enigo.key(parsed, Direction::Click)?;
        Ok(())
    }

    fn type_text(&mut self, text: &str, interval: Duration) -> Result<()> {
        if self.dry_run {
            info!(target: "pixelbot::providers", %text, ?interval, "DRY-RUN type_text");
            return Ok(());
        }
        let enigo = self.ensure_enigo()?;
        trace!(target: "pixelbot::providers", %text, "type_text");
        if interval.is_zero() {
            enigo.text(text)?;
            return Ok(());
        }
        let mut buf = [0u8; 4];
        for (i, ch) in text.chars().enumerate() {
            if i > 0 {
                thread::sleep(interval);
            }
            enigo.text(ch.encode_utf8(&mut buf))?;
        }
        Ok(())
    }
}

fn map_mouse_button(btn: MouseButton) -> EButton {
    match btn {
        MouseButton::Left => EButton::Left,
        MouseButton::Middle => EButton::Middle,
        MouseButton::Right => EButton::Right,
    }
}

/// Resolve a key name to an Enigo key. Names are case-insensitive; a single
/// character falls through to a unicode key press.
fn parse_key(name: &str) -> Option<Key> {
    let lower = name.trim().to_ascii_lowercase();
    let key = match lower.as_str() {
        "enter" | "return" => Key::Return,
        "tab" => Key::Tab,
        "esc" | "escape" => Key::Escape,
        "space" => Key::Space,
        "backspace" => Key::Backspace,
        "delete" | "del" => Key::Delete,
        "home" => Key::Home,
        "end" => Key::End,
        "pageup" => Key::PageUp,
        "pagedown" => Key::PageDown,
        "up" => Key::UpArrow,
        "down" => Key::DownArrow,
        "left" => Key::LeftArrow,
        "right" => Key::RightArrow,
        "shift" => Key::Shift,
        "ctrl" | "control" => Key::Control,
        "alt" => Key::Alt,
        "meta" | "win" | "cmd" | "super" => Key::Meta,
        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,
        _ => {
            let mut chars = name.chars();
            let first = chars.next()?;
            if chars.next().is_some() {
                return None;
            }
            Key::Unicode(first)
        }
    };
    Some(key)
}
