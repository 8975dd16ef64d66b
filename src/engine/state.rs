use anyhow::{Context, Result};
use image::RgbImage;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::providers::{InputInjector, MatchMethod, MouseButton, PatternMatcher, ScreenSource};
use crate::script::Value;

/// Location and score of the most recent successful pattern search.
///
/// Exactly one "last" match exists at a time: a successful find replaces it,
/// a failed find clears it. `x`/`y` are the top-left corner of the matched
/// window in screen coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
    pub score: f64,
}

/// Cooperative stop signal, shared between the controlling thread and the
/// background run. This is the only piece of runtime state that crosses the
/// controller/runner boundary, so it lives outside the state mutex as a
/// plain atomic.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear_stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn should_stop(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The engine's mutable working memory: variable store, template registry,
/// screen-capture cache and last match result, plus the capability providers
/// every operation is carried out through.
///
/// Single-writer by contract: only the active run (or the controlling thread
/// while no run is active) mutates it. Cross-thread sharing happens behind
/// one mutex, locked per operation.
pub struct RuntimeState {
    vars: BTreeMap<String, Value>,
    templates: BTreeMap<String, RgbImage>,
    capture: Option<RgbImage>,
    last_match: Option<MatchResult>,
    screen: Box<dyn ScreenSource>,
    matcher: Box<dyn PatternMatcher>,
    input: Box<dyn InputInjector>,
}

impl RuntimeState {
    pub fn new(
        screen: Box<dyn ScreenSource>,
        matcher: Box<dyn PatternMatcher>,
        input: Box<dyn InputInjector>,
    ) -> Self {
        Self {
            vars: BTreeMap::new(),
            templates: BTreeMap::new(),
            capture: None,
            last_match: None,
            screen,
            matcher,
            input,
        }
    }

    /// State wired to the real screen, matcher and injector.
    pub fn with_default_providers(dry_run: bool, display: usize) -> Self {
        use crate::providers::{EnigoInjector, MonitorSource, TemplateMatcher};
        Self::new(
            Box::new(MonitorSource::new(display)),
            Box::new(TemplateMatcher::new()),
            Box::new(EnigoInjector::new(dry_run)),
        )
    }

    // ---- capture ----

    /// Capture a fresh frame, always overwriting the cache.
    pub fn capture_screen(&mut self) -> Result<&RgbImage> {
        let frame = self.screen.capture().context("Screen capture failed")?;
        debug!(
            target: "pixelbot::engine",
            width = frame.width(),
            height = frame.height(),
            "Captured screen"
        );
        Ok(self.capture.insert(frame))
    }

    /// Capture only if the cache is empty; never re-captures an existing frame.
    fn ensure_capture(&mut self) -> Result<()> {
        if self.capture.is_none() {
            self.capture_screen()?;
        }
        Ok(())
    }

    pub fn has_capture(&self) -> bool {
        self.capture.is_some()
    }

    // ---- templates ----

    /// Load and register an image pattern. Returns false (no mutation) if the
    /// file is missing or unreadable; otherwise overwrites any prior entry
    /// with the same name.
    pub fn load_template(&mut self, name: &str, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        match image::open(path) {
            Ok(img) => {
                debug!(target: "pixelbot::engine", %name, path = %path.display(), "Loaded template");
                self.templates.insert(name.to_string(), img.to_rgb8());
                true
            }
            Err(err) => {
                warn!(
                    target: "pixelbot::engine",
                    %name, path = %path.display(), error = %err,
                    "Failed to load template"
                );
                false
            }
        }
    }

    /// Register an already-decoded pattern (authoring surfaces and tests).
    pub fn insert_template(&mut self, name: &str, image: RgbImage) {
        self.templates.insert(name.to_string(), image);
    }

    /// Remove a registered pattern. Returns whether it existed.
    pub fn remove_template(&mut self, name: &str) -> bool {
        self.templates.remove(name).is_some()
    }

    pub fn template_names(&self) -> Vec<String> {
        self.templates.keys().cloned().collect()
    }

    // ---- matching ----

    /// Search the capture cache (populated lazily if empty) for a registered
    /// template. A score at or above `threshold` sets and returns the match
    /// result; anything else clears it.
    pub fn find_template(
        &mut self,
        name: &str,
        threshold: f64,
        method: MatchMethod,
    ) -> Result<Option<MatchResult>> {
        self.ensure_capture()?;
        if !self.templates.contains_key(name) {
            warn!(target: "pixelbot::engine", %name, "Template is not registered");
            self.last_match = None;
            return Ok(None);
        }
        let source = self
            .capture
            .as_ref()
            .expect("capture cache was just filled");
        let template = &self.templates[name];
        let raw = self.matcher.best_match(source, template, method)?;
        let score = method.normalize(raw.score);
        trace!(
            target: "pixelbot::engine",
            %name, score, threshold, x = raw.x, y = raw.y,
            "Template search finished"
        );

        if score >= threshold {
            let result = MatchResult {
                name: name.to_string(),
                x: raw.x as i32,
                y: raw.y as i32,
                w: template.width(),
                h: template.height(),
                score,
            };
            self.last_match = Some(result.clone());
            Ok(Some(result))
        } else {
            self.last_match = None;
            Ok(None)
        }
    }

    pub fn last_match(&self) -> Option<&MatchResult> {
        self.last_match.as_ref()
    }

    // ---- input ----

    /// Click on the last match. Returns false (no injection) when no match is
    /// present. The click point is the match's top-left, shifted to its center
    /// when `center`, plus `offset`.
    pub fn click_match(
        &mut self,
        button: MouseButton,
        clicks: u32,
        interval: Duration,
        center: bool,
        offset: (i32, i32),
    ) -> Result<bool> {
        let Some(m) = &self.last_match else {
            return Ok(false);
        };
        let x = m.x + if center { (m.w / 2) as i32 } else { 0 } + offset.0;
        let y = m.y + if center { (m.h / 2) as i32 } else { 0 } + offset.1;
        self.input.click(x, y, button, clicks, interval)?;
        Ok(true)
    }

    pub fn click_at(
        &mut self,
        x: i32,
        y: i32,
        button: MouseButton,
        clicks: u32,
        interval: Duration,
    ) -> Result<()> {
        self.input.click(x, y, button, clicks, interval)
    }

    pub fn move_mouse(&mut self, x: i32, y: i32, duration: Duration) -> Result<()> {
        self.input.move_mouse(x, y, duration)
    }

    pub fn press_key(&mut self, key: &str) -> Result<()> {
        self.input.press_key(key)
    }

    pub fn type_text(&mut self, text: &str, interval: Duration) -> Result<()> {
        self.input.type_text(text, interval)
    }

    // ---- pixels ----

    /// Compare the cached frame's pixel at `(x, y)` against an RGB target.
    /// True only when all three channel differences are within `tolerance`
    /// (inclusive). Out-of-bounds coordinates are false, never an error.
    pub fn check_pixel(
        &mut self,
        x: i32,
        y: i32,
        r: u8,
        g: u8,
        b: u8,
        tolerance: u8,
    ) -> Result<bool> {
        self.ensure_capture()?;
        let frame = self
            .capture
            .as_ref()
            .expect("capture cache was just filled");
        if x < 0 || y < 0 || x as u32 >= frame.width() || y as u32 >= frame.height() {
            return Ok(false);
        }
        let p = frame.get_pixel(x as u32, y as u32);
        let tol = tolerance as i32;
        let within = |have: u8, want: u8| (have as i32 - want as i32).abs() <= tol;
        Ok(within(p[0], r) && within(p[1], g) && within(p[2], b))
    }

    // ---- variables ----

    pub fn set_var(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        trace!(target: "pixelbot::engine", %name, %value, "Set variable");
        self.vars.insert(name, value);
    }

    pub fn get_var(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn get_var_or<'a>(&'a self, name: &str, default: &'a Value) -> &'a Value {
        self.vars.get(name).unwrap_or(default)
    }

    pub fn remove_var(&mut self, name: &str) {
        self.vars.remove(name);
    }

    pub fn vars(&self) -> &BTreeMap<String, Value> {
        &self.vars
    }

    pub fn vars_snapshot(&self) -> BTreeMap<String, Value> {
        self.vars.clone()
    }

    /// New-script reset: clears the variable store and the last match.
    /// Loaded templates and the capture cache are kept.
    pub fn reset(&mut self) {
        self.vars.clear();
        self.last_match = None;
    }
}
