//! Scripted in-memory driver for tests.
//!
//! [`ScriptedDriver`] records every side-effecting call in order and can be
//! told to fail specific calls. Clones share state, so a test can keep one
//! handle while the code under test owns another.
use crate::traits::{BrowserDriver, BrowserLauncher, BrowserOptions, MouseButton};
use ally_common::{Viewport, WaitUntil};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Screenshot,
    MouseMove { x: u32, y: u32 },
    MouseClick { x: u32, y: u32, button: MouseButton, count: u32 },
    KeyDown(String),
    KeyUp(String),
    KeyPress(String),
    Type(String),
    Goto(String),
    GoBack,
    WaitForReady(Option<WaitUntil>),
    Close,
}

struct State {
    viewport: Viewport,
    device_scale: u32,
    calls: Mutex<Vec<DriverCall>>,
    history: Mutex<Vec<String>>,
    failures: Mutex<Vec<(DriverCall, String)>>,
}

#[derive(Clone)]
pub struct ScriptedDriver {
    state: Arc<State>,
}

impl Default for ScriptedDriver {
    fn default() -> Self {
        Self::new(Viewport::default())
    }
}

impl ScriptedDriver {
    pub fn new(viewport: Viewport) -> Self {
        Self::with_device_scale(viewport, 1)
    }

    /// Screenshots are captured at `scale` times the viewport, like a HiDPI display.
    pub fn with_device_scale(viewport: Viewport, scale: u32) -> Self {
        Self {
            state: Arc::new(State {
                viewport,
                device_scale: scale.max(1),
                calls: Mutex::new(Vec::new()),
                history: Mutex::new(vec!["about:blank".to_string()]),
                failures: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Make the next matching call fail with `message`. The call is still recorded.
    pub fn fail_on(&self, call: DriverCall, message: impl Into<String>) {
        lock(&self.state.failures).push((call, message.into()));
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        lock(&self.state.calls).clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.state.calls).clear();
    }

    fn record(&self, call: DriverCall) -> Result<()> {
        lock(&self.state.calls).push(call.clone());
        let mut failures = lock(&self.state.failures);
        match failures.iter().position(|(c, _)| *c == call) {
            Some(idx) => {
                let (_, message) = failures.remove(idx);
                Err(anyhow!(message))
            }
            None => Ok(()),
        }
    }

    fn png(&self) -> Result<Vec<u8>> {
        let scale = self.state.device_scale;
        let frame = RgbaImage::from_pixel(
            self.state.viewport.width * scale,
            self.state.viewport.height * scale,
            Rgba([250, 250, 250, 255]),
        );
        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(frame).write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)?;
        Ok(buf)
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl BrowserDriver for ScriptedDriver {
    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.record(DriverCall::Screenshot)?;
        self.png()
    }

    async fn mouse_move(&self, x: u32, y: u32) -> Result<()> {
        self.record(DriverCall::MouseMove { x, y })
    }

    async fn mouse_click(&self, x: u32, y: u32, button: MouseButton, count: u32) -> Result<()> {
        self.record(DriverCall::MouseClick { x, y, button, count })
    }

    async fn keyboard_down(&self, key: &str) -> Result<()> {
        self.record(DriverCall::KeyDown(key.to_string()))
    }

    async fn keyboard_up(&self, key: &str) -> Result<()> {
        self.record(DriverCall::KeyUp(key.to_string()))
    }

    async fn keyboard_press(&self, key: &str) -> Result<()> {
        self.record(DriverCall::KeyPress(key.to_string()))
    }

    async fn keyboard_type(&self, text: &str) -> Result<()> {
        self.record(DriverCall::Type(text.to_string()))
    }

    async fn goto(&self, url: &str) -> Result<()> {
        self.record(DriverCall::Goto(url.to_string()))?;
        lock(&self.state.history).push(url.to_string());
        Ok(())
    }

    async fn go_back(&self) -> Result<()> {
        self.record(DriverCall::GoBack)?;
        let mut history = lock(&self.state.history);
        if history.len() < 2 {
            return Err(anyhow!("no previous page in history"));
        }
        history.pop();
        Ok(())
    }

    async fn viewport_size(&self) -> Result<Viewport> {
        Ok(self.state.viewport)
    }

    async fn wait_for_ready(&self, condition: Option<WaitUntil>) -> Result<()> {
        self.record(DriverCall::WaitForReady(condition))
    }

    async fn current_url(&self) -> Result<String> {
        Ok(lock(&self.state.history)
            .last()
            .cloned()
            .unwrap_or_default())
    }

    async fn close(&self) -> Result<()> {
        self.record(DriverCall::Close)
    }
}

/// Hands out clones of one [`ScriptedDriver`] and counts launches.
#[derive(Clone, Default)]
pub struct ScriptedLauncher {
    pub driver: ScriptedDriver,
    launches: Arc<AtomicUsize>,
}

impl ScriptedLauncher {
    pub fn new(driver: ScriptedDriver) -> Self {
        Self {
            driver,
            launches: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for ScriptedLauncher {
    async fn launch(&self, _options: &BrowserOptions) -> Result<Box<dyn BrowserDriver>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.driver.clone()))
    }
}
