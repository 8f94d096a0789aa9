//! Common types and utilities shared across Ally crates.
//!
//! This crate holds the handful of value types that several crates need to
//! agree on (viewport geometry, page readiness conditions), the shared error
//! type, and the observability helpers. It stays dependency-light so every
//! crate in the workspace can pull it in.
//!
//! # Overview
//!
//! - [`Viewport`]: Visible page area the agent is allowed to act on
//! - [`WaitUntil`]: Page readiness condition awaited before screenshots
//! - [`BrowserEngine`]: Which browser family a session drives
//! - [`observability`]: Centralised tracing/logging initialisation
//! - [`AllyError`] and [`Result`]: Shared error handling
//!
//! # Examples
//!
//! ```rust
//! use ally_common::Viewport;
//!
//! let viewport = Viewport::default();
//! assert_eq!((viewport.width, viewport.height), (1024, 768));
//! assert!(viewport.contains(1024, 768));
//! assert!(!viewport.contains(1025, 10));
//! ```
use serde::{Deserialize, Serialize};

pub mod observability;

/// Accepted screenshot streaming rates in frames per second, inclusive.
pub const FRAME_RATE_RANGE: std::ops::RangeInclusive<u32> = 1..=30;

/// Size of the browser's visible page area in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Whether `(x, y)` lies inside the viewport. Both edges are inclusive.
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x <= self.width && y <= self.height
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 768,
        }
    }
}

/// Browser family driven through WebDriver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserEngine {
    #[default]
    Chrome,
    Firefox,
}

/// Page readiness condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitUntil {
    /// The `load` event has fired.
    Load,
    /// The DOM has been parsed.
    DomContentLoaded,
    /// No network activity for a short quiet period.
    NetworkIdle,
}

impl WaitUntil {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitUntil::Load => "load",
            WaitUntil::DomContentLoaded => "domcontentloaded",
            WaitUntil::NetworkIdle => "networkidle",
        }
    }
}

/// Error types used across the Ally system.
#[derive(thiserror::Error, Debug)]
pub enum AllyError {
    /// An agent run failed to complete.
    #[error("Agent error: {0}")]
    Agent(String),

    /// A driver (browser, network, etc.) reported an error.
    #[error("Driver error: {0}")]
    Driver(#[from] anyhow::Error),

    /// Configuration was incomplete or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The model provider rejected a request or returned garbage.
    #[error("Model error: {0}")]
    Model(String),

    /// An operation needed a browser session but none is running.
    #[error("Browser session is not started")]
    SessionNotStarted,

    /// A task is already running on this session.
    #[error("An agent task is already running")]
    TaskInProgress,

    /// Streaming frame rate outside the accepted range.
    #[error("Frame rate must be between 1 and 30 fps, got {0}")]
    InvalidFrameRate(u32),
}

/// Convenient alias for results that use [`AllyError`].
pub type Result<T> = std::result::Result<T, AllyError>;
