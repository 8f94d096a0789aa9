//! Browser driver layer.
//!
//! Everything above this crate talks to a page through [`BrowserDriver`], a
//! small set of input, navigation and capture primitives. The production
//! implementation wraps a `fantoccini` WebDriver session.
//!
//! - [`traits`]: [`BrowserDriver`], [`BrowserLauncher`] and [`BrowserOptions`]
//! - [`ally_browser::driver::AllyDriver`]: WebDriver-backed driver
//! - [`ally_browser::capabilities`]: Chrome and Firefox session capabilities
//! - [`ally_browser::keys`]: browser key names to WebDriver code points
//! - `testing` (feature `test-util`): scripted in-memory driver
pub mod ally_browser;
pub mod traits;

#[cfg(feature = "test-util")]
pub mod testing;

pub use ally_browser::driver::{AllyDriver, WebDriverLauncher};
pub use traits::{BrowserDriver, BrowserLauncher, BrowserOptions, MouseButton};
