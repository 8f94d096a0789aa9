use ally_common::{BrowserEngine, Viewport, WaitUntil};
use anyhow::Result;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// Primitive operations on one live browser page.
///
/// Coordinates are CSS pixels relative to the viewport. Key names use the
/// browser vocabulary (`Enter`, `ArrowLeft`, `Control`, `F5`, `a`, ...).
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// PNG bytes of the visible page.
    async fn screenshot(&self) -> Result<Vec<u8>>;

    async fn mouse_move(&self, x: u32, y: u32) -> Result<()>;

    /// Move to `(x, y)` and click `count` times.
    async fn mouse_click(&self, x: u32, y: u32, button: MouseButton, count: u32) -> Result<()>;

    async fn keyboard_down(&self, key: &str) -> Result<()>;

    async fn keyboard_up(&self, key: &str) -> Result<()>;

    async fn keyboard_press(&self, key: &str) -> Result<()>;

    /// Type literal text into whatever has focus.
    async fn keyboard_type(&self, text: &str) -> Result<()>;

    async fn goto(&self, url: &str) -> Result<()>;

    async fn go_back(&self) -> Result<()>;

    async fn viewport_size(&self) -> Result<Viewport>;

    /// Wait until the page reaches `condition`; `None` means [`WaitUntil::Load`].
    async fn wait_for_ready(&self, condition: Option<WaitUntil>) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// End the browser session. The driver is unusable afterwards.
    async fn close(&self) -> Result<()>;
}

/// Settings for starting a browser.
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub webdriver_url: String,
    pub engine: BrowserEngine,
    pub headless: bool,
    pub viewport: Viewport,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            engine: BrowserEngine::Chrome,
            headless: false,
            viewport: Viewport::default(),
        }
    }
}

/// Creates drivers for new sessions.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, options: &BrowserOptions) -> Result<Box<dyn BrowserDriver>>;
}
