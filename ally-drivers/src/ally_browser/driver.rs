use crate::ally_browser::{capabilities::build_capabilities, keys::webdriver_key};
use crate::traits::{BrowserDriver, BrowserLauncher, BrowserOptions, MouseButton};
use ally_common::{Viewport, WaitUntil};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use fantoccini::actions::{
    InputSource, KeyAction, KeyActions, MouseActions, PointerAction, MOUSE_BUTTON_LEFT,
    MOUSE_BUTTON_MIDDLE, MOUSE_BUTTON_RIGHT,
};
use fantoccini::{Client, ClientBuilder};
use serde_json::Value;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

const DOUBLE_CLICK_PAUSE: Duration = Duration::from_millis(100);
const READY_POLL: Duration = Duration::from_millis(100);
const READY_TIMEOUT: Duration = Duration::from_secs(30);
const NETWORK_QUIET: Duration = Duration::from_millis(500);

const VIEWPORT_SCRIPT: &str = "return [window.innerWidth, window.innerHeight];";
const READY_STATE_SCRIPT: &str = "return document.readyState;";
const RESOURCE_COUNT_SCRIPT: &str = "return performance.getEntriesByType('resource').length;";

/// A live WebDriver session driving one browser window.
pub struct AllyDriver {
    pub client: Client,
}

impl AllyDriver {
    /// Open a session on the WebDriver service at `options.webdriver_url` and
    /// size the window so the page viewport matches `options.viewport`.
    pub async fn connect(options: &BrowserOptions) -> Result<Self> {
        let caps = build_capabilities(options);
        let client = ClientBuilder::native()
            .capabilities(caps)
            .connect(&options.webdriver_url)
            .await
            .with_context(|| format!("connecting to WebDriver at {}", options.webdriver_url))?;

        let driver = Self { client };
        driver.fit_viewport(options.viewport).await?;
        info!(
            target: "browser.page",
            engine = ?options.engine,
            headless = options.headless,
            width = options.viewport.width,
            height = options.viewport.height,
            "browser session opened"
        );
        Ok(driver)
    }

    /// Window size includes browser chrome, so measure the inner size once
    /// and grow the window by the difference.
    async fn fit_viewport(&self, target: Viewport) -> Result<()> {
        self.client
            .set_window_size(target.width, target.height)
            .await?;
        let inner = self.viewport_size().await?;
        if inner == target {
            return Ok(());
        }
        let width = target.width + target.width.saturating_sub(inner.width);
        let height = target.height + target.height.saturating_sub(inner.height);
        debug!(
            target: "browser.page",
            inner_width = inner.width,
            inner_height = inner.height,
            width,
            height,
            "correcting window size for browser chrome"
        );
        self.client.set_window_size(width, height).await?;
        Ok(())
    }

    async fn key_action(&self, key: &str, down: bool, up: bool) -> Result<()> {
        let value = webdriver_key(key).ok_or_else(|| anyhow!("unsupported key '{key}'"))?;
        let mut actions = KeyActions::new("keyboard".to_string());
        if down {
            actions = actions.then(KeyAction::Down { value });
        }
        if up {
            actions = actions.then(KeyAction::Up { value });
        }
        self.client.perform_actions(actions).await?;
        Ok(())
    }

    async fn resource_count(&self) -> Result<u64> {
        let value = self.client.execute(RESOURCE_COUNT_SCRIPT, vec![]).await?;
        Ok(value.as_u64().unwrap_or(0))
    }
}

fn button_code(button: MouseButton) -> u64 {
    match button {
        MouseButton::Left => MOUSE_BUTTON_LEFT,
        MouseButton::Right => MOUSE_BUTTON_RIGHT,
        MouseButton::Middle => MOUSE_BUTTON_MIDDLE,
    }
}

fn parse_viewport(value: &Value) -> Result<Viewport> {
    let dims = value
        .as_array()
        .filter(|a| a.len() == 2)
        .ok_or_else(|| anyhow!("unexpected viewport value: {value}"))?;
    let dim = |v: &Value| {
        v.as_f64()
            .map(|f| f as u32)
            .ok_or_else(|| anyhow!("viewport dimension is not a number: {v}"))
    };
    Ok(Viewport::new(dim(&dims[0])?, dim(&dims[1])?))
}

#[async_trait]
impl BrowserDriver for AllyDriver {
    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(self.client.screenshot().await?)
    }

    async fn mouse_move(&self, x: u32, y: u32) -> Result<()> {
        let actions = MouseActions::new("mouse".to_string()).then(PointerAction::MoveTo {
            duration: None,
            x: x.into(),
            y: y.into(),
        });
        self.client.perform_actions(actions).await?;
        Ok(())
    }

    async fn mouse_click(&self, x: u32, y: u32, button: MouseButton, count: u32) -> Result<()> {
        let button = button_code(button);
        let mut actions = MouseActions::new("mouse".to_string()).then(PointerAction::MoveTo {
            duration: None,
            x: x.into(),
            y: y.into(),
        });
        for n in 0..count {
            if n > 0 {
                actions = actions.then(PointerAction::Pause {
                    duration: DOUBLE_CLICK_PAUSE,
                });
            }
            actions = actions
                .then(PointerAction::Down { button })
                .then(PointerAction::Up { button });
        }
        self.client.perform_actions(actions).await?;
        Ok(())
    }

    async fn keyboard_down(&self, key: &str) -> Result<()> {
        self.key_action(key, true, false).await
    }

    async fn keyboard_up(&self, key: &str) -> Result<()> {
        self.key_action(key, false, true).await
    }

    async fn keyboard_press(&self, key: &str) -> Result<()> {
        self.key_action(key, true, true).await
    }

    async fn keyboard_type(&self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        let mut actions = KeyActions::new("keyboard".to_string());
        for value in text.chars() {
            actions = actions
                .then(KeyAction::Down { value })
                .then(KeyAction::Up { value });
        }
        self.client.perform_actions(actions).await?;
        Ok(())
    }

    async fn goto(&self, url: &str) -> Result<()> {
        debug!(target: "browser.page", %url, "navigating");
        self.client.goto(url).await?;
        Ok(())
    }

    async fn go_back(&self) -> Result<()> {
        self.client.back().await?;
        Ok(())
    }

    async fn viewport_size(&self) -> Result<Viewport> {
        let value = self.client.execute(VIEWPORT_SCRIPT, vec![]).await?;
        parse_viewport(&value)
    }

    async fn wait_for_ready(&self, condition: Option<WaitUntil>) -> Result<()> {
        let condition = condition.unwrap_or(WaitUntil::Load);
        let accepted: &[&str] = match condition {
            WaitUntil::DomContentLoaded => &["interactive", "complete"],
            WaitUntil::Load | WaitUntil::NetworkIdle => &["complete"],
        };
        let deadline = Instant::now() + READY_TIMEOUT;

        loop {
            let state = self.client.execute(READY_STATE_SCRIPT, vec![]).await?;
            if state.as_str().is_some_and(|s| accepted.contains(&s)) {
                break;
            }
            if Instant::now() >= deadline {
                bail!(
                    "timed out after {}s waiting for page state '{}'",
                    READY_TIMEOUT.as_secs(),
                    condition.as_str()
                );
            }
            sleep(READY_POLL).await;
        }

        if condition == WaitUntil::NetworkIdle {
            // No resource entries added for a full quiet period.
            let mut seen = self.resource_count().await?;
            loop {
                sleep(NETWORK_QUIET).await;
                let now = self.resource_count().await?;
                if now == seen || Instant::now() >= deadline {
                    break;
                }
                seen = now;
            }
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.client.current_url().await?.to_string())
    }

    async fn close(&self) -> Result<()> {
        self.client.clone().close().await?;
        info!(target: "browser.page", "browser session closed");
        Ok(())
    }
}

/// Launches [`AllyDriver`] sessions against a WebDriver service.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebDriverLauncher;

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn launch(&self, options: &BrowserOptions) -> Result<Box<dyn BrowserDriver>> {
        let driver = AllyDriver::connect(options).await?;
        Ok(Box::new(driver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn viewport_parses_fractional_dimensions() {
        let vp = parse_viewport(&json!([1024, 767.5])).unwrap();
        assert_eq!(vp, Viewport::new(1024, 767));
    }

    #[test]
    fn viewport_rejects_unexpected_shapes() {
        assert!(parse_viewport(&json!({"w": 1})).is_err());
        assert!(parse_viewport(&json!([1])).is_err());
        assert!(parse_viewport(&json!(["a", 2])).is_err());
    }

    #[test]
    fn buttons_map_to_webdriver_codes() {
        assert_eq!(button_code(MouseButton::Left), MOUSE_BUTTON_LEFT);
        assert_eq!(button_code(MouseButton::Middle), MOUSE_BUTTON_MIDDLE);
        assert_eq!(button_code(MouseButton::Right), MOUSE_BUTTON_RIGHT);
    }
}
