use crate::traits::BrowserOptions;
use ally_common::BrowserEngine;
use serde_json::json;
use webdriver::capabilities::Capabilities;

/// Chrome command-line arguments for a session.
pub fn chrome_arguments(options: &BrowserOptions) -> Vec<String> {
    let mut args = vec![
        "--disable-infobars".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--no-sandbox".to_string(),
        "--disable-extensions".to_string(),
        format!(
            "--window-size={},{}",
            options.viewport.width, options.viewport.height
        ),
    ];
    if options.headless {
        args.push("--headless=new".to_string());
        args.push("--disable-gpu".to_string());
    }
    args
}

pub fn firefox_arguments(options: &BrowserOptions) -> Vec<String> {
    let mut args = vec![
        format!("--width={}", options.viewport.width),
        format!("--height={}", options.viewport.height),
    ];
    if options.headless {
        args.push("-headless".to_string());
    }
    args
}

/// WebDriver session capabilities for the configured engine.
pub fn build_capabilities(options: &BrowserOptions) -> Capabilities {
    let mut caps = Capabilities::new();
    match options.engine {
        BrowserEngine::Chrome => {
            caps.insert("browserName".to_string(), json!("chrome"));
            caps.insert(
                "goog:chromeOptions".to_string(),
                json!({ "args": chrome_arguments(options) }),
            );
        }
        BrowserEngine::Firefox => {
            caps.insert("browserName".to_string(), json!("firefox"));
            caps.insert(
                "moz:firefoxOptions".to_string(),
                json!({ "args": firefox_arguments(options) }),
            );
        }
    }
    caps
}

#[cfg(test)]
mod tests {
    use super::*;
    use ally_common::Viewport;

    #[test]
    fn headless_chrome_gets_new_headless_mode() {
        let options = BrowserOptions {
            headless: true,
            viewport: Viewport::new(1280, 800),
            ..BrowserOptions::default()
        };
        let caps = build_capabilities(&options);
        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();
        assert!(args.contains(&json!("--headless=new")));
        assert!(args.contains(&json!("--window-size=1280,800")));
        assert!(!caps.contains_key("moz:firefoxOptions"));
    }

    #[test]
    fn firefox_uses_moz_options() {
        let options = BrowserOptions {
            engine: BrowserEngine::Firefox,
            ..BrowserOptions::default()
        };
        let caps = build_capabilities(&options);
        assert_eq!(caps["browserName"], json!("firefox"));
        let args = caps["moz:firefoxOptions"]["args"].as_array().unwrap();
        assert!(!args.contains(&json!("-headless")));
        assert!(args.contains(&json!("--width=1024")));
    }
}
