use ally_actors::{SamplingOptions, SessionConfig, SessionCoordinator};
use ally_config::{AllyConfig, ModelConfig};
use ally_drivers::{BrowserLauncher, BrowserOptions, WebDriverLauncher};
use ally_llm::anthropic::AnthropicClient;
use ally_llm::prompt::system_prompt_for_today;
use ally_llm::traits::ModelClient;
use anyhow::Result;
use std::sync::Arc;

pub fn build_model_client(cfg: &ModelConfig) -> Result<Arc<dyn ModelClient>> {
    match cfg {
        ModelConfig::Anthropic {
            model,
            auth_token,
            endpoint,
            max_tokens,
            computer_use_beta,
        } => {
            let client = AnthropicClient::new(endpoint, auth_token, model.clone())?
                .with_max_tokens(*max_tokens)
                .with_computer_use_beta(computer_use_beta.clone());
            Ok(Arc::new(client))
        }
    }
}

pub fn session_config(cfg: &AllyConfig) -> SessionConfig {
    let browser = &cfg.browser;
    let agent = &cfg.agent;
    SessionConfig {
        browser: BrowserOptions {
            webdriver_url: browser.webdriver_url.clone(),
            engine: browser.engine,
            headless: browser.headless,
            viewport: browser.viewport,
        },
        start_url: browser.start_url.clone(),
        use_cursor: browser.use_cursor,
        screenshot_wait_until: browser.screenshot_wait_until,
        sampling: SamplingOptions {
            system_prompt: agent
                .system_prompt
                .clone()
                .unwrap_or_else(system_prompt_for_today),
            only_n_most_recent_images: agent.only_n_most_recent_images,
            min_removal_chunk: agent.min_removal_chunk,
            max_turns: agent.max_turns,
            prompt_caching: agent.prompt_caching,
        },
        fps: cfg.streaming.fps,
        stream_on_start: cfg.streaming.start_on_launch,
    }
}

pub fn build_coordinator(
    cfg: &AllyConfig,
    launcher: Arc<dyn BrowserLauncher>,
) -> Result<SessionCoordinator> {
    let model = build_model_client(&cfg.model)?;
    Ok(SessionCoordinator::new(launcher, model, session_config(cfg)))
}

pub fn webdriver_launcher() -> Arc<dyn BrowserLauncher> {
    Arc::new(WebDriverLauncher)
}
