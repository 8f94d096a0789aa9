//! Single owner of the live browser page.
//!
//! Tool actions and stream captures both reach the browser through the
//! [`PageActor`] mailbox, so commands run one at a time in arrival order.
use crate::actor::{spawn_actor_with_shutdown, Actor, ActorHandle, Addr, Context};
use ally_common::{Viewport, WaitUntil};
use ally_drivers::{BrowserDriver, MouseButton};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const PAGE_MAILBOX: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCmd {
    Screenshot,
    MouseMove { x: u32, y: u32 },
    MouseClick { x: u32, y: u32, button: MouseButton, count: u32 },
    KeyDown(String),
    KeyUp(String),
    KeyPress(String),
    Type(String),
    Goto(String),
    GoBack,
    ViewportSize,
    WaitForReady(Option<WaitUntil>),
    CurrentUrl,
    Close,
}

impl PageCmd {
    fn label(&self) -> &'static str {
        match self {
            PageCmd::Screenshot => "screenshot",
            PageCmd::MouseMove { .. } => "mouse_move",
            PageCmd::MouseClick { .. } => "mouse_click",
            PageCmd::KeyDown(_) => "key_down",
            PageCmd::KeyUp(_) => "key_up",
            PageCmd::KeyPress(_) => "key_press",
            PageCmd::Type(_) => "type",
            PageCmd::Goto(_) => "goto",
            PageCmd::GoBack => "go_back",
            PageCmd::ViewportSize => "viewport_size",
            PageCmd::WaitForReady(_) => "wait_for_ready",
            PageCmd::CurrentUrl => "current_url",
            PageCmd::Close => "close",
        }
    }
}

#[derive(Debug)]
pub enum PageReply {
    Done,
    Png(Vec<u8>),
    Viewport(Viewport),
    Url(String),
}

pub struct PageMsg {
    pub cmd: PageCmd,
    pub reply: oneshot::Sender<Result<PageReply>>,
}

pub struct PageActor {
    driver: Box<dyn BrowserDriver>,
}

impl PageActor {
    pub fn new(driver: Box<dyn BrowserDriver>) -> Self {
        Self { driver }
    }

    async fn run(&self, cmd: PageCmd) -> Result<PageReply> {
        let d = &self.driver;
        match cmd {
            PageCmd::Screenshot => d.screenshot().await.map(PageReply::Png),
            PageCmd::MouseMove { x, y } => d.mouse_move(x, y).await.map(|_| PageReply::Done),
            PageCmd::MouseClick {
                x,
                y,
                button,
                count,
            } => d
                .mouse_click(x, y, button, count)
                .await
                .map(|_| PageReply::Done),
            PageCmd::KeyDown(key) => d.keyboard_down(&key).await.map(|_| PageReply::Done),
            PageCmd::KeyUp(key) => d.keyboard_up(&key).await.map(|_| PageReply::Done),
            PageCmd::KeyPress(key) => d.keyboard_press(&key).await.map(|_| PageReply::Done),
            PageCmd::Type(text) => d.keyboard_type(&text).await.map(|_| PageReply::Done),
            PageCmd::Goto(url) => d.goto(&url).await.map(|_| PageReply::Done),
            PageCmd::GoBack => d.go_back().await.map(|_| PageReply::Done),
            PageCmd::ViewportSize => d.viewport_size().await.map(PageReply::Viewport),
            PageCmd::WaitForReady(condition) => {
                d.wait_for_ready(condition).await.map(|_| PageReply::Done)
            }
            PageCmd::CurrentUrl => d.current_url().await.map(PageReply::Url),
            PageCmd::Close => d.close().await.map(|_| PageReply::Done),
        }
    }
}

#[async_trait]
impl Actor for PageActor {
    type Msg = PageMsg;

    async fn handle(&mut self, msg: PageMsg, ctx: &mut Context<Self>) -> Result<()> {
        let closing = msg.cmd == PageCmd::Close;
        let label = msg.cmd.label();
        let result = self.run(msg.cmd).await;
        if let Err(e) = &result {
            debug!(target: "browser.page", cmd = label, error = %e, "page command failed");
        }
        // The caller may have given up waiting; that is not the page's problem.
        let _ = msg.reply.send(result);
        if closing {
            info!(target: "browser.page", "page closed; stopping page actor");
            ctx.stop();
        }
        Ok(())
    }
}

/// Cloneable [`BrowserDriver`] that forwards every call to the page actor.
#[derive(Clone)]
pub struct PageHandle {
    addr: Addr<PageActor>,
}

impl PageHandle {
    async fn request(&self, cmd: PageCmd) -> Result<PageReply> {
        let label = cmd.label();
        self.addr
            .ask(|reply| PageMsg { cmd, reply })
            .await
            .map_err(|e| anyhow!("browser page is gone ({label}): {e}"))?
    }

    async fn done(&self, cmd: PageCmd) -> Result<()> {
        match self.request(cmd).await? {
            PageReply::Done => Ok(()),
            other => Err(anyhow!("unexpected page reply {other:?}")),
        }
    }
}

/// Spawn a page actor owning `driver`. It stops after `Close`, when every
/// handle is dropped, or when `shutdown` is cancelled.
pub fn spawn_page(
    driver: Box<dyn BrowserDriver>,
    shutdown: CancellationToken,
) -> (PageHandle, JoinHandle<Result<()>>) {
    let ActorHandle { addr, task } =
        spawn_actor_with_shutdown(PageActor::new(driver), PAGE_MAILBOX, Some(shutdown));
    (PageHandle { addr }, task)
}

#[async_trait]
impl BrowserDriver for PageHandle {
    async fn screenshot(&self) -> Result<Vec<u8>> {
        match self.request(PageCmd::Screenshot).await? {
            PageReply::Png(png) => Ok(png),
            other => Err(anyhow!("unexpected page reply {other:?}")),
        }
    }

    async fn mouse_move(&self, x: u32, y: u32) -> Result<()> {
        self.done(PageCmd::MouseMove { x, y }).await
    }

    async fn mouse_click(&self, x: u32, y: u32, button: MouseButton, count: u32) -> Result<()> {
        self.done(PageCmd::MouseClick {
            x,
            y,
            button,
            count,
        })
        .await
    }

    async fn keyboard_down(&self, key: &str) -> Result<()> {
        self.done(PageCmd::KeyDown(key.to_string())).await
    }

    async fn keyboard_up(&self, key: &str) -> Result<()> {
        self.done(PageCmd::KeyUp(key.to_string())).await
    }

    async fn keyboard_press(&self, key: &str) -> Result<()> {
        self.done(PageCmd::KeyPress(key.to_string())).await
    }

    async fn keyboard_type(&self, text: &str) -> Result<()> {
        self.done(PageCmd::Type(text.to_string())).await
    }

    async fn goto(&self, url: &str) -> Result<()> {
        self.done(PageCmd::Goto(url.to_string())).await
    }

    async fn go_back(&self) -> Result<()> {
        self.done(PageCmd::GoBack).await
    }

    async fn viewport_size(&self) -> Result<Viewport> {
        match self.request(PageCmd::ViewportSize).await? {
            PageReply::Viewport(vp) => Ok(vp),
            other => Err(anyhow!("unexpected page reply {other:?}")),
        }
    }

    async fn wait_for_ready(&self, condition: Option<WaitUntil>) -> Result<()> {
        self.done(PageCmd::WaitForReady(condition)).await
    }

    async fn current_url(&self) -> Result<String> {
        match self.request(PageCmd::CurrentUrl).await? {
            PageReply::Url(url) => Ok(url),
            other => Err(anyhow!("unexpected page reply {other:?}")),
        }
    }

    async fn close(&self) -> Result<()> {
        self.done(PageCmd::Close).await
    }
}
