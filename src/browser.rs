use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chromiumoxide::browser::Browser as OxideBrowser;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams, DispatchMouseEventType,
    InsertTextParams, MouseButton as CdpMouseButton,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::keys::get_key_definition;
use chromiumoxide::layout::Point as CdpPoint;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::computer::{Computer, ComputerError, Environment};
use crate::items::{MouseButton, Point};

#[derive(Clone, Debug)]
pub struct BrowserConfig {
    pub headless: bool,
    pub user_agent: Option<String>,
    pub width: u32,
    pub height: u32,
    pub start_url: Option<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            user_agent: None,
            width: 1024,
            height: 768,
            start_url: Some("https://bing.com".into()),
        }
    }
}

/// A Chromium page driven over CDP.
///
/// Owns the browser, its event-handler task and, for launched browsers, a
/// throwaway profile directory. All of them are released on [`close`] or on
/// drop, whichever comes first.
///
/// [`close`]: ChromiumComputer::close
pub struct ChromiumComputer {
    page: Page,
    browser: OxideBrowser,
    handler: JoinHandle<()>,
    // declared after `browser` so the child is gone before the directory is removed
    profile_dir: Option<ProfileDir>,
    dimensions: (u32, u32),
}

/// Temporary Chromium profile, removed when dropped.
struct ProfileDir(PathBuf);

impl Drop for ProfileDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.0) {
            debug!(dir = %self.0.display(), "profile cleanup failed: {e}");
        }
    }
}

impl ChromiumComputer {
    /// Start a local Chromium with an isolated profile.
    pub async fn launch(cfg: BrowserConfig) -> Result<Self> {
        let mut builder = chromiumoxide::browser::BrowserConfig::builder();
        if !cfg.headless {
            builder = builder.with_head();
        }
        // unique profile per run, Chromium locks the profile dir
        let ts = SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis();
        let mut profile_dir: PathBuf = std::env::temp_dir();
        profile_dir.push(format!("cua-runner-profile-{}-{}", std::process::id(), ts));
        std::fs::create_dir_all(&profile_dir)?;
        let profile = ProfileDir(profile_dir.clone());
        builder = builder
            .user_data_dir(profile_dir.clone())
            .window_size(cfg.width, cfg.height)
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-extensions")
            .arg("--disable-file-system");
        let bcfg = builder.build().map_err(|e| anyhow!(e))?;
        let (browser, mut handler) = OxideBrowser::launch(bcfg).await?;
        let handler = tokio::spawn(async move {
            while let Some(_ev) = handler.next().await {}
        });
        let page = browser.new_page("about:blank").await?;
        let computer = Self {
            page,
            browser,
            handler,
            profile_dir: Some(profile),
            dimensions: (cfg.width, cfg.height),
        };
        computer.prepare(&cfg).await?;
        info!(width = cfg.width, height = cfg.height, headless = cfg.headless, "chromium launched");
        Ok(computer)
    }

    /// Attach to an already running browser, e.g. a remote session, over its
    /// CDP websocket URL.
    pub async fn connect(ws_url: &str, cfg: BrowserConfig) -> Result<Self> {
        let (browser, mut handler) = OxideBrowser::connect(ws_url).await?;
        let handler = tokio::spawn(async move {
            while let Some(_ev) = handler.next().await {}
        });
        let page = match browser.pages().await?.into_iter().next() {
            Some(page) => page,
            None => browser.new_page("about:blank").await?,
        };
        let computer = Self {
            page,
            browser,
            handler,
            profile_dir: None,
            dimensions: (cfg.width, cfg.height),
        };
        computer.prepare(&cfg).await?;
        info!(ws_url, "chromium connected");
        Ok(computer)
    }

    async fn prepare(&self, cfg: &BrowserConfig) -> Result<()> {
        if let Some(ua) = &cfg.user_agent {
            self.page.set_user_agent(ua.clone()).await?;
        }
        self.set_viewport().await?;
        if let Some(url) = &cfg.start_url {
            self.navigate(url).await?;
        }
        Ok(())
    }

    async fn set_viewport(&self) -> Result<()> {
        let (width, height) = self.dimensions;
        let metrics = SetDeviceMetricsOverrideParams::builder()
            .width(width as i64)
            .height(height as i64)
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(|e| anyhow!(e))?;
        self.page.execute(metrics).await?;
        Ok(())
    }

    /// Close the browser and release everything it owns.
    pub async fn close(mut self) -> Result<()> {
        self.browser.close().await?;
        if let Err(e) = self.browser.wait().await {
            warn!("waiting for chromium exit failed: {e}");
        }
        self.handler.abort();
        // chromium has exited, the profile can go now
        drop(self.profile_dir.take());
        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        self.page.goto(url).await?;
        self.page.wait_for_navigation().await?;
        Ok(())
    }

    async fn eval(&self, script: String) -> Result<()> {
        let eval = EvaluateParams::builder()
            .expression(script)
            .build()
            .map_err(|e| anyhow!(e))?;
        self.page.execute(eval).await?;
        Ok(())
    }

    async fn mouse(&self, kind: DispatchMouseEventType, x: i64, y: i64, button: CdpMouseButton, clicks: i64) -> Result<()> {
        let cmd = DispatchMouseEventParams::builder()
            .r#type(kind)
            .x(x as f64)
            .y(y as f64)
            .button(button)
            .click_count(clicks)
            .build()
            .map_err(|e| anyhow!(e))?;
        self.page.execute(cmd).await?;
        Ok(())
    }

    async fn press(&self, x: i64, y: i64, button: CdpMouseButton, clicks: i64) -> Result<()> {
        self.page.move_mouse(CdpPoint { x: x as f64, y: y as f64 }).await?;
        self.mouse(DispatchMouseEventType::MousePressed, x, y, button.clone(), clicks).await?;
        self.mouse(DispatchMouseEventType::MouseReleased, x, y, button, clicks).await
    }

    /// Send one key event. Keys known to chromiumoxide's US layout carry their
    /// code, virtual key code and text, which Blink needs for Enter, Tab,
    /// Backspace and the arrows.
    async fn key(&self, down: bool, key: &str, modifiers: i64) -> Result<()> {
        let mut cmd = DispatchKeyEventParams::builder().key(key).modifiers(modifiers);
        let text = match get_key_definition(key) {
            Some(def) => {
                cmd = cmd
                    .code(def.code)
                    .windows_virtual_key_code(def.key_code)
                    .native_virtual_key_code(def.key_code);
                def.text.map(str::to_string)
            }
            None => None,
        };
        let text = text.or_else(|| (key.chars().count() == 1).then(|| key.to_string()));
        // shortcuts like Ctrl+A must not insert text
        let text = text.filter(|_| modifiers & !MODIFIER_SHIFT == 0);
        let kind = match (down, text) {
            (false, _) => DispatchKeyEventType::KeyUp,
            (true, Some(text)) => {
                cmd = cmd.text(text);
                DispatchKeyEventType::KeyDown
            }
            (true, None) => DispatchKeyEventType::RawKeyDown,
        };
        self.page.execute(cmd.r#type(kind).build().map_err(|e| anyhow!(e))?).await?;
        Ok(())
    }

    async fn screenshot_b64(&self) -> Result<String> {
        let take = || async {
            self.page
                .screenshot(ScreenshotParams::builder().full_page(false).omit_background(true).build())
                .await
        };
        match take().await {
            Ok(bytes) => Ok(STANDARD.encode(bytes)),
            Err(e) => {
                let msg = e.to_string();
                if msg.contains("0 width") || msg.contains("0 height") {
                    // viewport got lost, force it and retry once
                    self.set_viewport().await?;
                    sleep(Duration::from_millis(50)).await;
                    let bytes = take().await?;
                    return Ok(STANDARD.encode(bytes));
                }
                Err(anyhow!(e))
            }
        }
    }
}

impl Drop for ChromiumComputer {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

/// Map CUA key names to DOM `KeyboardEvent.key` values.
pub fn dom_key(key: &str) -> String {
    let mapped = match key.to_ascii_uppercase().as_str() {
        "ENTER" | "RETURN" => "Enter",
        "CTRL" | "CONTROL" => "Control",
        "CMD" | "META" | "SUPER" => "Meta",
        "ALT" | "OPTION" => "Alt",
        "SHIFT" => "Shift",
        "TAB" => "Tab",
        "ESC" | "ESCAPE" => "Escape",
        "SPACE" => " ",
        "BACKSPACE" => "Backspace",
        "DELETE" | "DEL" => "Delete",
        "HOME" => "Home",
        "END" => "End",
        "PAGEUP" => "PageUp",
        "PAGEDOWN" => "PageDown",
        "INSERT" => "Insert",
        "CAPSLOCK" => "CapsLock",
        "ARROWUP" | "UP" => "ArrowUp",
        "ARROWDOWN" | "DOWN" => "ArrowDown",
        "ARROWLEFT" | "LEFT" => "ArrowLeft",
        "ARROWRIGHT" | "RIGHT" => "ArrowRight",
        upper if upper.len() > 1 && upper.starts_with('F') && upper[1..].parse::<u8>().is_ok() => {
            return upper.to_string();
        }
        _ => return key.to_string(),
    };
    mapped.to_string()
}

const MODIFIER_ALT: i64 = 1;
const MODIFIER_CTRL: i64 = 2;
const MODIFIER_META: i64 = 4;
const MODIFIER_SHIFT: i64 = 8;

/// CDP modifier bit for a DOM modifier key name, 0 for everything else.
fn modifier_bit(key: &str) -> i64 {
    match key {
        "Alt" => MODIFIER_ALT,
        "Control" => MODIFIER_CTRL,
        "Meta" => MODIFIER_META,
        "Shift" => MODIFIER_SHIFT,
        _ => 0,
    }
}

fn backend(e: anyhow::Error) -> ComputerError {
    ComputerError::Backend(format!("{e:#}"))
}

fn cdp_button(button: MouseButton) -> CdpMouseButton {
    match button {
        MouseButton::Left => CdpMouseButton::Left,
        MouseButton::Right => CdpMouseButton::Right,
        MouseButton::Wheel => CdpMouseButton::Middle,
        MouseButton::Back => CdpMouseButton::Back,
        MouseButton::Forward => CdpMouseButton::Forward,
    }
}

#[async_trait]
impl Computer for ChromiumComputer {
    fn environment(&self) -> Environment {
        Environment::Browser
    }

    fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    async fn screenshot(&self) -> Result<String, ComputerError> {
        self.screenshot_b64().await.map_err(backend)
    }

    async fn click(&self, x: i64, y: i64, button: MouseButton) -> Result<(), ComputerError> {
        match button {
            MouseButton::Back => self.back().await,
            MouseButton::Forward => self.forward().await,
            MouseButton::Wheel => self.scroll(x, y, 0, 0).await,
            other => self.press(x, y, cdp_button(other), 1).await.map_err(backend),
        }
    }

    async fn double_click(&self, x: i64, y: i64) -> Result<(), ComputerError> {
        self.press(x, y, CdpMouseButton::Left, 2).await.map_err(backend)
    }

    async fn scroll(&self, x: i64, y: i64, scroll_x: i64, scroll_y: i64) -> Result<(), ComputerError> {
        self.page
            .move_mouse(CdpPoint { x: x as f64, y: y as f64 })
            .await
            .map_err(|e| backend(e.into()))?;
        self.eval(format!("window.scrollBy({scroll_x}, {scroll_y});"))
            .await
            .map_err(backend)
    }

    async fn type_text(&self, text: &str) -> Result<(), ComputerError> {
        self.page
            .execute(InsertTextParams { text: text.to_string() })
            .await
            .map_err(|e| backend(e.into()))?;
        Ok(())
    }

    async fn move_pointer(&self, x: i64, y: i64) -> Result<(), ComputerError> {
        self.page
            .move_mouse(CdpPoint { x: x as f64, y: y as f64 })
            .await
            .map_err(|e| backend(e.into()))?;
        Ok(())
    }

    async fn keypress(&self, keys: &[String]) -> Result<(), ComputerError> {
        let keys: Vec<String> = keys.iter().map(|k| dom_key(k)).collect();
        let mut modifiers = 0;
        for k in &keys {
            modifiers |= modifier_bit(k);
            self.key(true, k, modifiers).await.map_err(backend)?;
        }
        for k in keys.iter().rev() {
            self.key(false, k, modifiers).await.map_err(backend)?;
            modifiers &= !modifier_bit(k);
        }
        Ok(())
    }

    async fn drag(&self, path: &[Point]) -> Result<(), ComputerError> {
        let Some((first, rest)) = path.split_first() else { return Ok(()) };
        let run = async {
            self.page.move_mouse(CdpPoint { x: first.x as f64, y: first.y as f64 }).await?;
            self.mouse(DispatchMouseEventType::MousePressed, first.x, first.y, CdpMouseButton::Left, 1)
                .await?;
            let mut last = *first;
            for p in rest {
                self.mouse(DispatchMouseEventType::MouseMoved, p.x, p.y, CdpMouseButton::Left, 0)
                    .await?;
                last = *p;
            }
            self.mouse(DispatchMouseEventType::MouseReleased, last.x, last.y, CdpMouseButton::Left, 1)
                .await?;
            anyhow::Ok(())
        };
        run.await.map_err(backend)
    }

    async fn current_url(&self) -> Result<String, ComputerError> {
        let url = self.page.url().await.map_err(|e| backend(e.into()))?;
        Ok(url.unwrap_or_default())
    }

    async fn back(&self) -> Result<(), ComputerError> {
        self.eval("history.back();".into()).await.map_err(backend)?;
        sleep(Duration::from_millis(400)).await;
        Ok(())
    }

    async fn forward(&self) -> Result<(), ComputerError> {
        self.eval("history.forward();".into()).await.map_err(backend)?;
        sleep(Duration::from_millis(400)).await;
        Ok(())
    }

    async fn goto(&self, url: &str) -> Result<(), ComputerError> {
        self.navigate(url).await.map_err(backend)
    }
}
