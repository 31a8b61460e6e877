use async_trait::async_trait;
use serde::{de, Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

use crate::items::{ComputerAction, MouseButton, Point};

/// Wait used when a `wait` action carries no duration.
pub const DEFAULT_WAIT_MS: u64 = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Browser,
    Mac,
    Windows,
    Ubuntu,
}

#[derive(Debug, Error)]
pub enum ComputerError {
    #[error("operation not supported by this computer: {0}")]
    Unsupported(&'static str),
    #[error("computer action not supported: {0}")]
    UnknownAction(String),
    #[error("computer error: {0}")]
    Backend(String),
}

/// A backend the agent can drive: a local or remote browser, or a desktop.
///
/// Operations mirror the computer-call action vocabulary. Navigation helpers
/// and URL lookup only make sense for browsers, so they default to
/// [`ComputerError::Unsupported`].
#[async_trait]
pub trait Computer: Send + Sync {
    fn environment(&self) -> Environment;
    fn dimensions(&self) -> (u32, u32);

    /// Base64-encoded PNG of the current display.
    async fn screenshot(&self) -> Result<String, ComputerError>;
    async fn click(&self, x: i64, y: i64, button: MouseButton) -> Result<(), ComputerError>;
    async fn double_click(&self, x: i64, y: i64) -> Result<(), ComputerError>;
    async fn scroll(&self, x: i64, y: i64, scroll_x: i64, scroll_y: i64) -> Result<(), ComputerError>;
    async fn type_text(&self, text: &str) -> Result<(), ComputerError>;
    async fn move_pointer(&self, x: i64, y: i64) -> Result<(), ComputerError>;
    async fn keypress(&self, keys: &[String]) -> Result<(), ComputerError>;
    async fn drag(&self, path: &[Point]) -> Result<(), ComputerError>;

    async fn wait(&self, ms: u64) -> Result<(), ComputerError> {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, ComputerError> {
        Err(ComputerError::Unsupported("get_current_url"))
    }

    async fn back(&self) -> Result<(), ComputerError> {
        Err(ComputerError::Unsupported("back"))
    }

    async fn forward(&self) -> Result<(), ComputerError> {
        Err(ComputerError::Unsupported("forward"))
    }

    async fn goto(&self, _url: &str) -> Result<(), ComputerError> {
        Err(ComputerError::Unsupported("goto"))
    }
}

/// Everything a computer can be asked to do, either through a computer call
/// or a function call naming one of its operations.
#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    Action(ComputerAction),
    Back,
    Forward,
    Goto { url: String },
    GetCurrentUrl,
}

#[derive(Deserialize)]
struct GotoArgs {
    url: String,
}

impl Operation {
    /// Resolve a function-call name and its argument object against the
    /// fixed operation table. `Ok(None)` means no operation has that name.
    pub fn from_function_call(
        name: &str,
        args: Map<String, Value>,
    ) -> Result<Option<Self>, serde_json::Error> {
        let op = match name {
            "back" => Self::Back,
            "forward" => Self::Forward,
            "get_current_url" => Self::GetCurrentUrl,
            "goto" => {
                let GotoArgs { url } = serde_json::from_value(Value::Object(args))?;
                Self::Goto { url }
            }
            "click" | "double_click" | "drag" | "keypress" | "move" | "screenshot" | "scroll"
            | "type" | "wait" => {
                let mut tagged = args;
                tagged.insert("type".into(), Value::String(name.into()));
                match serde_json::from_value(Value::Object(tagged))? {
                    ComputerAction::Unsupported(_) => {
                        return Err(de::Error::custom(format!("invalid arguments for {name}")));
                    }
                    action => Self::Action(action),
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(op))
    }
}

/// Run one action against the computer. `screenshot` is a no-op here since
/// callers capture the display after every action anyway.
pub async fn perform<C: Computer + ?Sized>(computer: &C, action: &ComputerAction) -> Result<(), ComputerError> {
    match action {
        ComputerAction::Click { x, y, button } => computer.click(*x, *y, *button).await,
        ComputerAction::DoubleClick { x, y } => computer.double_click(*x, *y).await,
        ComputerAction::Drag { path } => computer.drag(path).await,
        ComputerAction::Keypress { keys } => computer.keypress(keys).await,
        ComputerAction::Move { x, y } => computer.move_pointer(*x, *y).await,
        ComputerAction::Screenshot => Ok(()),
        ComputerAction::Scroll { x, y, scroll_x, scroll_y } => {
            computer.scroll(*x, *y, *scroll_x, *scroll_y).await
        }
        ComputerAction::Type { text } => computer.type_text(text).await,
        ComputerAction::Wait { ms } => computer.wait(ms.unwrap_or(DEFAULT_WAIT_MS)).await,
        ComputerAction::Unsupported(_) => Err(ComputerError::UnknownAction(action.kind().to_string())),
    }
}

/// Run a named operation. Results of `get_current_url` are discarded.
pub async fn perform_operation<C: Computer + ?Sized>(computer: &C, op: &Operation) -> Result<(), ComputerError> {
    match op {
        Operation::Action(action) => perform(computer, action).await,
        Operation::Back => computer.back().await,
        Operation::Forward => computer.forward().await,
        Operation::Goto { url } => computer.goto(url).await,
        Operation::GetCurrentUrl => computer.current_url().await.map(|_| ()),
    }
}
