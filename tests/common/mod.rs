#![allow(dead_code)]

use async_trait::async_trait;
use cua_runner::computer::{Computer, ComputerError, Environment};
use cua_runner::cua::{ModelTransport, ResponsesRequest, ResponsesResponse, TransportError};
use cua_runner::items::{MouseButton, Point};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub const SCREENSHOT: &str = "iVBORw0KGgo=";

/// Replays canned responses and records every request it was sent.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    responses: Arc<Mutex<VecDeque<ResponsesResponse>>>,
    pub requests: Arc<Mutex<Vec<ResponsesRequest>>>,
}

impl ScriptedTransport {
    pub fn new(bodies: Vec<Value>) -> Self {
        let responses = bodies
            .into_iter()
            .map(|b| serde_json::from_value(b).expect("canned response"))
            .collect();
        Self { responses: Arc::new(Mutex::new(responses)), requests: Arc::default() }
    }

    pub fn requests(&self) -> Vec<ResponsesRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelTransport for ScriptedTransport {
    async fn create_response(&self, request: &ResponsesRequest) -> Result<ResponsesResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.responses.lock().unwrap().pop_front();
        Ok(next.expect("transport called more often than scripted"))
    }
}

/// Records the operations it performs. Navigation helpers stay at their
/// unsupported defaults.
#[derive(Clone)]
pub struct RecordingComputer {
    pub environment: Environment,
    pub url: String,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl RecordingComputer {
    pub fn browser(url: &str) -> Self {
        Self { environment: Environment::Browser, url: url.into(), calls: Arc::default() }
    }

    pub fn desktop() -> Self {
        Self { environment: Environment::Ubuntu, url: String::new(), calls: Arc::default() }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Computer for RecordingComputer {
    fn environment(&self) -> Environment {
        self.environment
    }

    fn dimensions(&self) -> (u32, u32) {
        (1024, 768)
    }

    async fn screenshot(&self) -> Result<String, ComputerError> {
        self.record("screenshot()".into());
        Ok(SCREENSHOT.into())
    }

    async fn click(&self, x: i64, y: i64, button: MouseButton) -> Result<(), ComputerError> {
        self.record(format!("click({x},{y},{button:?})"));
        Ok(())
    }

    async fn double_click(&self, x: i64, y: i64) -> Result<(), ComputerError> {
        self.record(format!("double_click({x},{y})"));
        Ok(())
    }

    async fn scroll(&self, x: i64, y: i64, scroll_x: i64, scroll_y: i64) -> Result<(), ComputerError> {
        self.record(format!("scroll({x},{y},{scroll_x},{scroll_y})"));
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<(), ComputerError> {
        self.record(format!("type({text})"));
        Ok(())
    }

    async fn move_pointer(&self, x: i64, y: i64) -> Result<(), ComputerError> {
        self.record(format!("move({x},{y})"));
        Ok(())
    }

    async fn keypress(&self, keys: &[String]) -> Result<(), ComputerError> {
        self.record(format!("keypress({})", keys.join("+")));
        Ok(())
    }

    async fn drag(&self, path: &[Point]) -> Result<(), ComputerError> {
        self.record(format!("drag({})", path.len()));
        Ok(())
    }

    async fn wait(&self, ms: u64) -> Result<(), ComputerError> {
        self.record(format!("wait({ms})"));
        Ok(())
    }

    async fn current_url(&self) -> Result<String, ComputerError> {
        match self.environment {
            Environment::Browser => Ok(self.url.clone()),
            _ => Err(ComputerError::Unsupported("get_current_url")),
        }
    }
}

/// Computer with a working `goto`, for function-call dispatch.
#[derive(Clone)]
pub struct NavigatingComputer(pub RecordingComputer);

#[async_trait]
impl Computer for NavigatingComputer {
    fn environment(&self) -> Environment {
        self.0.environment()
    }

    fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }

    async fn screenshot(&self) -> Result<String, ComputerError> {
        self.0.screenshot().await
    }

    async fn click(&self, x: i64, y: i64, button: MouseButton) -> Result<(), ComputerError> {
        self.0.click(x, y, button).await
    }

    async fn double_click(&self, x: i64, y: i64) -> Result<(), ComputerError> {
        self.0.double_click(x, y).await
    }

    async fn scroll(&self, x: i64, y: i64, scroll_x: i64, scroll_y: i64) -> Result<(), ComputerError> {
        self.0.scroll(x, y, scroll_x, scroll_y).await
    }

    async fn type_text(&self, text: &str) -> Result<(), ComputerError> {
        self.0.type_text(text).await
    }

    async fn move_pointer(&self, x: i64, y: i64) -> Result<(), ComputerError> {
        self.0.move_pointer(x, y).await
    }

    async fn keypress(&self, keys: &[String]) -> Result<(), ComputerError> {
        self.0.keypress(keys).await
    }

    async fn drag(&self, path: &[Point]) -> Result<(), ComputerError> {
        self.0.drag(path).await
    }

    async fn current_url(&self) -> Result<String, ComputerError> {
        self.0.current_url().await
    }

    async fn goto(&self, url: &str) -> Result<(), ComputerError> {
        self.0.record(format!("goto({url})"));
        Ok(())
    }
}
