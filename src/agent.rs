use nanoid::nanoid;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::env;
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::blocklist::{BlockedUrl, UrlBlocklist};
use crate::computer::{perform, perform_operation, Computer, ComputerError, Environment, Operation};
use crate::cua::{ModelTransport, ResponsesRequest, Tool, TransportError, Truncation};
use crate::items::{
    ComputerCall, ComputerCallOutput, ComputerCallOutputContent, ConversationItem, FunctionCall,
    FunctionCallOutput, FUNCTION_SUCCESS,
};
use crate::safety::{RejectAll, SafetyCheckHandler};

// ========================= Core Types =========================

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("no output from model{}", .detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
    Protocol { detail: Option<String> },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("safety check failed: {message}. Cannot continue with unacknowledged safety checks.")]
    SafetyCheckRejected { message: String },
    #[error(transparent)]
    BlockedUrl(#[from] BlockedUrl),
    #[error(transparent)]
    Computer(#[from] ComputerError),
    #[error("invalid arguments for function {name}: {source}")]
    InvalidArguments {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// What a function call reports back when the computer has no operation of
/// that name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FunctionOutputMode {
    /// Always report "success", whether or not anything ran.
    #[default]
    AlwaysSuccess,
    /// Report "unsupported function: <name>" when nothing ran.
    ReportUnsupported,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub model: String, // env OPENAI_CUA_MODEL
    pub print_steps: bool,
    pub debug: bool,
    pub function_outputs: FunctionOutputMode,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: env::var("OPENAI_CUA_MODEL").unwrap_or_else(|_| "computer-use-preview".into()),
            print_steps: true,
            debug: false,
            function_outputs: FunctionOutputMode::default(),
        }
    }
}

// ========================= Agent Core =========================

pub struct Agent<T, C, S = RejectAll>
where
    T: ModelTransport,
    C: Computer,
    S: SafetyCheckHandler,
{
    transport: T,
    computer: C,
    safety: S,
    tools: Vec<Tool>,
    blocklist: UrlBlocklist,
    cfg: AgentConfig,
}

impl<T: ModelTransport, C: Computer> Agent<T, C, RejectAll> {
    /// Agent that rejects every safety check and uses the default blocklist.
    pub fn new(transport: T, computer: C, cfg: AgentConfig) -> Self {
        Self {
            transport,
            computer,
            safety: RejectAll,
            tools: Vec::new(),
            blocklist: UrlBlocklist::default(),
            cfg,
        }
    }
}

impl<T, C, S> Agent<T, C, S>
where
    T: ModelTransport,
    C: Computer,
    S: SafetyCheckHandler,
{
    pub fn with_safety_handler<S2: SafetyCheckHandler>(self, safety: S2) -> Agent<T, C, S2> {
        Agent {
            transport: self.transport,
            computer: self.computer,
            safety,
            tools: self.tools,
            blocklist: self.blocklist,
            cfg: self.cfg,
        }
    }

    /// Extra function tools, declared ahead of the computer tool.
    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_blocklist(mut self, blocklist: UrlBlocklist) -> Self {
        self.blocklist = blocklist;
        self
    }

    pub fn computer(&self) -> &C {
        &self.computer
    }

    pub fn config(&self) -> &AgentConfig {
        &self.cfg
    }

    pub fn into_computer(self) -> C {
        self.computer
    }

    fn request_tools(&self) -> Vec<Tool> {
        let (display_width, display_height) = self.computer.dimensions();
        let mut tools = self.tools.clone();
        tools.push(Tool::Computer {
            display_width,
            display_height,
            environment: self.computer.environment(),
        });
        tools
    }

    /// Drive the model until it stops asking for computer actions.
    ///
    /// `input_items` is the whole conversation so far. The returned transcript
    /// holds only what this turn produced, ready to be appended by the caller.
    pub async fn run_full_turn(
        &mut self,
        input_items: &[ConversationItem],
    ) -> Result<Vec<ConversationItem>, AgentError> {
        let turn_id = nanoid!(10);
        let span = info_span!("turn", %turn_id);
        self.turn_loop(input_items).instrument(span).await
    }

    async fn turn_loop(&self, input_items: &[ConversationItem]) -> Result<Vec<ConversationItem>, AgentError> {
        let tools = self.request_tools();
        let mut transcript: Vec<ConversationItem> = Vec::new();
        let mut pending: Vec<ConversationItem> = input_items.to_vec();
        let mut previous_response_id: Option<String> = None;
        let mut iteration = 0usize;

        loop {
            iteration += 1;
            let payload = dedup_by_id(&pending);
            if self.cfg.debug {
                debug!(
                    iteration,
                    payload = %sanitized_json(transcript.iter().chain(payload.iter())),
                    "sending request"
                );
            }

            let request = ResponsesRequest {
                model: self.cfg.model.clone(),
                input: payload,
                tools: tools.clone(),
                truncation: Truncation::Auto,
                previous_response_id: previous_response_id.clone(),
            };
            let response = self.transport.create_response(&request).await?;

            if let Some(id) = response.id {
                previous_response_id = Some(id);
            }
            let Some(output) = response.output else {
                warn!(iteration, "response carried no output");
                return Err(AgentError::Protocol { detail: response.error.map(|e| e.to_string()) });
            };
            info!(
                iteration,
                response_id = previous_response_id.as_deref().unwrap_or(""),
                items = output.len(),
                "model response"
            );
            if self.cfg.debug {
                debug!(output = %sanitized_json(output.iter()), "response output");
            }

            let mut new_pending: Vec<ConversationItem> = Vec::new();
            for item in output {
                if matches!(item, ConversationItem::ComputerCall(_)) {
                    let observations = self.handle_item(&item).await?;
                    transcript.push(item);
                    transcript.extend(observations.iter().cloned());
                    new_pending = observations;
                    // later items were planned against the screen we just changed
                    break;
                }
                let produced = self.handle_item(&item).await?;
                transcript.push(item);
                transcript.extend(produced);
            }

            if new_pending.last().is_some_and(ConversationItem::is_assistant_message) {
                break;
            }
            if new_pending.is_empty() {
                break;
            }
            pending = new_pending;
        }

        info!(iterations = iteration, items = transcript.len(), "turn finished");
        Ok(transcript)
    }

    /// Act on one output item. Returns the observations to report back.
    pub async fn handle_item(&self, item: &ConversationItem) -> Result<Vec<ConversationItem>, AgentError> {
        match item {
            ConversationItem::Message(message) => {
                if self.cfg.print_steps {
                    info!(role = ?message.role, "{}", message.text());
                }
                Ok(Vec::new())
            }
            ConversationItem::FunctionCall(call) => self.handle_function_call(call).await,
            ConversationItem::ComputerCall(call) => self.handle_computer_call(call).await,
            ConversationItem::FunctionCallOutput(_)
            | ConversationItem::ComputerCallOutput(_)
            | ConversationItem::Other(_) => Ok(Vec::new()),
        }
    }

    async fn handle_function_call(&self, call: &FunctionCall) -> Result<Vec<ConversationItem>, AgentError> {
        let invalid = |source| AgentError::InvalidArguments { name: call.name.clone(), source };
        let args: Map<String, Value> = if call.arguments.trim().is_empty() {
            Map::new()
        } else {
            serde_json::from_str(&call.arguments).map_err(invalid)?
        };
        if self.cfg.print_steps {
            let shown = Value::Object(args.clone());
            info!("{}({shown})", call.name);
        }

        let ran = match Operation::from_function_call(&call.name, args).map_err(invalid)? {
            Some(op) => match perform_operation(&self.computer, &op).await {
                Ok(()) => true,
                Err(ComputerError::Unsupported(name)) => {
                    debug!(function = name, "computer lacks operation, skipping");
                    false
                }
                Err(e) => return Err(e.into()),
            },
            None => false,
        };

        let output = match (ran, self.cfg.function_outputs) {
            (false, FunctionOutputMode::ReportUnsupported) => format!("unsupported function: {}", call.name),
            _ => FUNCTION_SUCCESS.to_string(),
        };
        Ok(vec![ConversationItem::FunctionCallOutput(FunctionCallOutput {
            id: None,
            call_id: call.call_id.clone(),
            output,
        })])
    }

    async fn handle_computer_call(&self, call: &ComputerCall) -> Result<Vec<ConversationItem>, AgentError> {
        if self.cfg.print_steps {
            info!(action = call.action.kind(), "{:?}", call.action);
        }
        perform(&self.computer, &call.action).await?;
        let screenshot = self.computer.screenshot().await?;

        for check in &call.pending_safety_checks {
            if !self.safety.acknowledge(&check.message).await {
                warn!(check = %check.id, "safety check rejected");
                return Err(AgentError::SafetyCheckRejected { message: check.message.clone() });
            }
        }

        let mut output = ComputerCallOutputContent::png(&screenshot);
        if self.computer.environment() == Environment::Browser {
            let url = self.computer.current_url().await?;
            self.blocklist.check(&url)?;
            let ComputerCallOutputContent::InputImage { current_url, .. } = &mut output;
            *current_url = Some(url);
        }

        Ok(vec![ConversationItem::ComputerCallOutput(ComputerCallOutput {
            id: None,
            call_id: call.call_id.clone(),
            acknowledged_safety_checks: call.pending_safety_checks.clone(),
            output,
        })])
    }
}

// ========================= Helpers =========================

/// Drop items whose id was already seen, keeping the first occurrence and
/// the original order. Items without an id are always kept.
pub fn dedup_by_id(items: &[ConversationItem]) -> Vec<ConversationItem> {
    let mut seen: HashSet<&str> = HashSet::new();
    items
        .iter()
        .filter(|item| match item.id() {
            Some(id) => seen.insert(id),
            None => true,
        })
        .cloned()
        .collect()
}

fn sanitized_json<'a>(items: impl Iterator<Item = &'a ConversationItem>) -> String {
    let items: Vec<ConversationItem> = items.map(ConversationItem::sanitized).collect();
    serde_json::to_string_pretty(&items).unwrap_or_default()
}
