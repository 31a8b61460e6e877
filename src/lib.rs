pub mod agent;
pub mod blocklist;
pub mod browser;
pub mod computer;
pub mod cua;
pub mod items;
pub mod safety;

pub use agent::{Agent, AgentConfig, AgentError, FunctionOutputMode};
pub use blocklist::UrlBlocklist;
pub use browser::{BrowserConfig, ChromiumComputer};
pub use computer::{Computer, ComputerError, Environment};
pub use cua::{CuaClient, CuaConfig, ModelTransport};
pub use items::ConversationItem;
pub use safety::SafetyCheckHandler;
