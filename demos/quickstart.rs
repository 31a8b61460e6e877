use anyhow::Result;
use cua_runner::cua::Tool;
use cua_runner::{Agent, AgentConfig, BrowserConfig, ChromiumComputer, ConversationItem, CuaClient, CuaConfig};
use serde_json::json;
use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;

fn prompt(label: &str) -> Result<Option<String>> {
    print!("{label}");
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn acknowledge(message: &str) -> bool {
    let answer = prompt(&format!(
        "Safety Check Warning: {message}\nDo you want to acknowledge and proceed? (y/n): "
    ));
    matches!(answer, Ok(Some(a)) if a.eq_ignore_ascii_case("y"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let browser_cfg = BrowserConfig { headless: false, ..Default::default() };
    let computer = match std::env::var("CHROME_WS_URL") {
        Ok(ws) if !ws.trim().is_empty() => ChromiumComputer::connect(&ws, browser_cfg).await?,
        _ => ChromiumComputer::launch(browser_cfg).await?,
    };
    let client = CuaClient::new(CuaConfig::default())?;
    let navigation = vec![
        Tool::function("back", "Go back to the previous page.", json!({})),
        Tool::function(
            "goto",
            "Go to a specific URL.",
            json!({
                "type": "object",
                "properties": {"url": {"type": "string", "description": "Fully qualified URL to navigate to."}},
                "additionalProperties": false,
                "required": ["url"]
            }),
        ),
    ];
    let mut agent = Agent::new(client, computer, AgentConfig::default())
        .with_tools(navigation)
        .with_safety_handler(acknowledge);

    let mut items = vec![ConversationItem::developer_text(
        "Use the additional back() and goto() functions to navigate the browser. If you see nothing, try going to bing.com.",
    )];
    while let Some(line) = prompt("> ")? {
        if line.is_empty() {
            continue;
        }
        items.push(ConversationItem::user_text(line));
        match agent.run_full_turn(&items).await {
            Ok(transcript) => items.extend(transcript),
            Err(e) => eprintln!("turn failed: {e}"),
        }
    }

    agent.into_computer().close().await?;
    Ok(())
}
