//! Desktop capabilities: launching apps and URLs, keyboard and mouse input.
//!
//! Input is driven through whichever command-line backend is installed
//! (`wtype`/`ydotool` on Wayland, `xdotool` on X11). None of these
//! capabilities serialize access to the pointer or keyboard; overlapping
//! invocations interleave their input events.

use crate::params::{optional_str, required_i64, required_str};
use crate::traits::{ActionOutcome, Capability, CapabilityError, Parameters};
use async_trait::async_trait;
use serde_json::json;
use tokio::process::Command;
use tokio::time::{sleep, Duration};
use tracing::debug;

type Result<T> = std::result::Result<T, CapabilityError>;

fn invalid(msg: impl Into<String>) -> CapabilityError {
    CapabilityError::InvalidParameters(msg.into())
}

pub(crate) fn validate_app_name(app: &str) -> Result<()> {
    if app.trim().is_empty() {
        return Err(invalid("name cannot be empty"));
    }
    if !app
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
    {
        return Err(invalid("name contains invalid characters"));
    }
    Ok(())
}

fn validate_text(text: &str) -> Result<()> {
    if text.contains('\0') {
        return Err(invalid("text contains null byte"));
    }
    Ok(())
}

fn validate_key_token(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(invalid("key cannot be empty"));
    }
    if !key
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '+'))
    {
        return Err(invalid("key contains invalid characters"));
    }
    Ok(())
}

fn validate_coordinate(value: i64, label: &str) -> Result<i32> {
    if value < 0 {
        return Err(invalid(format!("{label} must be >= 0, got {value}")));
    }
    i32::try_from(value).map_err(|_| invalid(format!("{label} is out of range")))
}

pub(crate) fn validate_url(url: &str) -> Result<()> {
    if url.trim().is_empty() {
        return Err(invalid("url cannot be empty"));
    }
    let lower = url.to_lowercase();
    if !(lower.starts_with("http://")
        || lower.starts_with("https://")
        || lower.starts_with("mailto:")
        || lower.starts_with("file://"))
    {
        return Err(invalid(
            "url must start with http://, https://, mailto:, or file://",
        ));
    }
    Ok(())
}

fn encode_query(query: &str) -> String {
    query
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            b' ' => "+".to_string(),
            _ => format!("%{b:02X}"),
        })
        .collect()
}

fn mouse_button_code(button: &str) -> Result<&'static str> {
    match button.to_lowercase().as_str() {
        "left" => Ok("1"),
        "middle" => Ok("2"),
        "right" => Ok("3"),
        other => Err(invalid(format!("unsupported mouse button: {other}"))),
    }
}

pub(crate) async fn command_exists(command: &str) -> bool {
    Command::new("which")
        .arg(command)
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}

pub(crate) async fn run_checked(command: &str, args: &[&str]) -> Result<()> {
    debug!(command, ?args, "Running input backend");
    let output = Command::new(command).args(args).output().await?;
    if output.status.success() {
        return Ok(());
    }
    Err(CapabilityError::ExecutionFailed(
        String::from_utf8_lossy(&output.stderr).trim().to_string(),
    ))
}

/// First installed backend out of `candidates`.
pub(crate) async fn pick_backend(candidates: &[&'static str]) -> Result<&'static str> {
    for candidate in candidates {
        if command_exists(candidate).await {
            return Ok(*candidate);
        }
    }
    Err(CapabilityError::Unavailable(format!(
        "none of {} is installed",
        candidates.join(", ")
    )))
}

async fn open_target(url: &str) -> Result<()> {
    validate_url(url)?;
    // Detached: the browser outlives the invocation.
    Command::new("xdg-open").arg(url).spawn()?;
    Ok(())
}

pub struct OpenUrlCapability;

#[async_trait]
impl Capability for OpenUrlCapability {
    fn name(&self) -> &str {
        "open_url"
    }

    fn description(&self) -> &str {
        "Open a URL in the default browser. params: {\"url\": string}"
    }

    async fn execute(&self, params: Parameters) -> Result<ActionOutcome> {
        let url = required_str(&params, "url")?;
        open_target(url).await?;
        Ok(ActionOutcome::ok(json!({ "opened_url": url })))
    }
}

pub struct SearchWebCapability;

#[async_trait]
impl Capability for SearchWebCapability {
    fn name(&self) -> &str {
        "search_web"
    }

    fn description(&self) -> &str {
        "Search the web in the default browser. params: {\"query\": string, \"engine\"?: \"duckduckgo\"|\"google\"|\"bing\"}"
    }

    async fn execute(&self, params: Parameters) -> Result<ActionOutcome> {
        let query = required_str(&params, "query")?;
        if query.trim().is_empty() {
            return Err(invalid("query cannot be empty"));
        }
        let encoded = encode_query(query);
        let target = match optional_str(&params, "engine")
            .unwrap_or("duckduckgo")
            .to_lowercase()
            .as_str()
        {
            "google" => format!("https://www.google.com/search?q={encoded}"),
            "bing" => format!("https://www.bing.com/search?q={encoded}"),
            _ => format!("https://duckduckgo.com/?q={encoded}"),
        };
        open_target(&target).await?;
        Ok(ActionOutcome::ok(json!({ "opened_url": target })))
    }
}

pub struct OpenAppCapability;

#[async_trait]
impl Capability for OpenAppCapability {
    fn name(&self) -> &str {
        "open_app"
    }

    fn description(&self) -> &str {
        "Launch a desktop application by executable name. params: {\"name\": string}"
    }

    async fn execute(&self, params: Parameters) -> Result<ActionOutcome> {
        let name = required_str(&params, "name")?;
        validate_app_name(name)?;
        let child = Command::new(name).spawn().map_err(|e| {
            CapabilityError::ExecutionFailed(format!("failed to launch {name}: {e}"))
        })?;
        Ok(ActionOutcome::ok(json!({
            "launched": name,
            "pid": child.id().unwrap_or_default(),
        })))
    }
}

pub struct TypeTextCapability;

#[async_trait]
impl Capability for TypeTextCapability {
    fn name(&self) -> &str {
        "type_text"
    }

    fn description(&self) -> &str {
        "Type text into the focused window. params: {\"text\": string}"
    }

    async fn execute(&self, params: Parameters) -> Result<ActionOutcome> {
        let text = required_str(&params, "text")?;
        validate_text(text)?;
        match pick_backend(&["wtype", "ydotool", "xdotool"]).await? {
            "wtype" => run_checked("wtype", &[text]).await?,
            backend => run_checked(backend, &["type", text]).await?,
        }
        Ok(ActionOutcome::ok(json!({ "typed": text })))
    }
}

pub struct PressKeyCapability;

#[async_trait]
impl Capability for PressKeyCapability {
    fn name(&self) -> &str {
        "press_key"
    }

    fn description(&self) -> &str {
        "Press a key or combination such as \"Return\" or \"ctrl+l\". params: {\"key\": string}"
    }

    async fn execute(&self, params: Parameters) -> Result<ActionOutcome> {
        let key = required_str(&params, "key")?;
        validate_key_token(key)?;
        match pick_backend(&["xdotool", "wtype"]).await? {
            "wtype" => {
                let parts: Vec<&str> = key.split('+').collect();
                let (main_key, modifiers) = parts
                    .split_last()
                    .ok_or_else(|| invalid("key cannot be empty"))?;
                let mut args: Vec<&str> = Vec::new();
                for modifier in modifiers {
                    args.extend(["-M", *modifier]);
                }
                args.extend(["-k", *main_key]);
                for modifier in modifiers.iter().rev() {
                    args.extend(["-m", *modifier]);
                }
                run_checked("wtype", &args).await?;
            }
            backend => run_checked(backend, &["key", key]).await?,
        }
        Ok(ActionOutcome::ok(json!({ "pressed": key })))
    }
}

pub struct ClickCapability;

#[async_trait]
impl Capability for ClickCapability {
    fn name(&self) -> &str {
        "click"
    }

    fn description(&self) -> &str {
        "Click at absolute screen coordinates. params: {\"x\": int, \"y\": int, \"button\"?: \"left\"|\"middle\"|\"right\"}"
    }

    async fn execute(&self, params: Parameters) -> Result<ActionOutcome> {
        let x = validate_coordinate(required_i64(&params, "x")?, "x")?;
        let y = validate_coordinate(required_i64(&params, "y")?, "y")?;
        let button = optional_str(&params, "button").unwrap_or("left");
        let code = mouse_button_code(button)?;
        let (xs, ys) = (x.to_string(), y.to_string());

        match pick_backend(&["xdotool", "ydotool"]).await? {
            "xdotool" => {
                run_checked("xdotool", &["mousemove", &xs, &ys, "click", code]).await?;
            }
            backend => {
                run_checked(backend, &["mousemove", "--absolute", &xs, &ys]).await?;
                // Let the compositor settle the cursor before clicking.
                sleep(Duration::from_millis(30)).await;
                run_checked(backend, &["click", code]).await?;
            }
        }
        Ok(ActionOutcome::ok(json!({ "clicked_at": [x, y], "button": button })))
    }
}
