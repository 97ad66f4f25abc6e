//! CLI Send and Demo Commands
//!
//! One-shot client sessions against a running relay.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use wright_client::WrightClient;
use wright_core::parsed_action::scroll_deltas;
use wright_core::{ActionResult, Command, ParsedAction};

#[derive(Debug, Subcommand)]
pub enum ActionArgs {
    /// Navigate to a URL
    Goto { url: String },
    /// Left-click at viewport coordinates
    Click { x: f64, y: f64 },
    /// Type text into the focused element
    Type { text: String },
    /// Scroll by explicit deltas or in a direction
    Scroll {
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        dx: i64,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        dy: i64,
        /// up, down, left or right; overrides the deltas
        #[arg(long)]
        direction: Option<String>,
    },
    /// Capture the viewport
    Screenshot {
        /// Write the JPEG here
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Resize the viewport
    Viewport { width: u32, height: u32 },
    /// Send an agent-style parsed action given as JSON
    Parsed { json: String },
}

impl ActionArgs {
    pub fn to_command(&self) -> Result<Command> {
        let cmd = match self {
            ActionArgs::Goto { url } => Command::goto(url.clone()),
            ActionArgs::Click { x, y } => Command::click(*x, *y),
            ActionArgs::Type { text } => Command::type_text(text.clone()),
            ActionArgs::Scroll { dx, dy, direction } => {
                let (dx, dy) = direction.as_deref().map_or((*dx, *dy), scroll_deltas);
                Command::scroll(dx, dy)
            }
            ActionArgs::Screenshot { .. } => Command::screenshot(),
            ActionArgs::Viewport { width, height } => Command::set_viewport_size(*width, *height),
            ActionArgs::Parsed { json } => {
                let parsed: ParsedAction =
                    serde_json::from_str(json).context("invalid parsed action JSON")?;
                match parsed.to_command() {
                    Some(cmd) => cmd,
                    None => bail!("parsed action `{}` has no relay command", parsed.action),
                }
            }
        };
        Ok(cmd)
    }

    fn output_path(&self) -> Option<&Path> {
        match self {
            ActionArgs::Screenshot { out } => out.as_deref(),
            _ => None,
        }
    }
}

pub async fn run(url: &str, timeout_ms: Option<u64>, action: &ActionArgs) -> Result<()> {
    let mut cmd = action.to_command()?;
    if let Some(timeout_ms) = timeout_ms {
        cmd = cmd.with_timeout(timeout_ms);
    }

    let result = WrightClient::session(url, |client| {
        Box::pin(async move { client.send_action(&cmd).await })
    })
    .await
    .with_context(|| format!("could not connect to {url}"))?;

    println!("{result}");
    if let Some(path) = action.output_path() {
        save_image(&result, path)?;
    }
    if !result.success {
        bail!("{} failed", action_name(action));
    }
    Ok(())
}

/// Navigate to `target` and save a screenshot to `out`.
pub async fn demo(url: &str, target: &str, out: &Path) -> Result<()> {
    let goto = Command::goto(target);
    let results = WrightClient::session(url, |client| {
        Box::pin(async move {
            let navigated = client.send_action(&goto).await;
            let captured = client.send_action(&Command::screenshot()).await;
            (navigated, captured)
        })
    })
    .await
    .with_context(|| format!("could not connect to {url}"))?;

    let (navigated, captured) = results;
    println!("Navigated to {target}. Result: {navigated}");
    save_image(&captured, out)?;
    println!("Screenshot saved as {}", out.display());
    Ok(())
}

fn save_image(result: &ActionResult, path: &Path) -> Result<()> {
    match &result.image {
        Some(image) => std::fs::write(path, image)
            .with_context(|| format!("failed to write {}", path.display())),
        None => bail!(
            "no image returned: {}",
            result.error_message.as_deref().unwrap_or("unknown error")
        ),
    }
}

fn action_name(action: &ActionArgs) -> &'static str {
    match action {
        ActionArgs::Goto { .. } => "goto",
        ActionArgs::Click { .. } => "click",
        ActionArgs::Type { .. } => "type",
        ActionArgs::Scroll { .. } => "scroll",
        ActionArgs::Screenshot { .. } => "screenshot",
        ActionArgs::Viewport { .. } => "set_viewport_size",
        ActionArgs::Parsed { .. } => "parsed action",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wright_core::ActionType;

    #[test]
    fn test_scroll_direction_overrides_deltas() {
        let args = ActionArgs::Scroll {
            dx: 5,
            dy: 5,
            direction: Some("up".into()),
        };
        let cmd = args.to_command().unwrap();
        assert_eq!((cmd.delta_x, cmd.delta_y), (Some(0), Some(-100)));

        let args = ActionArgs::Scroll {
            dx: -30,
            dy: 0,
            direction: None,
        };
        assert_eq!(args.to_command().unwrap().delta_x, Some(-30));
    }

    #[test]
    fn test_parsed_action_json() {
        let args = ActionArgs::Parsed {
            json: r#"{"action": "click", "coordinates": [40, 60]}"#.into(),
        };
        let cmd = args.to_command().unwrap();
        assert_eq!(cmd.action_type, ActionType::Click);
        assert_eq!((cmd.x, cmd.y), (Some(40.0), Some(60.0)));

        let bad = ActionArgs::Parsed { json: "{".into() };
        assert!(bad.to_command().is_err());
    }

    #[test]
    fn test_save_image_requires_image() {
        let dir = std::env::temp_dir().join(format!("wright-cli-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("shot.jpg");

        assert!(save_image(&ActionResult::failure("boom"), &path).is_err());
        save_image(&ActionResult::with_image(vec![0xFF, 0xD8]), &path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), vec![0xFF, 0xD8]);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
