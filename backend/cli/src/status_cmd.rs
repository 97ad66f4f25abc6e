//! CLI Status Command
//!
//! Queries a running relay's health endpoint.

use anyhow::Result;

pub async fn run(host: &str, port: u16) -> Result<()> {
    let url = format!("http://{host}:{port}/api/health");
    let client = reqwest::Client::new();
    match client.get(&url).send().await {
        Ok(resp) => {
            let body: serde_json::Value = resp.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Err(_) => {
            println!("Wright relay is not running on {host}:{port}");
        }
    }
    Ok(())
}
