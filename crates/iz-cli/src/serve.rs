//! Background service over newline-delimited JSON
//!
//! Each stdin line is one message; each answer is written as one stdout
//! line. Rules persist in a JSON storage file and the installed ruleset
//! is written to a second JSON file.

use std::path::PathBuf;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use iz_service::{Background, JsonFilePlatform, JsonFileStorage, PlatformRuleStore, RuleStorage, ServiceConfig};

pub struct ServeOptions {
    pub storage: PathBuf,
    pub ruleset: PathBuf,
    pub config: ServiceConfig,
}

pub fn run_serve(opts: ServeOptions) -> Result<(), String> {
    let runtime = tokio::runtime::Runtime::new().map_err(|e| format!("Failed to start tokio runtime: {}", e))?;
    runtime.block_on(serve(opts))
}

async fn serve(opts: ServeOptions) -> Result<(), String> {
    log::info!(
        "serving with storage '{}' and ruleset '{}'",
        opts.storage.display(),
        opts.ruleset.display()
    );
    let background = Background::new(
        opts.config,
        JsonFileStorage::new(opts.storage),
        JsonFilePlatform::new(opts.ruleset),
    )
    .map_err(|e| e.to_string())?;

    match background.start().await {
        Ok(count) => log::info!("restored {} rules", count),
        Err(e) => log::error!("startup sync failed: {}", e),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| format!("Failed to read stdin: {}", e))?
    {
        let Some(response) = handle_line(&background, &line).await else {
            continue;
        };
        let mut out = response.to_string();
        out.push('\n');
        stdout
            .write_all(out.as_bytes())
            .await
            .map_err(|e| format!("Failed to write stdout: {}", e))?;
        stdout.flush().await.map_err(|e| format!("Failed to write stdout: {}", e))?;
    }

    Ok(())
}

/// Answer one input line. Blank lines get no answer.
pub async fn handle_line<S, P>(background: &Background<S, P>, line: &str) -> Option<Value>
where
    S: RuleStorage,
    P: PlatformRuleStore,
{
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(message) => Some(background.handle(message).await),
        Err(e) => Some(json!({ "success": false, "error": format!("Invalid JSON: {}", e) })),
    }
}

#[cfg(test)]
mod tests {
    use iz_service::{MemoryPlatform, MemoryStorage};

    use super::*;

    #[tokio::test]
    async fn test_handle_line() {
        let background =
            Background::new(ServiceConfig::default(), MemoryStorage::new(), MemoryPlatform::new()).unwrap();

        assert_eq!(handle_line(&background, "   ").await, None);

        let bad = handle_line(&background, "{nope").await.unwrap();
        assert_eq!(bad["success"], false);

        let update = r#"{"action":"updateRules","rules":[{"id":"1","name":"A","type":"overrides","enabled":true,"source":"*/a"}]}"#;
        assert_eq!(
            handle_line(&background, update).await,
            Some(json!({"success": true, "count": 1}))
        );
        assert_eq!(
            handle_line(&background, r#"{"action":"getRuleCount"}"#).await,
            Some(json!({"count": 1}))
        );
    }

    #[tokio::test]
    async fn test_file_backed_service_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let storage = dir.path().join("storage.json");
        let ruleset = dir.path().join("ruleset.json");

        let first = Background::new(
            ServiceConfig::default(),
            JsonFileStorage::new(&storage),
            JsonFilePlatform::new(&ruleset),
        )
        .unwrap();
        let update = r#"{"action":"updateRules","rules":[{"id":"1","name":"A","type":"overrides","enabled":true,"source":"*/a"}]}"#;
        handle_line(&first, update).await.unwrap();

        let second = Background::new(
            ServiceConfig::default(),
            JsonFileStorage::new(&storage),
            JsonFilePlatform::new(&ruleset),
        )
        .unwrap();
        assert_eq!(second.start().await.unwrap(), 1);
        let rules = handle_line(&second, r#"{"action":"getRules"}"#).await.unwrap();
        assert_eq!(rules["rules"][0]["platformId"], 1000);
        assert_eq!(
            handle_line(&second, r#"{"action":"getRuleCount"}"#).await,
            Some(json!({"count": 1}))
        );
    }
}
