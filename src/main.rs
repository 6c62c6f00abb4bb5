use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use dotenvy::dotenv;
use tracing::{info, warn};

mod config;
mod formatter;
mod handlers;
mod llm;
mod state;
mod utils;

use config::CONFIG;
use formatter::split_into_cards;
use llm::media::decode_upload;
use llm::{AttributeAnalyzer, GeminiAnalyzer, GeminiSettings};
use state::AppState;
use utils::logging::init_logging;

#[derive(Debug, PartialEq, Eq)]
struct AnalyzeFileArgs {
    file_path: PathBuf,
}

fn analyze_usage() -> &'static str {
    "Usage: persona-vision [analyze --file <path-to-jpeg-or-png>]"
}

fn parse_analyze_args(args: &[String]) -> anyhow::Result<Option<AnalyzeFileArgs>> {
    match args.get(1).map(|value| value.as_str()) {
        None => return Ok(None),
        Some("analyze") => {}
        Some("--help") | Some("-h") => return Err(anyhow!(analyze_usage())),
        Some(other) => {
            return Err(anyhow!("Unknown command: {other}\n{}", analyze_usage()));
        }
    }

    let mut file_path: Option<PathBuf> = None;
    let mut index = 2;
    while index < args.len() {
        match args[index].as_str() {
            "--file" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("Missing value for --file"))?;
                file_path = Some(PathBuf::from(value));
            }
            "--help" | "-h" => {
                return Err(anyhow!(analyze_usage()));
            }
            other => {
                return Err(anyhow!(
                    "Unknown analyze argument: {other}\n{}",
                    analyze_usage()
                ));
            }
        }
        index += 1;
    }

    let file_path = file_path.ok_or_else(|| anyhow!("--file is required"))?;
    Ok(Some(AnalyzeFileArgs { file_path }))
}

async fn run_analyze_file(args: AnalyzeFileArgs, analyzer: &dyn AttributeAnalyzer) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(&args.file_path)
        .await
        .with_context(|| format!("Failed to read {}", args.file_path.display()))?;
    let file_name = args
        .file_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());
    let image = decode_upload(bytes, file_name)?;

    let text = analyzer.analyze(&image).await?;
    let cards = split_into_cards(&text);
    if cards.is_empty() {
        warn!("Analysis produced no labelled attributes");
    }
    for card in cards {
        println!("{}: {}", card.title, card.body);
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    let analyze_args = parse_analyze_args(&args)?;

    let _guards = init_logging(&CONFIG.log_level);
    let analyzer = GeminiAnalyzer::new(GeminiSettings::from_config(&CONFIG));

    if let Some(analyze_args) = analyze_args {
        return run_analyze_file(analyze_args, &analyzer).await;
    }

    info!(
        "Starting PersonaVision on {} (model={})",
        CONFIG.bind_addr, CONFIG.gemini_model
    );
    let state = AppState::new(Arc::new(analyzer));
    let app = handlers::create_router(state, CONFIG.upload_limit_bytes);

    let listener = tokio::net::TcpListener::bind(CONFIG.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", CONFIG.bind_addr))?;
    info!("Listening on http://{}", CONFIG.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn no_arguments_starts_the_server() {
        assert_eq!(parse_analyze_args(&args(&["persona-vision"])).unwrap(), None);
    }

    #[test]
    fn analyze_requires_a_file() {
        let parsed = parse_analyze_args(&args(&["persona-vision", "analyze", "--file", "me.jpg"]))
            .unwrap()
            .unwrap();
        assert_eq!(parsed.file_path, PathBuf::from("me.jpg"));

        let err = parse_analyze_args(&args(&["persona-vision", "analyze"])).unwrap_err();
        assert_eq!(err.to_string(), "--file is required");
    }

    #[test]
    fn unknown_arguments_are_rejected() {
        assert!(parse_analyze_args(&args(&["persona-vision", "serve"])).is_err());
        assert!(parse_analyze_args(&args(&["persona-vision", "analyze", "--verbose"])).is_err());
        assert!(parse_analyze_args(&args(&["persona-vision", "analyze", "--file"])).is_err());
    }
}
