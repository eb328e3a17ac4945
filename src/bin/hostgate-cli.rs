use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "hostgate-cli")]
#[command(about = "Management CLI for the hostgate admin API", long_about = None)]
struct Cli {
    /// Admin API base URL, as printed by hostgate at startup
    #[arg(short, long, default_value = "http://localhost:2022")]
    url: String,

    /// Access token, as printed by hostgate at startup
    #[arg(short, long)]
    token: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the running fleet definition
    List,
    /// Print runtime state of every server
    Status,
    /// Replace the running fleet with a JSON array of servers
    Apply { file: PathBuf },
    /// Add or replace one server from a JSON object
    Upsert { file: PathBuf },
    /// Write a fleet to the server's config file without applying it
    Save { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&cli.token)?);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let request = match cli.command {
        Commands::List => client.get(format!("{}/api/servers", base)),
        Commands::Status => client.get(format!("{}/api/status", base)),
        Commands::Apply { file } => client
            .patch(format!("{}/api/servers", base))
            .body(std::fs::read(file)?),
        Commands::Upsert { file } => client
            .post(format!("{}/api/server", base))
            .body(std::fs::read(file)?),
        Commands::Save { file } => client
            .post(format!("{}/api/servers", base))
            .body(std::fs::read(file)?),
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v.get("err").and_then(Value::as_str).map(str::to_string))
            .unwrap_or(text);
        return Err(format!("admin API returned {}: {}", status, message).into());
    }

    let json: Value = serde_json::from_str(&text)?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
