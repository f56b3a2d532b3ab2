use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "guard-cli")]
#[command(about = "Inspect breaker health of a running resource-guard", long_about = None)]
struct Cli {
    /// Gateway address (health endpoints).
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Admin listener address.
    #[arg(short, long, default_value = "http://localhost:8081")]
    admin_url: String,

    /// Admin API key.
    #[arg(short, long, env = "GUARD_ADMIN_KEY", default_value = "")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate health of every upstream
    Health,
    /// Health report of one upstream
    Breaker { name: String },
    /// Admin system status
    Status,
    /// Every breaker with its effective settings
    Breakers,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut admin_headers = HeaderMap::new();
    admin_headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let res = match &cli.command {
        Commands::Health => client.get(format!("{}/health", cli.url)).send().await?,
        Commands::Breaker { name } => {
            client
                .get(format!("{}/health/{}", cli.url, name))
                .send()
                .await?
        }
        Commands::Status => {
            client
                .get(format!("{}/admin/status", cli.admin_url))
                .headers(admin_headers)
                .send()
                .await?
        }
        Commands::Breakers => {
            client
                .get(format!("{}/admin/breakers", cli.admin_url))
                .headers(admin_headers)
                .send()
                .await?
        }
    };

    print_response(res).await
}

/// Print the JSON body. `/health` answers 503 with a full body when a
/// breaker is open, so any JSON body is printed regardless of status.
async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => {
            if !status.is_success() {
                eprintln!("Status: {}", status);
            }
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        Err(_) => {
            eprintln!("Error: server returned status {}", status);
            if !text.is_empty() {
                eprintln!("Response: {}", text);
            }
            std::process::exit(1);
        }
    }
    Ok(())
}
