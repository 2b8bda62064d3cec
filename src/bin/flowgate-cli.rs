use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

use flowgate::auth::generate_credential;

#[derive(Parser)]
#[command(name = "flowgate-cli")]
#[command(about = "Management CLI for the Flowgate workflow gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[arg(short, long, env = "FLOWGATE_ADMIN_KEY", default_value = "")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gateway liveness
    Health,
    /// Show request, auth and execution counters
    Metrics,
    /// Remove expired, over-age and orphaned sessions
    CleanupSessions,
    /// List live sessions of a tenant
    Sessions {
        #[arg(short, long)]
        tenant: String,
    },
    /// Generate a credential secret and the hash to store for it (offline)
    NewCredential,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let client = reqwest::Client::new();
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let request = match &cli.command {
        Commands::NewCredential => {
            let (secret, hash) = generate_credential();
            println!("secret:      {secret}");
            println!("secret_hash: {hash}");
            eprintln!("The secret is shown once; store only the hash.");
            return Ok(());
        }
        Commands::Health => client.get(format!("{}/health", cli.url)),
        Commands::Metrics => client
            .get(format!("{}/admin/metrics", cli.url))
            .headers(headers),
        Commands::CleanupSessions => client
            .post(format!("{}/admin/sessions/cleanup", cli.url))
            .headers(headers),
        Commands::Sessions { tenant } => client
            .get(format!("{}/admin/sessions", cli.url))
            .query(&[("tenant_id", tenant)])
            .headers(headers),
    };

    print_response(request.send().await?).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
