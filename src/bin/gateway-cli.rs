use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Operational CLI for the service gateway", long_about = None)]
struct Cli {
    #[arg(short, long, env = "GATEWAY_URL", default_value = "http://localhost:8080")]
    url: String,

    #[arg(short, long, env = "GATEWAY_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Gateway status and registered services
    Status,
    /// Circuit breaker state of every service, or details of one
    Breakers {
        service: Option<String>,
    },
    /// Request totals and 5 minute / 1 hour windows
    Stats,
    /// Most recent requests
    Recent {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Most requested paths
    TopPaths {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Paths with the highest mean response time
    Slowest {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Percentage of responses with status >= 400
    ErrorRate {
        #[arg(short, long)]
        path: Option<String>,
    },
    /// Mean response time in milliseconds
    ResponseTime {
        #[arg(short, long)]
        path: Option<String>,
    },
}

impl Commands {
    fn endpoint(&self) -> (String, Vec<(&'static str, String)>) {
        match self {
            Commands::Status => ("/admin/status".into(), vec![]),
            Commands::Breakers { service: None } => ("/admin/breakers".into(), vec![]),
            Commands::Breakers { service: Some(name) } => (format!("/admin/breakers/{name}"), vec![]),
            Commands::Stats => ("/admin/metrics/stats".into(), vec![]),
            Commands::Recent { limit } => ("/admin/metrics/recent".into(), vec![("limit", limit.to_string())]),
            Commands::TopPaths { limit } => ("/admin/metrics/top-paths".into(), vec![("limit", limit.to_string())]),
            Commands::Slowest { limit } => ("/admin/metrics/slowest".into(), vec![("limit", limit.to_string())]),
            Commands::ErrorRate { path } => ("/admin/metrics/error-rate".into(), path_query(path)),
            Commands::ResponseTime { path } => ("/admin/metrics/response-time".into(), path_query(path)),
        }
    }
}

fn path_query(path: &Option<String>) -> Vec<(&'static str, String)> {
    path.iter().map(|p| ("path", p.clone())).collect()
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

    let (endpoint, query) = cli.command.endpoint();
    let res = client
        .get(format!("{}{}", cli.url.trim_end_matches('/'), endpoint))
        .query(&query)
        .headers(headers)
        .send()
        .await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
