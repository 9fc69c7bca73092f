//! Demo binary: builds a `Pipeline` and prints the `Decision` for a
//! handful of sample requests, or for a single request supplied via flags.

use admitctl_core::{Pipeline, PipelineConfig};
use admitctl_validator::Request;
use clap::Parser;

#[derive(Parser)]
#[command(name = "admitctl")]
#[command(about = "HTTP admission-control pipeline demo")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Evaluate a single request and print the resulting decision.
    Check {
        #[arg(long, default_value = "GET")]
        method: String,
        #[arg(long)]
        path: String,
        #[arg(long, default_value = "")]
        query: String,
        #[arg(long, default_value = "203.0.113.1")]
        client_ip: String,
    },
    /// Run a few built-in sample requests through the pipeline.
    Demo,
}

async fn run_demo(pipeline: &Pipeline) {
    let samples = [
        Request::new("GET", "/api/widgets").with_client_addr("203.0.113.10"),
        Request::new("TRACE", "/x").with_client_addr("203.0.113.11"),
        Request::new("GET", "/search")
            .with_query("q=1' OR '1'='1' UNION SELECT password FROM users--")
            .with_client_addr("198.51.100.20"),
        Request::new("GET", "/health")
            .with_query("q=1' OR '1'='1'")
            .with_client_addr("198.51.100.21"),
    ];

    for request in &samples {
        let decision = pipeline.evaluate(request).await;
        println!("{} {} -> {decision:?}", request.method, request.path);
    }

    let summary = pipeline.metrics_summary();
    println!("\nmetrics summary: {summary:?}");
}

async fn run_check(pipeline: &Pipeline, method: &str, path: &str, query: &str, client_ip: &str) {
    let mut request = Request::new(method, path).with_client_addr(client_ip);
    if !query.is_empty() {
        request = request.with_query(query);
    }
    let decision = pipeline.evaluate(&request).await;
    println!("{decision:?}");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let pipeline = Pipeline::new(PipelineConfig::default()).await?;

    match cli.command {
        Some(Commands::Check { method, path, query, client_ip }) => {
            run_check(&pipeline, &method, &path, &query, &client_ip).await;
        }
        Some(Commands::Demo) | None => {
            run_demo(&pipeline).await;
        }
    }

    Ok(())
}
