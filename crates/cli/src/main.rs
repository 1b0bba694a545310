use clap::Parser;
use ferrous_replay_domain::{CliOverrides, SutEndpoint};
use std::path::PathBuf;
use tracing::{error, info};

mod bootstrap;
mod runner;

use runner::ScenarioRunner;

#[derive(Parser, Debug)]
#[command(name = "ferrous-replay")]
#[command(version)]
#[command(about = "Ferrous Replay - scripted DNS scenarios against a resolver under test")]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<String>,

    /// Resolver under test, `name=ip:port` or `ip:port` (repeatable)
    #[arg(long = "sut", value_name = "ENDPOINT")]
    sut: Vec<SutEndpoint>,

    /// Port the mock upstream servers listen on
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Hard deadline for a single query, in milliseconds
    #[arg(long)]
    query_timeout_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Scenario files to play
    #[arg(required = true, value_name = "SCENARIO")]
    scenarios: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cli_overrides = CliOverrides {
        server_port: cli.port,
        query_timeout_ms: cli.query_timeout_ms,
        log_level: cli.log_level.clone(),
        sut: cli.sut.clone(),
    };

    let config = bootstrap::load_config(cli.config.as_deref(), cli_overrides)?;
    bootstrap::init_logging(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        scenarios = cli.scenarios.len(),
        port = config.server.port,
        "Starting Ferrous Replay"
    );

    let runner = ScenarioRunner::new(config);
    let mut failed = 0usize;
    for path in &cli.scenarios {
        match runner.run(path).await {
            Ok(report) => {
                println!(
                    "PASS {} ({} steps, {} retries)",
                    path.display(),
                    report.steps_executed,
                    report.retries
                );
            }
            Err(e) => {
                failed += 1;
                error!(file = %path.display(), error = %e, "Scenario failed");
                println!("FAIL {}: {}", path.display(), e);
            }
        }
    }

    println!(
        "{} passed, {} failed",
        cli.scenarios.len() - failed,
        failed
    );
    if failed > 0 {
        anyhow::bail!("{} of {} scenarios failed", failed, cli.scenarios.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_accepts_named_endpoints() {
        let cli = Cli::try_parse_from([
            "ferrous-replay",
            "--sut",
            "127.0.0.1:53",
            "--sut",
            "secondary=127.0.0.2:5353",
            "-p",
            "5300",
            "a.rpl",
            "b.rpl",
        ])
        .unwrap();

        assert_eq!(cli.sut.len(), 2);
        assert_eq!(cli.sut[0].name, "default");
        assert_eq!(cli.sut[1].name, "secondary");
        assert_eq!(cli.port, Some(5300));
        assert_eq!(cli.scenarios.len(), 2);
    }

    #[test]
    fn test_cli_requires_a_scenario() {
        assert!(Cli::try_parse_from(["ferrous-replay", "--sut", "127.0.0.1:53"]).is_err());
    }

    #[test]
    fn test_cli_rejects_bad_endpoint() {
        assert!(Cli::try_parse_from(["ferrous-replay", "--sut", "nowhere", "a.rpl"]).is_err());
    }
}
