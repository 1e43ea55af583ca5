pub mod cli;

use booking::{engine::BookingEngine, shutdown::Shutdown};
use clap::Parser;
use common::logger::{LogFormat, init_logger};

use cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = if cli.json_logs { LogFormat::Json } else { LogFormat::Pretty };
    init_logger("ticket-booking", format);

    let cfg = cli.to_config();
    println!(
        "Running with totalTickets={} totalUsers={} workerCount={}",
        cfg.total_tickets, cfg.total_users, cfg.worker_count
    );

    let engine = BookingEngine::new(cfg)?;

    let (shutdown, trigger) = Shutdown::new();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = ?e, "failed to listen for ctrl_c");
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = trigger.send(true);
    });

    let out = engine.run_with_shutdown(shutdown).await?;

    if !cli.quiet {
        for result in &out.results {
            println!("{result}");
        }
    }

    if cli.json {
        println!("{}", out.report.to_json()?);
    } else {
        println!("{}", out.report);
    }

    out.report.ensure_clean()?;
    Ok(())
}
