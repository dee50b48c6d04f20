use colored::*;
use fdguard::link::{BusHub, DEFAULT_BUS_HOST, DEFAULT_BUS_PORT};
use std::env;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    println!("{}", "CAN-FD Bus Hub".bright_blue().bold());
    println!("==============");

    // Optional first argument overrides the listen address
    let addr = env::args()
        .nth(1)
        .unwrap_or_else(|| format!("{}:{}", DEFAULT_BUS_HOST, DEFAULT_BUS_PORT));

    let hub = BusHub::bind(addr.as_str()).await?;
    println!("{} {}", "Relaying frames on".dimmed(), hub.local_addr()?);

    let hub_task = tokio::spawn(async move {
        if let Err(e) = hub.run().await {
            error!("Bus hub error: {}", e);
        }
    });

    signal::ctrl_c().await?;
    info!("Shutting down bus hub");

    hub_task.abort();
    println!("{}", "Bus hub stopped".bright_green());

    Ok(())
}
