//! prom-light agent entry point.

use clap::Parser;
use prom_light::cli::{self, AgentCli};
use prom_light::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = AgentCli::parse();
    cli::execute_agent(cli).await
}
