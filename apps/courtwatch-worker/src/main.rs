use clap::Parser;

use courtwatch_worker::Args;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	courtwatch_worker::run(Args::parse()).await
}
