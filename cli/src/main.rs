mod commands;
mod terminal;

use anyhow::Context;
use commands::{CommandLine, Commands, status, sweep};
use terminal::{logging, print};

fn main() -> anyhow::Result<()> {
    let commands = CommandLine::parse_args();

    logging::init_logging(commands.verbose);
    print::banner();

    // Every probe parks a blocking thread while it waits for its reply.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .max_blocking_threads(commands.workers().max(1))
        .build()
        .context("failed to start the async runtime")?;

    runtime.block_on(async move {
        match commands.command {
            Some(Commands::Sweep(args)) => sweep::sweep(args.to_config()?).await,
            Some(Commands::Status(args)) => status::status(args).await,
            None => sweep::sweep(commands.sweep.to_config()?).await,
        }
    })
}
