use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use shallowref::{
    cli::{
        args::CliArgs,
        command_handlers::{do_fetch, FetchSettings},
    },
    config::ShallowRefConfig,
    FetchError,
};

async fn run(cli_args: CliArgs) -> anyhow::Result<()> {
    let config = ShallowRefConfig::load()?;
    let settings = FetchSettings::resolve(cli_args, config)?;

    let outcome = do_fetch(settings).await?;
    info!(
        "Done: {} ({} objects, {} bytes, shallow: {})",
        outcome.commit,
        outcome.stats.received_objects,
        outcome.stats.received_bytes,
        outcome.shallow
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli_args = CliArgs::parse();

    match run(cli_args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<FetchError>() {
            Some(fetch_error) => {
                error!("{}", fetch_error);
                ExitCode::from(fetch_error.exit_code())
            }
            None => {
                error!("{:#}", e);
                ExitCode::FAILURE
            }
        },
    }
}
