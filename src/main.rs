use shipwright::cli::commands::{CliArgs, Commands};
use shipwright::cli::handlers::{
    handle_agent, handle_audit, handle_config, handle_cost, handle_health, handle_investigate,
    handle_run, handle_tools,
};
use shipwright::util::{init_logging, json_from_env, parse_level, LoggingConfig};
use shipwright::VERSION;

use clap::Parser;
use std::env;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Level};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("shipwright v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            on_interrupt.cancel();
        }
    });

    let exit_code = match &args.command {
        Commands::Investigate(a) => handle_investigate(a, &cancel).await,
        Commands::Agent(a) => handle_agent(a, &cancel).await,
        Commands::Audit(a) => handle_audit(a, &cancel).await,
        Commands::Cost(a) => handle_cost(a, &cancel).await,
        Commands::Run(a) => handle_run(a, &cancel).await,
        Commands::Tools(a) => handle_tools(a),
        Commands::Health(a) => handle_health(a).await,
        Commands::Config(a) => handle_config(a),
    };

    std::process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs) {
    let level = if let Some(level_str) = &args.log_level {
        parse_level(level_str)
    } else if args.verbose {
        Level::DEBUG
    } else if args.quiet {
        Level::ERROR
    } else {
        let level_str = env::var("SHIPWRIGHT_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        parse_level(&level_str)
    };

    init_logging(LoggingConfig::for_level(level, json_from_env()));
}
