mod args;
mod session;

use clap::Parser;
use log::debug;

use crate::args::Args;
use crate::session::SessionOptions;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
    debug!("args: {:?}", args);

    let options = SessionOptions {
        config_path: args.config,
        out_path: args.out,
        csv_path: args.csv,
        check_summary_path: args.reference,
        force_close: args.close,
    };
    if let Err(e) = session::run_session(&options).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
