mod cards;
mod cli;
mod dump;
mod error;
mod ndef;
mod types;

use clap::Parser;
use log::error;

fn main() {
    env_logger::init();

    let cli = cli::Cli::parse();
    if let Err(err) = cli::run(cli) {
        error!("{:?}", err);
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}
