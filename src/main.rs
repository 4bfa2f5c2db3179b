use clap::Parser;
use hfta::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
