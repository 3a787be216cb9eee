mod app;
mod commands;
mod output;

use clap::Parser;

use crate::app::{Cli, Command};

fn main() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        eprintln!("\nCancelled.");
        std::process::exit(130);
    })
    .expect("failed to set Ctrl+C handler");

    let cli = Cli::parse();

    // catopt info+ on stderr unless --json; --verbose enables debug; RUST_LOG overrides
    if !cli.global.json {
        let level = if cli.global.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        env_logger::Builder::new()
            .filter_module("catopt", level)
            .parse_default_env()
            .target(env_logger::Target::Stderr)
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(false)
            .init();
    }

    match &cli.command {
        Command::Eliminate { path } => {
            commands::optimize::run(path, commands::optimize::Stage::Eliminate, &cli.global)
        }
        Command::Expand { path } => {
            commands::optimize::run(path, commands::optimize::Stage::Expand, &cli.global)
        }
        Command::Variadic {
            path,
            max_iterations,
        } => commands::optimize::run(
            path,
            commands::optimize::Stage::Variadic {
                max_iterations: *max_iterations,
            },
            &cli.global,
        ),
        Command::Pipeline {
            path,
            no_eliminate,
            no_expand,
            no_variadic,
            max_iterations,
            verify,
        } => {
            let config = catopt::compiler::OptimizerConfig::new()
                .with_common_inputs(!*no_eliminate)
                .with_expansion(!*no_expand)
                .with_variadic(!*no_variadic)
                .with_max_fixpoint_iterations(*max_iterations)
                .with_verification(*verify);
            commands::optimize::run(
                path,
                commands::optimize::Stage::Pipeline(config),
                &cli.global,
            )
        }
        Command::Print { path } => commands::print::run(path, &cli.global),
    }
}
