mod cli;
mod commands;
mod config;
mod paths;
mod progress;
mod resource;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use declarative::CancelToken;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

/// Exit code for errors that stop a run before or outside apply
const EXIT_FATAL: u8 = 2;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub config_dir: Option<PathBuf>,
    pub cancel: CancelToken,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config_dir: cli.config_dir,
        cancel: CancelToken::new(),
    };
    install_interrupt_handler(&ctx.cancel);

    match run(&ctx, cli.command) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            report_error(&e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}

fn run(ctx: &Context, command: Command) -> Result<u8> {
    log::trace!("verbosity {}", ctx.verbose);
    match command {
        Command::Apply(args) => commands::apply::run(ctx, &args).map(exit_code),
        Command::Status(args) => commands::status::run(ctx, &args).map(|()| 0),
        Command::Diff(args) => commands::diff::run(ctx, &args).map(|()| 0),
        Command::Doctor(args) => commands::doctor::run(ctx, &args).map(exit_code),
        Command::Search(args) => commands::search::run(ctx, &args).map(|()| 0),
        Command::Info(args) => commands::info::run(ctx, &args).map(exit_code),
        Command::Upgrade(args) => commands::upgrade::run(ctx, &args).map(exit_code),
        Command::Uninstall(args) => commands::uninstall::run(ctx, &args).map(exit_code),
        Command::Lock(cmd) => commands::lock::run(ctx, &cmd).map(|()| 0),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "driftless", &mut io::stdout());
            Ok(0)
        }
    }
}

fn exit_code(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}

/// First Ctrl-C cancels the run after the current item; a second one exits
fn install_interrupt_handler(cancel: &CancelToken) {
    let token = cancel.clone();
    let result = ctrlc::set_handler(move || {
        if token.is_cancelled() {
            std::process::exit(130);
        }
        log::warn!("interrupted, stopping after the current item (Ctrl-C again to abort)");
        token.cancel();
    });
    if let Err(e) = result {
        log::debug!("could not install Ctrl-C handler: {e}");
    }
}

fn report_error(err: &anyhow::Error) {
    ui::error(&format!("{err:#}"));
    if let Some(err) = err.downcast_ref::<declarative::Error>() {
        ui::dim(err.advice());
    }
}
