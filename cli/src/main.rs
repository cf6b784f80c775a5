use std::io::IsTerminal;
use std::process::ExitCode;

use anstyle::{AnsiColor, Style};
use clap::builder::Styles;
use clap::Parser;
use tracing::error;
use tracing_subscriber::filter::{EnvFilter, ParseError};
use tracing_subscriber::prelude::*;

mod commands;

use crate::commands::Subcommand;

const STYLES: Styles = Styles::styled()
    .header(Style::new().bold().fg_color(Some(anstyle::Color::Ansi(AnsiColor::Yellow))))
    .usage(Style::new().bold().fg_color(Some(anstyle::Color::Ansi(AnsiColor::Yellow))))
    .literal(Style::new().fg_color(Some(anstyle::Color::Ansi(AnsiColor::Green))))
    .placeholder(Style::new().fg_color(Some(anstyle::Color::Ansi(AnsiColor::Cyan))));

#[derive(Parser)]
#[command(name = "tpm", version, author, about, styles = STYLES)]
struct Opt {
    /// Increase the level of verbosity. Can be used multiple times.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Force colored output. Default is to check if the output is a tty
    #[arg(short = 'c', long, global = true, conflicts_with = "no_color")]
    color: bool,

    /// Force non-colored output. Default is to check if the output is a tty
    #[arg(short = 'C', long, global = true)]
    no_color: bool,

    /// Use JSON output for log messages
    #[arg(short, long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Subcommand,
}

impl Opt {
    const fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "tpm_emulator=debug,tpm_cli=debug,info",
            2 => "tpm_emulator=trace,tpm_cli=trace,info",
            3 => "tpm_emulator=trace,tpm_cli=trace,debug",
            4..=u8::MAX => "trace",
        }
    }

    fn should_use_colors(&self) -> bool {
        if self.color {
            true
        } else if self.no_color {
            false
        } else {
            std::io::stderr().is_terminal()
        }
    }

    fn filter_layer(&self) -> Result<EnvFilter, ParseError> {
        // Parse log level from env
        EnvFilter::try_from_default_env()
            // or infer from args
            .or_else(|_| EnvFilter::try_new(self.log_filter()))
    }

    /// Logs go to stderr, stdout belongs to the program being run
    fn init_tracing(&self) -> Result<(), ParseError> {
        let registry = tracing_subscriber::Registry::default().with(self.filter_layer()?);

        if self.json {
            let json_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr);
            registry.with(json_layer).init();
        } else {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .without_time()
                .with_ansi(self.should_use_colors())
                .with_target(false)
                .with_writer(std::io::stderr);
            registry.with(fmt_layer).init();
        }

        Ok(())
    }
}

fn main() -> ExitCode {
    // First, parse the arguments
    let opt = Opt::parse();

    // Then, setup the tracing formatter for logging and instrumentation
    if let Err(e) = opt.init_tracing() {
        eprintln!("invalid log filter: {e}");
        return ExitCode::FAILURE;
    }

    // And run the command
    if let Err(e) = opt.command.exec() {
        error!("{}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
