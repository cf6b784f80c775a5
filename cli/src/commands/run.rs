use std::process::exit;

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::{Parser, ValueEnum, ValueHint};
use miette::NamedSource;
use tracing::{debug, error, info};
use tpm_emulator::constants::Word;
use tpm_emulator::image::{self, Format};
use tpm_emulator::runtime::{Reg, Terminal};
use tpm_emulator::Computer;

#[derive(ValueEnum, Clone, Copy, Debug, Default)]
enum ImageFormat {
    /// One word per line
    #[default]
    Text,

    /// Little-endian 64-bit words
    Binary,
}

impl From<ImageFormat> for Format {
    fn from(format: ImageFormat) -> Self {
        match format {
            ImageFormat::Text => Self::Text,
            ImageFormat::Binary => Self::Binary,
        }
    }
}

/// A register value set before the program starts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Preset {
    reg: Reg,
    value: Word,
}

/// Parse a `REG=VALUE` preset. Values are doubles, unless suffixed with `i`.
fn parse_preset(arg: &str) -> anyhow::Result<Preset> {
    let (reg, value) = arg
        .split_once('=')
        .context("expected a REG=VALUE pair")?;
    let reg: Reg = reg.trim().parse()?;
    let value = value.trim();

    let value = if let Some(integer) = value.strip_suffix('i') {
        let integer: i64 = integer
            .parse()
            .with_context(|| format!("invalid integer {integer:?}"))?;
        Word::from_ne_bytes(integer.to_ne_bytes())
    } else {
        let double: f64 = value
            .parse()
            .with_context(|| format!("invalid number {value:?}"))?;
        double.to_bits()
    };

    Ok(Preset { reg, value })
}

#[derive(Parser, Debug)]
pub struct RunOpt {
    /// Program image
    #[arg(value_hint = ValueHint::FilePath)]
    input: Utf8PathBuf,

    /// Format of the program image
    #[arg(short, long, value_enum, default_value_t)]
    format: ImageFormat,

    /// Set a register before running, e.g. `r0=2.5` or `sp=40001i`
    #[arg(short = 's', long = "set", value_name = "REG=VALUE", value_parser = parse_preset)]
    presets: Vec<Preset>,
}

impl RunOpt {
    pub fn exec(self) -> anyhow::Result<()> {
        info!(path = %self.input, "Reading program");
        let bytes = std::fs::read(&self.input)
            .with_context(|| format!("could not read {}", self.input))?;

        debug!(format = ?self.format, "Parsing program image");
        let program = match image::parse(&bytes, self.format.into()) {
            Ok(p) => p,
            Err(e) => {
                let source = String::from_utf8_lossy(&bytes).into_owned();
                let report = miette::Report::new(e)
                    .with_source_code(NamedSource::new(self.input.as_str(), source));
                eprintln!("{report:?}");
                exit(1);
            }
        };

        let mut computer = Computer::with_program(&program)?;
        for preset in &self.presets {
            debug!(reg = %preset.reg, value = preset.value, "Presetting register");
            computer.registers.set(preset.reg, preset.value);
        }

        info!("Running program");
        let stdin = std::io::stdin().lock();
        let stdout = std::io::stdout().lock();
        let mut terminal = Terminal::new(stdin, stdout);

        if let Err(fault) = computer.run(&mut terminal) {
            error!(registers = %computer.registers, cycles = computer.cycles, "Program faulted");
            return Err(fault.into());
        }

        info!(registers = %computer.registers, cycles = computer.cycles, "End of program");

        Ok(())
    }
}
