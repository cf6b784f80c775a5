use std::io::Write;

use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell};

use crate::Opt;

#[derive(Parser, Debug)]
pub struct CompletionOpt {
    /// Shell to generate the completion script for
    #[arg(value_enum)]
    shell: Shell,
}

/// Write the completion script of `tpm` for the given shell
fn write_completions(shell: Shell, out: &mut dyn Write) {
    let mut command = Opt::command();
    let name = command.get_name().to_owned();
    generate(shell, &mut command, name, out);
}

impl CompletionOpt {
    pub fn exec(&self) {
        write_completions(self.shell, &mut std::io::stdout().lock());
    }
}
