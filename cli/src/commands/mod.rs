mod completion;
mod run;

#[derive(clap::Subcommand, Debug)]
pub enum Subcommand {
    /// Load a program image and run it
    Run(self::run::RunOpt),

    /// Generate shell completions
    Completion(self::completion::CompletionOpt),
}

impl Subcommand {
    /// Run a subcommand
    pub fn exec(self) -> anyhow::Result<()> {
        match self {
            Self::Run(opt) => opt.exec(),
            Self::Completion(opt) => {
                opt.exec();
                Ok(())
            }
        }
    }
}
