use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum SystemCommands {
    /// Materialize the data directory and local task document.
    Init,
    /// Probe the configured provider and print capabilities.
    Status,
    Config {
        #[command(subcommand)]
        subcommand: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    Show,
    Set { key: String, value: String },
    Validate,
    Reset,
}
