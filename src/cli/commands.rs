use clap::{Parser, Subcommand};

/// `incident-mirror` - mirrors status-page incidents into a Discord channel.
#[derive(Parser, Debug)]
#[command(name = "incident-mirror")]
#[command(version)]
#[command(about = "Mirror status-page incidents into a Discord channel.", long_about = None)]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the daemon (initial check, then scheduled check and archive jobs)
    Run,

    /// Run one reconciliation cycle against the feed and exit
    Check,

    /// Copy the local incident records into the archive once and exit
    Archive,

    /// List the locally tracked incidents and their messages
    Incidents,

    /// List the persisted job schedule
    Jobs,

    /// Show configuration and the last daemon state
    Status,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn verbose_is_global() {
        let cli = Cli::try_parse_from(["incident-mirror", "check", "--verbose"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Check));
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["incident-mirror"]).is_err());
    }
}
