//! CLI surface (spec §2a): `clap` subcommands mirroring the teacher's
//! `Commands` enum, trimmed to what this bridge actually needs to bootstrap.

use clap::{Parser, Subcommand};

#[derive(Parser, Clone, Debug)]
pub struct SharedOpts {
    /// Path to the configuration file; falls back to the default search
    /// locations in [`crate::config::ConfigFile::try_from`] when omitted.
    #[clap(short, long, env = "I3X_CONFIG")]
    pub config: Option<String>,
    #[clap(short, long)]
    pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the bridge: the store actor, the subscription actor, the MQTT
    /// ingest task, and the HTTP server.
    Serve {
        #[clap(flatten)]
        sopt: SharedOpts,
    },
    /// Load and validate a configuration file without starting anything.
    ConfigCheck {
        #[clap(flatten)]
        sopt: SharedOpts,
    },
    /// Print the default configuration document as pretty JSON.
    ExportConfig,
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Serve {
            sopt: SharedOpts {
                config: None,
                debug: false,
            },
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "i3x-bridge", about = "Read-only MQTT-to-i3X protocol bridge")]
#[command(arg_required_else_help(false))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    pub fn command(&self) -> Commands {
        self.command.clone_or_default()
    }
}

/// `Option<Commands>::unwrap_or_default` with a clearer name at the call
/// site, since `Commands` isn't `Clone` by derive (its field is, the enum
/// itself doesn't need to be cloned elsewhere).
trait CloneOrDefault {
    fn clone_or_default(&self) -> Commands;
}

impl CloneOrDefault for Option<Commands> {
    fn clone_or_default(&self) -> Commands {
        match self {
            Some(Commands::Serve { sopt }) => Commands::Serve { sopt: sopt.clone() },
            Some(Commands::ConfigCheck { sopt }) => Commands::ConfigCheck { sopt: sopt.clone() },
            Some(Commands::ExportConfig) => Commands::ExportConfig,
            None => Commands::default(),
        }
    }
}
