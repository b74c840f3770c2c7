//! Command-line flags. CLI values override anything loaded from the config
//! file — merging the two happens in `main`, not here.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "sedma-server",
    version,
    about = "Multi-room Sedma card game server",
    long_about = "Accepts concurrent TCP clients speaking a line-oriented text \
                  protocol, hosts 2-4 player Sedma games across multiple rooms, \
                  and survives transient disconnects via session resume."
)]
pub struct Args {
    /// Path to an INI-style config file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<String>,

    /// Address to bind to, overriding the config file.
    #[arg(long)]
    pub ip: Option<String>,

    /// Port to listen on, overriding the config file.
    #[arg(long)]
    pub port: Option<u16>,

    /// Maximum concurrent clients, overriding the config file.
    #[arg(long = "max-clients")]
    pub max_clients: Option<u32>,

    /// Maximum concurrent rooms, overriding the config file.
    #[arg(long = "max-rooms")]
    pub max_rooms: Option<u32>,
}
