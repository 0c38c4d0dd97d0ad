use std::path::PathBuf;

use clap::Parser;

use soldrive::utils::config::Config;

/// Command-line overrides applied on top of the environment configuration.
#[derive(Parser, Debug)]
#[command(name = "soldrive", about = "Soldrive access directory client")]
pub struct Cli {
    /// Ledger JSON-RPC endpoint; runs against an in-memory ledger when unset
    #[arg(short, long)]
    pub rpc_url: Option<String>,

    /// Keypair file used by `connect`
    #[arg(short, long)]
    pub keypair: Option<PathBuf>,

    /// Content gateway host
    #[arg(short, long)]
    pub gateway: Option<String>,

    /// Base58 program id
    #[arg(short, long)]
    pub program_id: Option<String>,
}

impl Cli {
    pub fn apply(self, mut config: Config) -> anyhow::Result<Config> {
        if let Some(url) = self.rpc_url {
            config.rpc_url = Some(url);
        }
        if let Some(path) = self.keypair {
            config.keypair_path = path;
        }
        if let Some(host) = self.gateway {
            config.gateway_host = host;
        }
        if let Some(id) = self.program_id {
            config.program_id = id.parse()?;
        }
        Ok(config)
    }
}
