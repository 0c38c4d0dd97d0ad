use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::Parser;
use log::{info, warn};
use rustyline::DefaultEditor;
use serde::{Deserialize, Serialize};

use soldrive::error::DirectoryError;
use soldrive::gateway::GatewayClient;
use soldrive::handlers::{self, notify_error, Notification};
use soldrive::ledger::{JsonRpcLedger, Ledger, MemoryLedger};
use soldrive::models::{AccessLevel, Address};
use soldrive::services::{AccessDirectory, Dashboard, FileEntry, PendingOps, SharedEntry};
use soldrive::utils::config::Config;
use soldrive::wallet::Wallet;

mod cli;

const SESSION_FILE: &str = ".session.json";

#[derive(Serialize, Deserialize)]
struct Session {
    address: String,
    keypair_path: PathBuf,
    connected_at: String,
}

impl Session {
    fn load() -> Option<Self> {
        if Path::new(SESSION_FILE).exists() {
            let data = fs::read_to_string(SESSION_FILE).ok()?;
            serde_json::from_str(&data).ok()
        } else {
            None
        }
    }

    fn save(&self) -> anyhow::Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        fs::write(SESSION_FILE, data)?;
        Ok(())
    }

    fn clear() {
        let _ = fs::remove_file(SESSION_FILE);
    }
}

fn open_dashboard<L: Ledger + 'static>(
    ledger: &Arc<L>,
    config: &Config,
    pending: &PendingOps,
    wallet: Wallet,
) -> Dashboard<L> {
    let mut directory = AccessDirectory::new(Arc::clone(ledger), config.program_id, config.client_settings())
        .with_pending(pending.clone());
    directory.connect(wallet);
    Dashboard::new(Arc::new(directory))
}

fn connected<L: Ledger + 'static>(dashboard: &Option<Dashboard<L>>) -> Result<&Dashboard<L>, Notification> {
    dashboard.as_ref().ok_or_else(|| notify_error("command", &DirectoryError::NotConnected))
}

fn flag_value<'a>(args: &[&'a str], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|&a| a == flag)
        .and_then(|i| args.get(i + 1).copied())
}

fn print_files(files: &[FileEntry]) {
    if files.is_empty() {
        println!("No files.");
        return;
    }
    for entry in files {
        let r = &entry.record;
        println!(
            "  {:<32} {:>10} bytes  {:<10} {:<7} {}",
            r.file_name,
            r.file_size,
            r.status,
            if r.is_public { "public" } else { "private" },
            r.primary_cid.as_deref().unwrap_or("-"),
        );
    }
}

fn print_shared(entries: &[SharedEntry], show_grantee: bool) {
    if entries.is_empty() {
        println!("Nothing shared.");
        return;
    }
    for entry in entries {
        let g = &entry.grant;
        let name = entry
            .file
            .as_ref()
            .map(|f| f.record.file_name.clone())
            .unwrap_or_else(|| format!("<unavailable {}>", g.file));
        let who = if show_grantee { g.grantee } else { g.grantor };
        let expires = g
            .expires_at
            .and_then(|t| DateTime::<Utc>::from_timestamp(t, 0))
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        println!("  {:<32} {:<6} {}  expires: {}", name, g.access_level, who, expires);
    }
}

async fn run<L: Ledger + 'static>(ledger: Arc<L>, config: Config) -> Result<(), Box<dyn Error>> {
    let pending = PendingOps::new();
    let gateway = GatewayClient::new(config.gateway_host.clone());
    let mut dashboard: Option<Dashboard<L>> = None;

    if let Some(session) = Session::load() {
        match Wallet::load(&session.keypair_path) {
            Ok(wallet) => {
                info!("restored session for {}", session.address);
                dashboard = Some(open_dashboard(&ledger, &config, &pending, wallet));
            }
            Err(e) => {
                warn!("could not restore session: {:#}", e);
                Session::clear();
            }
        }
    }

    let mut rl = DefaultEditor::new()?;
    println!("Welcome to the soldrive interactive CLI!");
    println!("Type 'help' for available commands, 'exit' to quit.");

    loop {
        let line = rl.readline("soldrive> ");
        match line {
            Ok(cmdline) => {
                let _ = rl.add_history_entry(cmdline.as_str());
                let args: Vec<_> = cmdline.split_whitespace().collect();
                if args.is_empty() {
                    continue;
                }

                match args[0] {
                    "exit" => break,
                    "help" => {
                        println!("Commands:");
                        println!("  keygen [keypair_path] [--force]");
                        println!("  connect [keypair_path]");
                        println!("  whoami");
                        println!("  disconnect");
                        println!("  upload <file_path> --cid <cid> [--name <name>]");
                        println!("  list-files");
                        println!("  shared-with-me");
                        println!("  shared-by-me");
                        println!("  refresh");
                        println!("  make-public <file_name>");
                        println!("  make-private <file_name>");
                        println!("  grant <file_name> <grantee> [--read|--write|--admin] [--expires <rfc3339>]");
                        println!("  revoke <file_name> <grantee>");
                        println!("  download <file_name> [--owner <address>] [--output <path>]");
                        println!("  link <file_name>");
                        println!("  exit");
                    }
                    "keygen" => {
                        let path = args
                            .get(1)
                            .filter(|a| !a.starts_with("--"))
                            .map(PathBuf::from)
                            .unwrap_or_else(|| config.keypair_path.clone());
                        if path.exists() && !args.contains(&"--force") {
                            println!("'{}' exists. Use --force to overwrite.", path.display());
                            continue;
                        }
                        let wallet = Wallet::generate();
                        match wallet.save(&path) {
                            Ok(()) => println!("New wallet {} written to {}", wallet.address(), path.display()),
                            Err(e) => println!("Error: {:#}", e),
                        }
                    }
                    "connect" => {
                        let path = args.get(1).map(PathBuf::from).unwrap_or_else(|| config.keypair_path.clone());
                        let wallet = match Wallet::load(&path) {
                            Ok(w) => w,
                            Err(e) => { println!("Error: {:#}", e); continue; }
                        };
                        let address = wallet.address();
                        let session = Session {
                            address: address.to_string(),
                            keypair_path: path,
                            connected_at: Utc::now().to_rfc3339(),
                        };
                        if let Err(e) = session.save() {
                            warn!("session not saved: {:#}", e);
                        }
                        let dash = open_dashboard(&ledger, &config, &pending, wallet);
                        let _ = dash.spawn_refresh();
                        dashboard = Some(dash);
                        println!("Connected as {}", address);
                    }
                    "whoami" => {
                        match Session::load() {
                            Some(s) => {
                                println!("Wallet: {}", s.address);
                                println!("Keypair: {}", s.keypair_path.display());
                                println!("Connected At: {}", s.connected_at);
                            }
                            None => println!("Not connected."),
                        }
                    }
                    "disconnect" => {
                        if dashboard.take().is_some() {
                            Session::clear();
                            println!("Disconnected.");
                        } else {
                            println!("Not connected.");
                        }
                    }
                    "upload" => {
                        let dash = match connected(&dashboard) {
                            Ok(d) => d,
                            Err(n) => { println!("{}", n); continue; }
                        };
                        let (file_path, cid) = match (args.get(1), flag_value(&args, "--cid")) {
                            (Some(p), Some(c)) => (Path::new(*p), c),
                            _ => { println!("Usage: upload <file_path> --cid <cid> [--name <name>]"); continue; }
                        };
                        let file_name = match flag_value(&args, "--name") {
                            Some(n) => n.to_string(),
                            None => match file_path.file_name() {
                                Some(n) => n.to_string_lossy().into_owned(),
                                None => { println!("Cannot derive a file name from '{}'", file_path.display()); continue; }
                            },
                        };
                        let result =
                            handlers::handle_upload(dash.directory(), file_path, &file_name, cid, config.chunk_size)
                                .await;
                        println!("{}", dash.after_mutation("upload", &result).await);
                    }
                    "list-files" | "shared-with-me" | "shared-by-me" => {
                        let dash = match connected(&dashboard) {
                            Ok(d) => d,
                            Err(n) => { println!("{}", n); continue; }
                        };
                        if !dash.refresh().await {
                            if let Some(n) = dash.views().last_notification {
                                println!("{}", n);
                            }
                            continue;
                        }
                        let views = dash.views();
                        match args[0] {
                            "list-files" => print_files(&views.owned),
                            "shared-with-me" => print_shared(&views.shared_with_me, false),
                            _ => print_shared(&views.shared_by_me, true),
                        }
                    }
                    "refresh" => {
                        let dash = match connected(&dashboard) {
                            Ok(d) => d,
                            Err(n) => { println!("{}", n); continue; }
                        };
                        match dash.spawn_refresh().await {
                            Ok(true) => {
                                let views = dash.views();
                                println!(
                                    "{} owned, {} shared with me, {} shared by me",
                                    views.owned.len(),
                                    views.shared_with_me.len(),
                                    views.shared_by_me.len()
                                );
                            }
                            Ok(false) => {
                                if let Some(n) = dash.views().last_notification {
                                    println!("{}", n);
                                }
                            }
                            Err(e) => println!("Refresh task failed: {}", e),
                        }
                    }
                    "make-public" | "make-private" => {
                        let dash = match connected(&dashboard) {
                            Ok(d) => d,
                            Err(n) => { println!("{}", n); continue; }
                        };
                        if args.len() < 2 {
                            println!("Usage: {} <file_name>", args[0]);
                            continue;
                        }
                        let result = if args[0] == "make-public" {
                            dash.directory().make_public(args[1]).await
                        } else {
                            dash.directory().make_private(args[1]).await
                        };
                        println!("{}", dash.after_mutation(args[0], &result).await);
                    }
                    "grant" => {
                        let dash = match connected(&dashboard) {
                            Ok(d) => d,
                            Err(n) => { println!("{}", n); continue; }
                        };
                        if args.len() < 3 {
                            println!("Usage: grant <file_name> <grantee> [--read|--write|--admin] [--expires <rfc3339>]");
                            continue;
                        }
                        let level = if args.contains(&"--admin") {
                            AccessLevel::Admin
                        } else if args.contains(&"--write") {
                            AccessLevel::Write
                        } else {
                            AccessLevel::Read
                        };
                        let expires_at = match flag_value(&args, "--expires") {
                            Some(raw) => match DateTime::parse_from_rfc3339(raw) {
                                Ok(t) => Some(t.timestamp()),
                                Err(e) => { println!("Invalid expiry '{}': {}", raw, e); continue; }
                            },
                            None => None,
                        };
                        let result = dash.directory().grant_access(args[1], args[2], level, expires_at).await;
                        println!("{}", dash.after_mutation("grant", &result).await);
                    }
                    "revoke" => {
                        let dash = match connected(&dashboard) {
                            Ok(d) => d,
                            Err(n) => { println!("{}", n); continue; }
                        };
                        if args.len() < 3 {
                            println!("Usage: revoke <file_name> <grantee>");
                            continue;
                        }
                        let result = dash.directory().revoke_access(args[1], args[2]).await;
                        println!("{}", dash.after_mutation("revoke", &result).await);
                    }
                    "download" => {
                        let dash = match connected(&dashboard) {
                            Ok(d) => d,
                            Err(n) => { println!("{}", n); continue; }
                        };
                        if args.len() < 2 {
                            println!("Usage: download <file_name> [--owner <address>] [--output <path>]");
                            continue;
                        }
                        let owner = match flag_value(&args, "--owner").map(str::parse::<Address>) {
                            Some(Ok(a)) => Some(a),
                            Some(Err(e)) => { println!("Invalid owner address: {}", e); continue; }
                            None => None,
                        };
                        let output = PathBuf::from(flag_value(&args, "--output").unwrap_or(args[1]));
                        match handlers::handle_download(dash.directory(), &gateway, owner, args[1], &output).await {
                            Ok(n) => println!("Wrote {} bytes to {}", n, output.display()),
                            Err(e) => println!("Error: {:#}", e),
                        }
                    }
                    "link" => {
                        let dash = match connected(&dashboard) {
                            Ok(d) => d,
                            Err(n) => { println!("{}", n); continue; }
                        };
                        if args.len() < 2 {
                            println!("Usage: link <file_name>");
                            continue;
                        }
                        match handlers::handle_share_link(dash.directory(), &gateway, args[1]).await {
                            Ok(link) => println!("{}", link),
                            Err(e) => println!("Error: {:#}", e),
                        }
                    }
                    other => {
                        println!("Unknown command '{}'. Type 'help' for commands.", other);
                    }
                }
            }
            Err(e) => {
                println!("Error reading line: {:?}", e);
                break;
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let config = cli::Cli::parse().apply(Config::from_env()?)?;
    info!("program id: {}", config.program_id);

    match config.rpc_url.clone() {
        Some(url) => {
            info!("Using ledger node at {}", url);
            run(Arc::new(JsonRpcLedger::new(url)), config).await
        }
        None => {
            info!("No SOLDRIVE_RPC_URL set, using in-memory ledger");
            run(Arc::new(MemoryLedger::new(config.program_id)), config).await
        }
    }
}
