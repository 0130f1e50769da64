use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use lockbox_core::config::default_config_path;
use lockbox_core::envelope::{CardPayload, LoginPayload, NotePayload};
use lockbox_core::{ClientConfig, Payload, Vault};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Lockbox - an end-to-end encrypted, multi-device secrets vault
#[derive(Parser)]
#[command(name = "lockbox")]
#[command(about = "End-to-end encrypted secrets vault", long_about = None)]
struct Cli {
    /// Client configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server URL override
    #[arg(long, env = "LOCKBOX_SERVER")]
    server: Option<String>,

    /// Account name
    #[arg(short, long, env = "LOCKBOX_USER")]
    user: String,

    /// Master password (prompted if not given)
    #[arg(long, env = "LOCKBOX_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account on the server
    Register,

    /// Add a login
    AddLogin {
        #[arg(long)]
        title: String,
        #[arg(long)]
        login: String,
        /// Secret to store (prompted if not given)
        #[arg(long)]
        secret: Option<String>,
        #[arg(long)]
        url: Option<String>,
    },

    /// Add a secure note
    AddNote {
        #[arg(long)]
        title: String,
        #[arg(long)]
        text: String,
    },

    /// Add a payment card
    AddCard {
        #[arg(long)]
        title: String,
        #[arg(long)]
        number: String,
        #[arg(long)]
        holder: String,
        #[arg(long)]
        expiry: String,
        #[arg(long)]
        cvv: String,
    },

    /// Encrypt and attach a file
    AddFile {
        #[arg(long)]
        title: String,
        path: PathBuf,
    },

    /// List entries
    List,

    /// Show one entry in full
    Get {
        id: Uuid,
        /// Print secrets in plain text
        #[arg(long)]
        reveal: bool,
    },

    /// Delete an entry
    Delete { id: Uuid },

    /// Synchronize with the server
    Sync,

    /// Decrypt an attached file to disk
    Download {
        id: Uuid,
        /// File or directory to write to
        #[arg(default_value = ".")]
        dest: PathBuf,
    },

    /// Forget cached credentials on this device
    Logout,

    /// Show session and sync state
    Status,
}

fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = ClientConfig::load(&path)
        .with_context(|| format!("loading {}", path.display()))?;
    if let Some(server) = &cli.server {
        config.server_url = server.clone();
    }
    Ok(config)
}

fn password(cli: &Cli) -> Result<String> {
    match &cli.password {
        Some(p) => Ok(p.clone()),
        None => Ok(rpassword::prompt_password("Master password: ")?),
    }
}

fn mask(secret: &str, reveal: bool) -> String {
    if reveal {
        secret.to_string()
    } else {
        "********".to_string()
    }
}

fn print_payload(payload: &Payload, reveal: bool) {
    match payload {
        Payload::Login(p) => {
            println!("Login:    {}", p.login);
            println!("Password: {}", mask(&p.password, reveal));
            if let Some(url) = &p.url {
                println!("URL:      {}", url);
            }
        }
        Payload::Note(p) => println!("{}", p.text),
        Payload::Card(p) => {
            println!("Number:   {}", mask(&p.number, reveal));
            println!("Holder:   {}", p.holder);
            println!("Expiry:   {}", p.expiry);
            println!("CVV:      {}", mask(&p.cvv, reveal));
        }
        Payload::BinaryFile(f) => println!("File:     {} ({} bytes)", f.file_name, f.size),
        Payload::Unknown { kind, raw } => {
            println!("Unsupported entry kind '{}' ({} bytes)", kind, raw.len())
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let mut vault = Vault::open(&config)?;
    let password = password(&cli)?;

    if !matches!(cli.command, Commands::Register) {
        let mode = vault.login(&cli.user, &password).await?;
        info!("Logged in as {} ({})", cli.user, mode);
    }

    match cli.command {
        Commands::Register => {
            vault.register(&cli.user, &password).await?;
            println!("Registered {}", cli.user);
        }
        Commands::AddLogin {
            title,
            login,
            secret,
            url,
        } => {
            let secret = match secret {
                Some(s) => s,
                None => rpassword::prompt_password("Secret to store: ")?,
            };
            let payload = Payload::Login(LoginPayload {
                login,
                password: secret,
                url,
            });
            let id = vault.add_entry(&title, BTreeMap::new(), payload)?;
            println!("{}", id);
        }
        Commands::AddNote { title, text } => {
            let id = vault.add_entry(&title, BTreeMap::new(), Payload::Note(NotePayload { text }))?;
            println!("{}", id);
        }
        Commands::AddCard {
            title,
            number,
            holder,
            expiry,
            cvv,
        } => {
            let payload = Payload::Card(CardPayload {
                number,
                holder,
                expiry,
                cvv,
            });
            let id = vault.add_entry(&title, BTreeMap::new(), payload)?;
            println!("{}", id);
        }
        Commands::AddFile { title, path } => {
            let id = vault.add_file(&title, &path)?;
            println!("{}", id);
        }
        Commands::List => {
            for entry in vault.list()? {
                let flag = if entry.pending { "*" } else { " " };
                println!("{}{}  {:<12} {}", flag, entry.id, entry.kind, entry.title);
            }
        }
        Commands::Get { id, reveal } => {
            let view = vault.get(id)?;
            println!("{} [{}] v{}", view.title, view.kind, view.version);
            for (key, value) in &view.metadata {
                println!("  {}: {}", key, value);
            }
            print_payload(&view.payload, reveal);
            if let Some(status) = view.file_status {
                println!("Upload:   {}", status);
            }
        }
        Commands::Delete { id } => {
            vault.delete(id)?;
            println!("Deleted {}", id);
        }
        Commands::Sync => {
            let report = vault.sync().await?;
            println!(
                "Pushed {} entries and {} files, received {} entries and {} files, uploaded {} files",
                report.pushed_entries,
                report.pushed_files,
                report.received_entries,
                report.received_files,
                report.uploaded_files
            );
        }
        Commands::Download { id, dest } => {
            let written = vault.download_file(id, &dest).await?;
            println!("Wrote {}", written.display());
        }
        Commands::Logout => {
            vault.logout()?;
            println!("Logged out");
        }
        Commands::Status => {
            let status = vault.status()?;
            println!("User:       {}", status.username.as_deref().unwrap_or("-"));
            println!("Mode:       {}", status.mode);
            println!("Checkpoint: {}", status.checkpoint);
            println!("Pending:    {} entries, {} files", status.pending_entries, status.pending_files);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if cli.user.trim().is_empty() {
        bail!("--user must not be empty");
    }
    run(cli).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_add_card() {
        let cli = Cli::try_parse_from([
            "lockbox", "--user", "alice", "--password", "pw1", "add-card", "--title", "visa",
            "--number", "4111", "--holder", "Alice", "--expiry", "01/29", "--cvv", "999",
        ])
        .unwrap();
        assert_eq!(cli.user, "alice");
        assert!(matches!(cli.command, Commands::AddCard { ref number, .. } if number == "4111"));
    }

    #[test]
    fn test_download_defaults_to_cwd() {
        let id = Uuid::new_v4().to_string();
        let cli = Cli::try_parse_from(["lockbox", "-u", "alice", "download", id.as_str()]).unwrap();
        match cli.command {
            Commands::Download { dest, .. } => assert_eq!(dest, PathBuf::from(".")),
            _ => panic!("expected download"),
        }
    }

    #[test]
    fn test_secrets_masked_unless_revealed() {
        assert_eq!(mask("hunter2", false), "********");
        assert_eq!(mask("hunter2", true), "hunter2");
    }
}
