//! PolyCloud CLI - Command line interface for cloud storage accounts.
//!
//! This tool lists, uploads, downloads and deletes folders and files on
//! AWS S3, Azure Blob Storage and Google Cloud Storage through one set of
//! commands.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use polycloud_common::Platform;
use polycloud_storage::{AccountConfig, CloudFolder, Storage, StorageAccount};

#[derive(Parser)]
#[command(name = "polycloud")]
#[command(about = "PolyCloud - One interface to AWS, Azure and GCP storage")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Platform of the account: AWS, Azure or GCP.
    #[arg(short, long, global = true, env = "POLYCLOUD_PLATFORM")]
    platform: Option<Platform>,

    /// Connection string of the account, e.g. "accountName=..;AccountKey=..".
    #[arg(short, long, global = true, env = "POLYCLOUD_CONNECTION", hide_env_values = true)]
    connection: Option<String>,

    /// Name of a saved account to use instead of --platform/--connection.
    #[arg(short, long, global = true)]
    account: Option<String>,

    /// Accounts file (default: <config dir>/polycloud/accounts.json).
    #[arg(long, global = true)]
    accounts: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List folders (buckets/containers).
    Folders,

    /// List files in a folder.
    Files {
        /// Folder name.
        folder: String,
    },

    /// Upload a local file into a folder.
    Upload {
        /// Folder name.
        folder: String,

        /// Local file; stored under its file name.
        file: PathBuf,
    },

    /// Download a file.
    Download {
        /// Folder name.
        folder: String,

        /// File name in the folder.
        file: String,

        /// Output path; the file is written next to it under its own name.
        output: PathBuf,
    },

    /// Create a folder.
    Mkdir {
        /// Folder name.
        folder: String,
    },

    /// Delete a folder and every file in it.
    Rmdir {
        /// Folder name.
        folder: String,
    },

    /// Delete a file.
    Rm {
        /// Folder name.
        folder: String,

        /// File name in the folder.
        file: String,
    },

    /// Print the account's connection string.
    Connection,

    /// List saved accounts.
    Accounts,

    /// Save the current account under a name.
    Save {
        /// Account name.
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match &cli.command {
        Commands::Folders => cmd_folders(&cli).await,

        Commands::Files { folder } => cmd_files(&cli, folder).await,

        Commands::Upload { folder, file } => cmd_upload(&cli, folder, file).await,

        Commands::Download {
            folder,
            file,
            output,
        } => cmd_download(&cli, folder, file, output).await,

        Commands::Mkdir { folder } => cmd_mkdir(&cli, folder).await,

        Commands::Rmdir { folder } => cmd_rmdir(&cli, folder).await,

        Commands::Rm { folder, file } => cmd_rm(&cli, folder, file).await,

        Commands::Connection => cmd_connection(&cli).await,

        Commands::Accounts => cmd_accounts(&cli).await,

        Commands::Save { name } => cmd_save(&cli, name).await,
    }
}

/// Accounts file from --accounts or the default location.
fn accounts_path(cli: &Cli) -> Result<PathBuf> {
    match &cli.accounts {
        Some(path) => Ok(path.clone()),
        None => AccountConfig::default_path().context("No configuration directory available"),
    }
}

/// Build the account selected on the command line.
async fn resolve_account(cli: &Cli) -> Result<StorageAccount> {
    if let Some(name) = &cli.account {
        let path = accounts_path(cli)?;
        let configs = AccountConfig::load_all(&path)
            .await
            .with_context(|| format!("Failed to read accounts from {}", path.display()))?;
        let config = configs
            .iter()
            .find(|c| c.name == *name)
            .with_context(|| format!("No account named '{}' in {}", name, path.display()))?;
        return StorageAccount::from_config(config).context("Invalid saved account");
    }

    let platform = cli
        .platform
        .context("Select an account with --account, or pass --platform and --connection")?;
    let connection = cli.connection.as_deref().unwrap_or_default();
    StorageAccount::from_connection(platform.label(), platform, connection)
        .context("Invalid connection string")
}

/// Open the account's storage, propagating every failure.
async fn open(account: &mut StorageAccount) -> Result<&mut Storage> {
    let name = account.name().to_string();
    let storage = account
        .storage_mut()
        .with_context(|| format!("Account {} has no platform selected", name))?;
    storage.set_handle_errors(false);

    storage
        .open()
        .await
        .with_context(|| format!("Failed to open {} storage", storage.platform_name()))?;
    Ok(storage)
}

/// List folders.
async fn cmd_folders(cli: &Cli) -> Result<()> {
    let mut account = resolve_account(cli).await?;
    open(&mut account).await?;

    account
        .load_folders()
        .await
        .context("Failed to list folders")?;

    if account.folders().is_empty() {
        println!("No folders.");
    } else {
        println!("Folders in {} ({}):", account.name(), account.platform());
        for folder in account.folders() {
            println!("  {}", folder.name());
        }
    }

    Ok(())
}

/// List files in a folder.
async fn cmd_files(cli: &Cli, folder: &str) -> Result<()> {
    let mut account = resolve_account(cli).await?;
    let storage = open(&mut account).await?;

    let mut target = CloudFolder::new(folder);
    storage
        .list_files(&mut target)
        .await
        .with_context(|| format!("Failed to list files in {}", folder))?;

    let files = target.items().unwrap_or_default();
    if files.is_empty() {
        println!("Folder is empty.");
    } else {
        println!("Files in {} {}:", folder, target.item_count_label());
        for file in files {
            let created = file
                .created()
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default();
            println!("  {} ({} bytes) {}", file.name(), file.size(), created);
        }
    }

    Ok(())
}

/// Upload a local file.
async fn cmd_upload(cli: &Cli, folder: &str, file: &Path) -> Result<()> {
    info!("Uploading {} to {}", file.display(), folder);

    let mut account = resolve_account(cli).await?;
    let storage = open(&mut account).await?;

    storage
        .upload_file_to(folder, file)
        .await
        .with_context(|| format!("Failed to upload {}", file.display()))?;

    println!("Uploaded {} to {}", file.display(), folder);

    Ok(())
}

/// Download a file.
async fn cmd_download(cli: &Cli, folder: &str, file: &str, output: &Path) -> Result<()> {
    let mut account = resolve_account(cli).await?;
    let storage = open(&mut account).await?;
    let target = storage.download_target(file, output);

    storage
        .download_file_from(folder, file, output)
        .await
        .with_context(|| format!("Failed to download {}/{}", folder, file))?;

    println!("Downloaded {}/{} to {}", folder, file, target.display());

    Ok(())
}

/// Create a folder.
async fn cmd_mkdir(cli: &Cli, folder: &str) -> Result<()> {
    let mut account = resolve_account(cli).await?;
    let storage = open(&mut account).await?;

    storage
        .new_folder(folder)
        .await
        .with_context(|| format!("Failed to create folder {}", folder))?;

    println!("Folder created: {}", folder);

    Ok(())
}

/// Delete a folder and its contents.
async fn cmd_rmdir(cli: &Cli, folder: &str) -> Result<()> {
    info!("Deleting folder {} and its contents", folder);

    let mut account = resolve_account(cli).await?;
    let storage = open(&mut account).await?;

    storage
        .delete_folder(folder)
        .await
        .with_context(|| format!("Failed to delete folder {}", folder))?;

    println!("Folder deleted: {}", folder);

    Ok(())
}

/// Delete a file.
async fn cmd_rm(cli: &Cli, folder: &str, file: &str) -> Result<()> {
    let mut account = resolve_account(cli).await?;
    let storage = open(&mut account).await?;

    storage
        .delete_file(folder, file)
        .await
        .with_context(|| format!("Failed to delete {}/{}", folder, file))?;

    println!("File deleted: {}/{}", folder, file);

    Ok(())
}

/// Print the connection string.
async fn cmd_connection(cli: &Cli) -> Result<()> {
    let account = resolve_account(cli).await?;

    match account.connection() {
        Some(connection) => println!("{}", connection),
        None => println!("Account {} has no platform selected.", account.name()),
    }

    Ok(())
}

/// List saved accounts.
async fn cmd_accounts(cli: &Cli) -> Result<()> {
    let path = accounts_path(cli)?;
    let configs = AccountConfig::load_all(&path)
        .await
        .with_context(|| format!("Failed to read accounts from {}", path.display()))?;

    if configs.is_empty() {
        println!("No saved accounts in {}.", path.display());
    } else {
        println!("Saved accounts ({}):", path.display());
        for config in configs {
            let last_used = config
                .timestamp
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            println!("  {} [{}] {}", config.name, config.platform, last_used);
        }
    }

    Ok(())
}

/// Save the current account.
async fn cmd_save(cli: &Cli, name: &str) -> Result<()> {
    let mut account = resolve_account(cli).await?;
    account.set_name(name);
    account.touch();

    let path = accounts_path(cli)?;
    let mut configs = AccountConfig::load_all(&path)
        .await
        .with_context(|| format!("Failed to read accounts from {}", path.display()))?;

    let config = account.to_config();
    match configs.iter_mut().find(|c| c.name == config.name) {
        Some(existing) => *existing = config,
        None => configs.push(config),
    }

    AccountConfig::save_all(&path, &configs)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("Account {} saved to {}", name, path.display());

    Ok(())
}
