use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use dialoguer::Confirm;
use std::fs;
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::OffsetDateTime;

use age_sops_core::config::{Config, KeyEntry, DEFAULT_SCOPE};
use age_sops_core::error::Error as CoreError;
use age_sops_core::{keydir, scopes};
use age_sops_tools as tools;
use age_sops_tools::{Direction, SystemRunner};

#[derive(Parser)]
#[command(name = "age-sops", version, about = "Age + SOPS secret management")]
struct Cli {
    /// Path to the sops config document
    #[arg(long, default_value = ".sops.yaml")]
    config: String,
    /// Directory holding age identity files
    #[arg(long, default_value = ".age-keys")]
    key_dir: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize the key directory and config document
    Init,
    /// Key management
    Key {
        #[command(subcommand)]
        action: KeyCommand,
    },
    /// Scope management
    Scope {
        #[command(subcommand)]
        action: ScopeCommand,
    },
    /// Encrypt a file for the configured recipients
    Encrypt(TransformArgs),
    /// Decrypt a file
    Decrypt(TransformArgs),
}

#[derive(Subcommand)]
enum KeyCommand {
    /// Generate a key pair, register it, and grant it scopes
    Generate {
        /// Owner name, defaulting to git user.name
        #[arg(short, long)]
        name: Option<String>,
        /// Owner email, defaulting to git user.email
        #[arg(short, long)]
        email: Option<String>,
        /// Comma-separated scope ids to grant access to
        #[arg(short, long, default_value = DEFAULT_SCOPE)]
        scopes: String,
        /// Free-text note stored with the registry entry
        #[arg(long)]
        purpose: Option<String>,
    },
    /// Set a user's scopes to exactly the given set
    Update {
        #[arg(long)]
        user: String,
        /// Comma-separated scope ids the user should end up with
        #[arg(short, long)]
        scopes: String,
    },
    /// List registered keys and the scopes they belong to
    List,
    /// Remove a key from the registry and every scope
    Remove {
        /// Owner name, defaulting to git user.name
        #[arg(short, long)]
        name: Option<String>,
        /// Also delete the private key file
        #[arg(long)]
        remove_private_key: bool,
    },
}

#[derive(Subcommand)]
enum ScopeCommand {
    /// Create a new scope
    Create {
        #[arg(long)]
        id: String,
        /// Path regex the scope applies to
        #[arg(long)]
        path: Option<String>,
    },
    /// List scope ids and path patterns
    List,
}

#[derive(Args)]
struct TransformArgs {
    /// File to transform
    #[arg(short, long)]
    file: String,
    /// Age identity file (defaults to the first key in the key directory)
    #[arg(short = 'k', long)]
    key_file: Option<String>,
    /// Output path
    #[arg(short, long)]
    output: Option<String>,
}

/// Where this invocation reads and writes repository state.
struct RepoPaths {
    config: PathBuf,
    key_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let paths = RepoPaths {
        config: PathBuf::from(&cli.config),
        key_dir: PathBuf::from(&cli.key_dir),
    };
    match cli.command {
        Command::Init => init(&paths),
        Command::Key { action } => key(&paths, action).await,
        Command::Scope { action } => scope(&paths, action),
        Command::Encrypt(args) => transform(&paths, Direction::Encrypt, &args),
        Command::Decrypt(args) => transform(&paths, Direction::Decrypt, &args),
    }
}

fn init(paths: &RepoPaths) -> Result<()> {
    if paths.config.exists() {
        return Err(anyhow!(
            "configuration file {} already exists",
            paths.config.display()
        ));
    }
    keydir::ensure_dir(&paths.key_dir)?;
    Config::default().save(&paths.config)?;
    println!("Initialized age + sops repository");
    println!("1. Generate your key: age-sops key generate");
    println!("2. Create additional scopes as needed: age-sops scope create");
    Ok(())
}

async fn key(paths: &RepoPaths, action: KeyCommand) -> Result<()> {
    match action {
        KeyCommand::Generate {
            name,
            email,
            scopes,
            purpose,
        } => generate_key(paths, name, email, &scopes, purpose).await,
        KeyCommand::Update { user, scopes } => update_key(paths, &user, &scopes),
        KeyCommand::List => list_keys(paths),
        KeyCommand::Remove {
            name,
            remove_private_key,
        } => remove_key(paths, name, remove_private_key).await,
    }
}

async fn generate_key(
    paths: &RepoPaths,
    name: Option<String>,
    email: Option<String>,
    scopes_arg: &str,
    purpose: Option<String>,
) -> Result<()> {
    let ambient = if name.is_none() || email.is_none() {
        git_identity().await
    } else {
        GitIdentity::default()
    };
    let name = resolve_arg(name, ambient.name, "--name or git config user.name")?;
    let email = resolve_arg(email, ambient.email, "--email or git config user.email")?;

    keydir::ensure_dir(&paths.key_dir)?;
    let key_path = keydir::key_file_path(&paths.key_dir, &name);
    let public_key = tools::generate_key_pair(&SystemRunner, &key_path.to_string_lossy())?;

    let mut config = Config::load(&paths.config)?;
    config.key_registry.insert(
        public_key.clone(),
        KeyEntry {
            owner: name.clone(),
            email: email.clone(),
            added_at: today()?,
            purpose,
        },
    );

    let scope_ids = parse_scope_list(scopes_arg);
    let unknown = scopes::add_key_to_scopes(&mut config, &public_key, &scope_ids);
    for id in &unknown {
        eprintln!("warning: scope '{id}' does not exist, key not added to it");
    }
    config.save(&paths.config)?;

    println!(
        "Key generated for {name} <{email}> in scopes {}",
        scope_ids.join(", ")
    );
    println!("Public key: {public_key}");
    Ok(())
}

fn update_key(paths: &RepoPaths, user: &str, scopes_arg: &str) -> Result<()> {
    let mut config = Config::load(&paths.config)?;
    let public_key = scopes::find_key_by_owner(&config, user)
        .map(|(key, _)| key.to_string())
        .ok_or_else(|| CoreError::UserNotFound(user.to_string()))?;

    let desired = parse_scope_list(scopes_arg);
    let diff = scopes::set_scopes_for_key(&mut config, &public_key, &desired);

    println!("Updating access for user \"{user}\".");
    if !diff.added.is_empty() {
        println!("Scopes being added: {}", diff.added.join(", "));
    }
    if !diff.removed.is_empty() {
        println!("Scopes being removed: {}", diff.removed.join(", "));
    }
    if diff.is_empty() {
        println!("No changes to scopes.");
        return Ok(());
    }

    let confirmed = Confirm::new()
        .with_prompt("Are you sure you want to update access?")
        .default(false)
        .interact()?;
    if !confirmed {
        return Err(anyhow!("aborted"));
    }

    config.save(&paths.config)?;
    println!(
        "Updated access for {user}. Now has access to: {}",
        desired.join(", ")
    );
    Ok(())
}

fn list_keys(paths: &RepoPaths) -> Result<()> {
    let config = Config::load(&paths.config)?;
    println!("User keys:");
    println!("=================");
    for (public_key, entry) in &config.key_registry {
        let scope_ids = scopes::scopes_for_key(&config, public_key);
        println!(
            "User {} <{}> has access to scopes: ({})",
            entry.owner,
            entry.email,
            scope_ids.join(", ")
        );
    }
    Ok(())
}

async fn remove_key(paths: &RepoPaths, name: Option<String>, remove_private_key: bool) -> Result<()> {
    let ambient = if name.is_none() {
        git_identity().await
    } else {
        GitIdentity::default()
    };
    let name = resolve_arg(name, ambient.name, "--name or git config user.name")?;

    let mut config = Config::load(&paths.config)?;
    let public_key = scopes::find_key_by_owner(&config, &name)
        .map(|(key, _)| key.to_string())
        .ok_or_else(|| CoreError::UserNotFound(name.clone()))?;

    scopes::remove_key_everywhere(&mut config, &public_key);
    config.save(&paths.config)?;
    println!("Removed key for '{name}'");

    if remove_private_key {
        let key_path = keydir::key_file_path(&paths.key_dir, &name);
        fs::remove_file(&key_path)
            .with_context(|| format!("failed to remove private key file {}", key_path.display()))?;
        println!("Removed private key file for '{name}'");
    }
    Ok(())
}

fn scope(paths: &RepoPaths, action: ScopeCommand) -> Result<()> {
    match action {
        ScopeCommand::Create { id, path } => {
            let mut config = Config::load(&paths.config)?;
            scopes::create_scope(&mut config, &id, path.clone())?;
            config.save(&paths.config)?;
            match path {
                Some(path) => println!("Created new scope '{id}' with path '{path}'"),
                None => println!("Created new scope '{id}'"),
            }
            Ok(())
        }
        ScopeCommand::List => {
            let config = Config::load(&paths.config)?;
            println!("List of scopes:");
            for rule in &config.creation_rules {
                match &rule.path_regex {
                    Some(path) => println!("  - \"{}\" (path: {path})", rule.id),
                    None => println!("  - \"{}\"", rule.id),
                }
            }
            Ok(())
        }
    }
}

fn transform(paths: &RepoPaths, direction: Direction, args: &TransformArgs) -> Result<()> {
    if !Path::new(&args.file).is_file() {
        return Err(anyhow!("file not found: {}", args.file));
    }

    let explicit = args.key_file.as_deref().map(Path::new);
    let identity = keydir::resolve_identity_file(explicit, &paths.key_dir)?;
    if explicit.is_none() {
        println!("Using default key: {}", identity.display());
    }

    let content = tools::sops_transform(
        &SystemRunner,
        direction,
        &args.file,
        &paths.config.to_string_lossy(),
        &identity.to_string_lossy(),
    )?;

    let output_path = match (&args.output, direction) {
        (Some(path), _) => path.clone(),
        (None, Direction::Encrypt) => format!("{}.enc", args.file),
        (None, Direction::Decrypt) => args
            .file
            .strip_suffix(".enc")
            .unwrap_or(&args.file)
            .to_string(),
    };
    fs::write(&output_path, content).with_context(|| format!("failed to write {output_path}"))?;

    match direction {
        Direction::Encrypt => println!("Encrypted {} to {}", args.file, output_path),
        Direction::Decrypt => println!("Decrypted {} to {}", args.file, output_path),
    }
    Ok(())
}

/// Ambient defaults pulled from local git configuration; empty strings
/// when git or the setting is unavailable.
#[derive(Debug, Default, Clone)]
struct GitIdentity {
    name: String,
    email: String,
}

async fn git_identity() -> GitIdentity {
    // the two probes are independent and read-only, so run them together
    let (name, email) = tokio::join!(
        git_config_value("user.name"),
        git_config_value("user.email")
    );
    GitIdentity { name, email }
}

async fn git_config_value(key: &str) -> String {
    let output = tokio::process::Command::new("git")
        .args(["config", "--get", key])
        .output()
        .await;
    match output {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout).trim().to_string(),
        _ => String::new(),
    }
}

fn resolve_arg(value: Option<String>, ambient: String, hint: &str) -> Result<String> {
    let resolved = value.unwrap_or(ambient);
    if resolved.is_empty() {
        return Err(anyhow!("missing value: set {hint}"));
    }
    Ok(resolved)
}

fn parse_scope_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

fn today() -> Result<String> {
    let format = format_description!("[year]-[month]-[day]");
    Ok(OffsetDateTime::now_utc().format(&format)?)
}
