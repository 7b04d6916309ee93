//! CloudBeats Backup Generator CLI
//!
//! Builds a CloudBeats `.cbbackup` file from a local Dropbox-synced music
//! folder so the app can import the library without re-reading tags online.

use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use log::{error, info, warn};
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use cloudbeats_backup::config::DEFAULT_OUTPUT;
use cloudbeats_backup::credentials::{resolve_token, Credentials};
use cloudbeats_backup::pipeline::{self, RunSummary};
use cloudbeats_backup::remote::{compute_remote_path, detect_root_path};
use cloudbeats_backup::{
    ApiError, CancellationToken, ClientConfig, DropboxClient, Error, OAuthClient, ProgressMode,
    RunConfig,
};

const ABOUT: &str = r#"
CloudBeats Backup Generator - build a .cbbackup file from a local Dropbox folder

Examples:
  cloudbeats_backup --local ~/Dropbox/Music                 Generate cloudbeats.cbbackup
  cloudbeats_backup --local ~/Dropbox/Music --dry-run       Show the Dropbox mapping only
  cloudbeats_backup --local ~/Dropbox/Music --no-cache      Re-read every tag
  cloudbeats_backup auth --app-key KEY --app-secret SECRET  One-time credential setup
"#;

#[derive(Parser)]
#[command(name = "cloudbeats_backup")]
#[command(author, version, about = ABOUT, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run: RunArgs,

    #[command(flatten)]
    auth: AuthArgs,

    /// Log level: trace, debug, info, warn, error
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Authorize the app once and store a refresh token
    Auth,
}

#[derive(Args)]
struct RunArgs {
    /// Local folder to scan (must be inside the Dropbox folder)
    #[arg(long)]
    local: Option<PathBuf>,

    /// Output .cbbackup file
    #[arg(long, default_value = DEFAULT_OUTPUT)]
    output: PathBuf,

    /// Parallel workers for reading tags (0 = auto: 2x CPU cores)
    #[arg(long, default_value = "0")]
    workers: usize,

    /// Show the Dropbox mapping without reading tags or writing a file
    #[arg(long)]
    dry_run: bool,

    /// Disable the tag cache (re-parse all files)
    #[arg(long)]
    no_cache: bool,

    /// Tag cache file
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Progress output on stderr
    #[arg(long, value_enum, default_value = "text")]
    progress: ProgressMode,
}

#[derive(Args)]
struct AuthArgs {
    /// Dropbox access token (short-lived)
    #[arg(long, env = "DROPBOX_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    /// Dropbox app key for refresh-token auth
    #[arg(long, env = "DROPBOX_APP_KEY", global = true)]
    app_key: Option<String>,

    /// Dropbox app secret for refresh-token auth
    #[arg(long, env = "DROPBOX_APP_SECRET", hide_env_values = true, global = true)]
    app_secret: Option<String>,

    /// Dropbox refresh token for automatic token renewal
    #[arg(long, env = "DROPBOX_REFRESH_TOKEN", hide_env_values = true, global = true)]
    refresh_token: Option<String>,
}

impl AuthArgs {
    fn explicit_credentials(&self) -> Credentials {
        Credentials::new(
            self.app_key.clone().unwrap_or_default(),
            self.app_secret.clone().unwrap_or_default(),
            self.refresh_token.clone().unwrap_or_default(),
        )
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::from_env(Env::default().default_filter_or(cli.log_level.as_str())).init();

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!();
        warn!("Interrupt received, finishing in-flight work...");
        handler_token.cancel();
    }) {
        warn!("Could not install interrupt handler: {}", e);
    }

    let result = match &cli.command {
        Some(Commands::Auth) => run_auth_command(&cli.auth),
        None => run_backup(&cli, &cancel),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(Error::Cancelled | Error::Api(ApiError::Cancelled)) => {
            error!("Interrupted; no backup file was written");
            ExitCode::from(130)
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_backup(cli: &Cli, cancel: &CancellationToken) -> Result<(), Error> {
    let local = cli
        .run
        .local
        .clone()
        .ok_or_else(|| Error::Config("--local is required".to_string()))?;
    let local = std::path::absolute(&local)
        .map_err(|e| Error::io(format!("resolving local path {}", local.display()), e))?;

    let client_config = ClientConfig::default();
    let token = obtain_token(&cli.auth, &client_config)?;

    let root = detect_root_path()?;
    info!("Dropbox root: {}", root.display());
    let remote_path = compute_remote_path(&local, &root)?;
    info!("Remote path: {:?}", remote_path);

    let mut builder = RunConfig::builder()
        .local_dir(&local)
        .output(&cli.run.output)
        .workers(cli.run.workers)
        .use_cache(!cli.run.no_cache)
        .dry_run(cli.run.dry_run)
        .progress(cli.run.progress);
    if let Some(cache) = &cli.run.cache {
        builder = builder.cache_path(cache);
    }
    let config = builder.build();
    info!(
        "Workers: {}",
        if config.workers == 0 {
            format!("auto ({})", config.effective_workers())
        } else {
            config.workers.to_string()
        }
    );

    let client = DropboxClient::new(token, client_config, cancel.clone())?;
    let summary = pipeline::run(&config, &client, &remote_path, cancel)?;
    print_summary(&summary, config.dry_run);
    Ok(())
}

/// Resolve a bearer token, falling back to interactive setup on a terminal
fn obtain_token(args: &AuthArgs, config: &ClientConfig) -> Result<String, Error> {
    let oauth = OAuthClient::new(config)?;
    let stored = Credentials::load().unwrap_or_else(|e| {
        warn!("Failed to load stored credentials: {}", e);
        None
    });

    let explicit = args.explicit_credentials();
    match resolve_token(&oauth, &explicit, stored.as_ref(), args.token.as_deref()) {
        Ok(token) => Ok(token),
        Err(Error::Config(_)) if io::stdin().is_terminal() => {
            warn!("No Dropbox credentials found, starting interactive setup");
            let creds = interactive_setup(&oauth, args)?;
            resolve_token(&oauth, &Credentials::default(), Some(&creds), None)
        }
        Err(e) => Err(e),
    }
}

fn run_auth_command(args: &AuthArgs) -> Result<(), Error> {
    let oauth = OAuthClient::new(&ClientConfig::default())?;
    interactive_setup(&oauth, args)?;
    Ok(())
}

/// Authorization-code flow: print the URL, read the code, store credentials
fn interactive_setup(oauth: &OAuthClient, args: &AuthArgs) -> Result<Credentials, Error> {
    let app_key = match args.app_key.clone().filter(|k| !k.is_empty()) {
        Some(key) => key,
        None => prompt("Dropbox app key")?,
    };
    let app_secret = match args.app_secret.clone().filter(|s| !s.is_empty()) {
        Some(secret) => secret,
        None => prompt("Dropbox app secret")?,
    };
    if app_key.is_empty() || app_secret.is_empty() {
        return Err(Error::Config(
            "an app key and app secret are required for setup".to_string(),
        ));
    }

    let url = oauth.authorization_url(&app_key);
    eprintln!("Open this URL in your browser and allow access:\n\n  {}\n", url);
    open_browser(&url);

    let code = prompt("Paste the authorization code here")?;
    if code.is_empty() {
        return Err(Error::Config("authorization code cannot be empty".to_string()));
    }

    info!("Exchanging authorization code");
    let tokens = oauth.exchange_authorization_code(&app_key, &app_secret, &code)?;
    let creds = Credentials::new(app_key, app_secret, tokens.refresh_token);
    let path = creds.save()?;
    eprintln!(
        "Credentials saved to {}. You can now run without any auth flags.",
        path.display()
    );
    Ok(creds)
}

fn prompt(label: &str) -> Result<String, Error> {
    eprint!("{}: ", label);
    io::stderr().flush().ok();
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| Error::io("reading from stdin", e))?;
    Ok(line.trim().to_string())
}

fn open_browser(url: &str) {
    let opener = if cfg!(target_os = "macos") {
        "open"
    } else if cfg!(target_os = "linux") {
        "xdg-open"
    } else {
        return;
    };
    if let Err(e) = std::process::Command::new(opener).arg(url).spawn() {
        log::debug!("Could not launch {}: {}", opener, e);
    }
}

fn print_summary(summary: &RunSummary, dry_run: bool) {
    if dry_run {
        println!("--- Dry Run Summary ---");
    } else {
        println!("Backup completed:");
    }
    println!("  Remote path:       {:?}", summary.remote_path);
    println!("  Local files:       {}", summary.local_files);
    println!("  Dropbox files:     {}", summary.remote_files);
    println!("  Matched:           {}", summary.matched);
    println!("  Unmatched local:   {}", summary.unmatched_local);
    println!("  Unmatched Dropbox: {}", summary.unmatched_remote);
    if dry_run {
        return;
    }
    println!("  Cache hits:        {}", summary.cache_hits);
    println!("  Parsed:            {}", summary.parsed);
    println!("  Failures:          {}", summary.failures);
    if let Some(output) = &summary.output {
        println!("  Output:            {}", output.display());
    }
}
