use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use burnlink::{
    cipher, forget, share, ApiClient, ContentKind, Ledger, LedgerEntry, Outgoing,
    RetrievalSession, Selection,
};
use burnlink_server::store::{Clock, ContentDescriptor, SystemClock};
use clap::{ArgAction, ArgGroup, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

// ── CLI definition ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "burnlink", about = "Self-destructing, end-to-end encrypted links", version)]
struct Cli {
    /// burnlink server URL (default: http://localhost:8080 or $BURNLINK_SERVER)
    #[arg(long, env = "BURNLINK_SERVER", default_value = "http://localhost:8080")]
    server: String,

    /// Bearer token: account session for uploads, admin key for sweep ($BURNLINK_TOKEN)
    #[arg(long, env = "BURNLINK_TOKEN")]
    token: Option<String>,

    /// Base URL for generated links (default: --server)
    #[arg(long, env = "BURNLINK_LINK_BASE")]
    link_base: Option<String>,

    /// Share history file (default: shares.json in the platform data dir)
    #[arg(long, env = "BURNLINK_LEDGER")]
    ledger: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the burnlink HTTP server
    Serve {
        /// Port to listen on (default: $BURNLINK_PORT or 8080)
        #[arg(long)]
        port: Option<u16>,
        /// Host to bind (default: $BURNLINK_HOST or 0.0.0.0)
        #[arg(long)]
        host: Option<String>,
        /// Storage backend: memory or redb (default: $BURNLINK_BACKEND or memory)
        #[arg(long)]
        backend: Option<String>,
    },
    /// Encrypt a file, text or stdin and print a one-time link
    Send {
        /// File to send; reads stdin when neither PATH nor --text is given
        #[arg(name = "PATH", conflicts_with = "text")]
        path: Option<PathBuf>,
        /// Send this text instead of a file
        #[arg(long)]
        text: Option<String>,
        /// Lifetime e.g. 10m, 1h, 7d
        #[arg(long, default_value = "1h")]
        ttl: String,
        /// Destroy after the first successful view
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        view_once: bool,
        /// File name shown to the recipient
        #[arg(long)]
        name: Option<String>,
        /// MIME type hint shown to the recipient
        #[arg(long)]
        mime: Option<String>,
        /// Do not keep the link in the local share history
        #[arg(long)]
        no_history: bool,
    },
    /// Fetch and decrypt a link
    Open {
        /// Full link including the #key= fragment
        url: String,
        /// Write the payload here instead of printing it
        #[arg(long)]
        out: Option<PathBuf>,
        /// Delete the secret on the server after reading it
        #[arg(long)]
        burn: bool,
    },
    /// Delete a secret by id
    Delete { id: String },
    /// List shares sent from this machine
    List,
    /// Delete shares from the server and the local history
    #[command(group(ArgGroup::new("which").required(true).args(["id", "expired", "all"])))]
    Forget {
        /// A single share id
        id: Option<String>,
        /// Every share whose lifetime has ended
        #[arg(long)]
        expired: bool,
        /// Every share in the history
        #[arg(long)]
        all: bool,
    },
    /// Remove expired secrets now (needs the admin key as --token)
    Sweep,
    /// Create an account and print a session token
    Register {
        email: String,
        #[arg(long, env = "BURNLINK_PASSWORD")]
        password: String,
    },
    /// Log in and print a session token
    Login {
        email: String,
        #[arg(long, env = "BURNLINK_PASSWORD")]
        password: String,
    },
    /// Print a fresh random key
    Keygen,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("BURNLINK_LOG_LEVEL")
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = ApiClient::new(&cli.server).with_token(cli.token.clone());

    match cli.command {
        Commands::Serve {
            port,
            host,
            backend,
        } => cmd_serve(host, port, backend).await,

        Commands::Send {
            path,
            text,
            ttl,
            view_once,
            name,
            mime,
            no_history,
        } => {
            let link_base = cli.link_base.as_deref().unwrap_or(&cli.server);
            let outgoing = read_outgoing(path, text, &ttl, name, mime)?.view_once(view_once);
            let ledger = if no_history {
                None
            } else {
                Some(open_ledger(cli.ledger.as_ref())?)
            };
            cmd_send(&client, link_base, outgoing, ledger).await
        }

        Commands::Open { url, out, burn } => cmd_open(client, &url, out, burn).await,

        Commands::Delete { id } => {
            burnlink::SecretService::destroy(&client, &id)
                .await
                .with_context(|| format!("delete {id}"))?;
            let mut ledger = open_ledger(cli.ledger.as_ref())?;
            if ledger.remove(&id).is_some() {
                ledger.save()?;
            }
            println!("✓ deleted {id}");
            Ok(())
        }

        Commands::List => cmd_list(&open_ledger(cli.ledger.as_ref())?),

        Commands::Forget { id, expired, all } => {
            let selection = match (&id, expired, all) {
                (Some(id), _, _) => Selection::One(id),
                (None, true, _) => Selection::Expired(SystemClock.now()),
                _ => Selection::All,
            };
            let mut ledger = open_ledger(cli.ledger.as_ref())?;
            cmd_forget(&client, &mut ledger, selection).await
        }

        Commands::Sweep => {
            let n = client.sweep().await.context("sweep")?;
            println!("removed {n} expired secret(s)");
            Ok(())
        }

        Commands::Register { email, password } => {
            let session = client.register(&email, &password).await.context("register")?;
            println!("{}", session.token);
            Ok(())
        }

        Commands::Login { email, password } => {
            let session = client.login(&email, &password).await.context("login")?;
            println!("{}", session.token);
            Ok(())
        }

        Commands::Keygen => {
            println!("{}", cipher::generate_key().to_hex());
            Ok(())
        }
    }
}

// ── Command implementations ───────────────────────────────────────────────────

async fn cmd_serve(host: Option<String>, port: Option<u16>, backend: Option<String>) -> Result<()> {
    let mut cfg = burnlink_server::ServerConfig::default();
    if let Some(host) = host {
        cfg.host = host;
    }
    if let Some(port) = port {
        cfg.port = port;
    }
    if let Some(backend) = backend {
        cfg.backend = backend.parse()?;
    }
    burnlink_server::run(cfg).await
}

fn read_outgoing(
    path: Option<PathBuf>,
    text: Option<String>,
    ttl: &str,
    name: Option<String>,
    mime: Option<String>,
) -> Result<Outgoing> {
    let ttl: humantime::Duration = ttl
        .parse()
        .with_context(|| format!("invalid duration: {ttl}"))?;

    if let Some(text) = text {
        return Ok(Outgoing::text(text, ttl.into()));
    }

    let (plaintext, file_name) = match &path {
        Some(path) => {
            let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
            let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned());
            (bytes, file_name)
        }
        None => {
            let mut bytes = Vec::new();
            std::io::stdin()
                .read_to_end(&mut bytes)
                .context("read stdin")?;
            (bytes, None)
        }
    };

    let name = name.or(file_name);
    let mime_hint = mime.or_else(|| name.as_deref().and_then(guess_mime).map(str::to_owned));
    let is_text = path.is_none() && mime_hint.is_none();
    let content = ContentDescriptor {
        name,
        mime_hint,
        is_text,
    };
    Ok(Outgoing::bytes(plaintext, content, ttl.into()))
}

async fn cmd_send(
    client: &ApiClient,
    link_base: &str,
    outgoing: Outgoing,
    ledger: Option<Ledger>,
) -> Result<()> {
    let view_once = outgoing.view_once;
    let content = outgoing.content.clone();
    let shared = share(client, link_base, outgoing)
        .await
        .context("share failed")?;
    let now = SystemClock.now();

    println!("{}", shared.link);
    eprintln!(
        "expires in {}{}",
        format_duration(shared.expires_at.saturating_sub(now)),
        if view_once { ", or after the first view" } else { "" }
    );

    if let Some(mut ledger) = ledger {
        ledger.record(LedgerEntry::new(&shared, &content, view_once, now));
        ledger.save()?;
    }
    Ok(())
}

fn cmd_list(ledger: &Ledger) -> Result<()> {
    if ledger.entries().is_empty() {
        println!("(no shares)");
        return Ok(());
    }
    let now = SystemClock.now();
    for e in ledger.entries() {
        let what = match (&e.name, e.is_text) {
            (Some(name), _) => name.clone(),
            (None, true) => "text".to_string(),
            (None, false) => "file".to_string(),
        };
        let left = e.expires_at.saturating_sub(now);
        let ttl_info = if left > 0 {
            format!("expires in {}", format_duration(left))
        } else {
            "expired".to_string()
        };
        let once = if e.view_once { ", view once" } else { "" };
        println!("  {}  {what}  {ttl_info}{once}", e.id);
        println!("    {}", e.link);
    }
    Ok(())
}

async fn cmd_forget(
    client: &ApiClient,
    ledger: &mut Ledger,
    selection: Selection<'_>,
) -> Result<()> {
    let out = forget(ledger, client, selection).await;
    ledger.save()?;

    for id in &out.destroyed {
        println!("✓ deleted {id}");
    }
    for (id, e) in &out.failed {
        eprintln!("✗ {id}: {e}");
    }
    if out.destroyed.is_empty() && out.failed.is_empty() {
        println!("nothing to delete");
    }
    if !out.failed.is_empty() {
        anyhow::bail!("{} share(s) could not be deleted", out.failed.len());
    }
    Ok(())
}

async fn cmd_open(client: ApiClient, url: &str, out: Option<PathBuf>, burn: bool) -> Result<()> {
    let mut session = RetrievalSession::new(client, url);
    let revealed = session.open().await?;

    match (&out, revealed.kind, revealed.as_text()) {
        (None, ContentKind::Text, Some(text)) => println!("{text}"),
        _ => {
            let target = out.clone().unwrap_or_else(|| default_output(revealed));
            std::fs::write(&target, revealed.plaintext.as_slice())
                .with_context(|| format!("write {}", target.display()))?;
            eprintln!("wrote {} byte(s) to {}", revealed.plaintext.len(), target.display());
        }
    }
    std::io::stdout().flush().ok();

    if let Some(origin) = &revealed.origin {
        eprintln!("sent from {origin}");
    }
    if revealed.view_once {
        eprintln!("this secret has been destroyed on the server");
    } else if burn {
        session.self_destruct().await?;
        eprintln!("✓ burned");
    } else if let Some(left) = session.remaining() {
        eprintln!("expires in {}", format_duration(left.as_secs() as i64));
    }
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// File name to save a non-text payload under, stripped of any directories.
fn default_output(revealed: &burnlink::Revealed) -> PathBuf {
    revealed
        .content
        .name
        .as_deref()
        .and_then(|n| Path::new(n).file_name())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(format!("burnlink-{}", revealed.id)))
}

fn guess_mime(name: &str) -> Option<&'static str> {
    let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    Some(match ext.as_str() {
        "txt" | "md" | "log" => "text/plain",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "zip" => "application/zip",
        _ => return None,
    })
}

fn open_ledger(path: Option<&PathBuf>) -> Result<Ledger> {
    let path = match path {
        Some(path) => path.clone(),
        None => Ledger::default_path(None)?,
    };
    Ledger::load(path)
}

fn format_duration(secs: i64) -> String {
    let secs = secs.max(0);
    if secs >= 86400 {
        format!("{}d", secs / 86400)
    } else if secs >= 3600 {
        format!("{}h", secs / 3600)
    } else if secs >= 60 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}
