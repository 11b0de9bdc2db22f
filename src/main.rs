use anyhow::Context;
use chrono::Local;
use clap::{Parser, Subcommand};
use clinic_inbox::inbox_core::filter::ContactFilter;
use clinic_inbox::inbox_core::message::format_message_time;
use clinic_inbox::inbox_core::profile::ProfileSnapshot;
use clinic_inbox::inbox_core::scroll::Viewport;
use clinic_inbox::inbox_core::{CanonicalId, Contact, Direction, InboxConfig, Message};
use clinic_inbox::memory::{MemoryBackend, RecordingViewport};
use clinic_inbox::{ConversationSnapshot, MessagingSession};
use log::{info, warn};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "clinic-inbox")]
#[command(about = "Inspect contact resolution and conversation views from JSON exports")]
struct Cli {
    /// JSON config file; missing keys keep their defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long, default_value = "default")]
    organization: String,

    /// Profile cache snapshot (object keyed by identifier).
    #[arg(short, long)]
    profiles: Option<PathBuf>,

    #[arg(short, long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve, filter and list contacts.
    Contacts {
        /// Array of contact records.
        contacts: PathBuf,

        #[arg(short, long, default_value = "")]
        search: String,

        #[arg(short, long)]
        automatic_only: bool,
    },
    /// Load a conversation page by page and print its unread/read split.
    Conversation {
        /// Phone number of the contact.
        contact: String,

        /// Array of message records for that contact.
        messages: PathBuf,

        /// Array of contact records, for names and read cursors.
        #[arg(long)]
        contacts: Option<PathBuf>,

        /// Pages to load, the newest one included.
        #[arg(long, default_value_t = 1)]
        pages: usize,

        #[arg(short, long)]
        automatic_only: bool,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{:<5}] [{}] - {}",
                Local::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let cli = Cli::parse();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    rt.block_on(run(cli))
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => InboxConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => InboxConfig::default(),
    };

    let mut backend = MemoryBackend::new().with_country_code(config.identity.country_code.clone());
    if let Some(path) = &cli.profiles {
        let snapshot: ProfileSnapshot = read_json(path).await?;
        backend = backend.with_profiles(snapshot);
    } else {
        warn!("No profile snapshot given; names and photos come from contact records only");
    }
    let backend = Arc::new(backend);

    match cli.command {
        Commands::Contacts {
            contacts,
            search,
            automatic_only,
        } => {
            let records: Vec<Contact> = read_json(&contacts).await?;
            for record in records {
                backend.add_contact(record).await;
            }
            let session = MessagingSession::new(&cli.organization, backend, config);
            session.refresh_contacts().await?;

            let filter = ContactFilter::search(search).automatic_only(automatic_only);
            let rows = session.contact_list(&filter).await;
            info!("{} contacts match", rows.len());

            if cli.json {
                let resolved: Vec<_> = rows.iter().map(|r| &r.resolved).collect();
                println!("{}", serde_json::to_string_pretty(&resolved)?);
            } else {
                let now = Local::now();
                for row in rows {
                    println!(
                        "{:<28} {:<22} {:>3} unread  {:<18} {}",
                        row.resolved.display_name,
                        row.resolved.formatted_phone,
                        row.contact.unread(),
                        format_message_time(row.contact.last_message_at, &now),
                        row.resolved.photo_url.as_deref().unwrap_or("-"),
                    );
                }
            }
        }
        Commands::Conversation {
            contact,
            messages,
            contacts,
            pages,
            automatic_only,
        } => {
            let id = CanonicalId::with_country(&contact, &config.identity.country_code);
            anyhow::ensure!(!id.is_empty(), "contact {contact:?} has no phone digits");

            let history: Vec<Message> = read_json(&messages).await?;
            backend.add_messages(&id, history).await;
            if let Some(path) = contacts {
                let records: Vec<Contact> = read_json(&path).await?;
                for record in records {
                    backend.add_contact(record).await;
                }
            }

            let session = MessagingSession::new(&cli.organization, backend, config);
            session.refresh_contacts().await?;
            let viewport = Arc::new(RecordingViewport::new(Viewport {
                scroll_top: 0.0,
                scroll_height: 0.0,
                client_height: 800.0,
                width: 1280.0,
            }));
            let view = session.open_conversation(viewport);
            view.set_automatic_only(automatic_only).await;

            view.select_contact(id.clone()).await?;
            for _ in 1..pages {
                if view.load_more().await?.is_none() {
                    break;
                }
            }

            let snapshot = view.snapshot().await;
            let title = match session.resolve_contact(&id).await {
                Some(resolved) => resolved.display_name,
                None => contact,
            };
            if cli.json {
                let unread: Vec<_> = snapshot.unread.iter().collect();
                let read: Vec<_> = snapshot.read.iter().collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "contact": title,
                        "hasMore": snapshot.has_more,
                        "unread": unread,
                        "read": read,
                    }))?
                );
            } else {
                print_conversation(&title, &snapshot);
            }
        }
    }
    Ok(())
}

fn print_conversation(title: &str, snapshot: &ConversationSnapshot) {
    let now = Local::now();
    let line = |m: &Message| {
        let arrow = match m.direction {
            Direction::Inbound => "<<",
            Direction::Outbound => ">>",
        };
        println!(
            "  {:<16} {arrow} {}",
            format_message_time(m.effective_timestamp(), &now),
            m.display_text()
        );
    };

    println!(
        "== {title} ({} messages{}) ==",
        snapshot.message_count(),
        if snapshot.has_more { ", more available" } else { "" }
    );
    if !snapshot.unread.is_empty() {
        println!("-- {} unread --", snapshot.unread.len());
        snapshot.unread.iter().for_each(&line);
        if !snapshot.read.is_empty() {
            println!("----");
        }
    }
    snapshot.read.iter().for_each(&line);
}
