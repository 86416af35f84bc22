use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shared::ndef::NdefMessage;
use tag_session::{ActionOutcome, TagAction, TagSessionController};
use tag_transport::{EmulatedTag, EmulatedTransport};

mod config;

#[derive(Parser, Debug)]
struct Cli {
    /// Path of the tag image file; defaults to the configured tag file.
    #[arg(long)]
    tag_file: Option<PathBuf>,
    /// Emulated tag capacity in bytes.
    #[arg(long)]
    capacity: Option<usize>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read the location stored on the tag.
    Read,
    /// Initialize the tag with a fresh location.
    SetupLocation { name: String },
    /// Append a visitor to the tag's location.
    AddVisitor { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let cli = Cli::parse();
    let settings = config::load_settings();

    let tag_file = cli.tag_file.unwrap_or(settings.tag_file);
    let capacity = cli.capacity.unwrap_or(settings.capacity);

    let mut tag = EmulatedTag::read_write(capacity);
    if let Some(message) = load_tag_image(&tag_file)? {
        tag = tag.with_message(message);
    }
    let tag = Arc::new(tag);
    let controller = TagSessionController::new(Arc::new(EmulatedTransport::new(Arc::clone(&tag))));

    let action = match cli.command {
        Command::Read => TagAction::ReadLocation,
        Command::SetupLocation { name } => TagAction::SetupLocation {
            location_name: name,
        },
        Command::AddVisitor { name } => TagAction::AddVisitor { visitor_name: name },
    };

    match controller.perform_action(action).await {
        Ok(ActionOutcome::Completed(location)) => {
            println!(
                "location={} visitors={}",
                location.name,
                location.visitors.len()
            );
            for visitor in &location.visitors {
                println!("  {}", visitor.name);
            }
            store_tag_image(&tag_file, &tag).await?;
        }
        Ok(ActionOutcome::Cancelled) => {
            println!("session cancelled before completing");
        }
        Err(err) => return Err(err.into()),
    }

    Ok(())
}

fn load_tag_image(path: &Path) -> Result<Option<NdefMessage>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read tag image '{}'", path.display()))
        }
    };
    if bytes.is_empty() {
        return Ok(None);
    }
    let message = NdefMessage::decode(&bytes)
        .with_context(|| format!("tag image '{}' is not valid NDEF", path.display()))?;
    Ok(Some(message))
}

async fn store_tag_image(path: &Path, tag: &EmulatedTag) -> Result<()> {
    let Some(message) = tag.stored_message().await else {
        return Ok(());
    };
    let bytes = message
        .encode()
        .context("tag contents could not be framed as NDEF")?;
    fs::write(path, bytes)
        .with_context(|| format!("failed to write tag image '{}'", path.display()))
}
