//! Follows a live HLS stream and prints every loader event.
//!
//! ```text
//! RUST_LOG=m3u8_loader=debug cargo run --example watch --features runtime -- <url> [rendition]
//! ```

use std::time::Duration;

use m3u8_loader::runtime::spawn_loader;
use m3u8_loader::{Error, LoaderConfig, LoaderEvent, RuntimeConfig, Severity, UsageError};
use tracing::Level;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let mut args = std::env::args().skip(1);
    let url = args.next().ok_or("usage: watch <url> [rendition]")?;
    let rendition = args.next();

    let config = LoaderConfig::default()
        .with_auto_select_first_variant(rendition.is_none())
        .with_expired_time_tracking(true);
    let (handle, mut events) = spawn_loader(url, config, RuntimeConfig::default())?;

    if let Some(uri) = rendition {
        loop {
            match handle.select_media(uri.clone()).await {
                Err(Error::Usage(UsageError::NoMaster { .. })) => {
                    tokio::time::sleep(Duration::from_millis(100)).await
                }
                other => break other?,
            }
        }
    }

    let mut status = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                println!("{}", event);
                if let LoaderEvent::Error(info) = &event {
                    if info.severity == Severity::Fatal {
                        break;
                    }
                }
            }
            _ = status.tick() => {
                let snapshot = handle.snapshot().await?;
                if let Some(media) = &snapshot.media {
                    println!(
                        "{} seq {} ~ {} segments ~ expired {:.3}s ~ bandwidth {:?}",
                        media.uri,
                        media.media_sequence,
                        media.segments.len(),
                        snapshot.expired_seconds,
                        snapshot.bandwidth,
                    );
                }
            }
        }
    }

    handle.dispose().await;
    Ok(())
}
