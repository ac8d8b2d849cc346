/*
 *  main.rs
 *
 *  Vitrine - pictures while you're looking
 *  (c) 2024-26 the Vitrine authors
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::time::Duration;

use anyhow::Context;
use env_logger::Env;
use log::{info, warn};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;

use vitrine::config;
use vitrine::motion;
use vitrine::scheduler::{DisplayEvent, DisplayScheduler};

include!(concat!(env!("OUT_DIR"), "/build_info.rs"));

/// Waits for SIGINT, SIGTERM, or SIGHUP and returns so the caller can shut
/// the session down gracefully.
async fn signal_handler() -> anyhow::Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT received. Initiating graceful shutdown.");
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received. Initiating graceful shutdown.");
        }
        _ = sighup.recv() => {
            info!("SIGHUP received. Initiating graceful shutdown.");
        }
    }
    Ok(())
}

/// Presentation stand-in: the engine only emits references and status text;
/// whatever renders them lives on the far side of this channel.
async fn presentation_loop(mut events: mpsc::UnboundedReceiver<DisplayEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            DisplayEvent::ShowImage(path) => info!("slide: {}", path.display()),
            DisplayEvent::Status(text) => info!("status: {}", text.replace('\n', " / ")),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load().context("configuration")?;

    let filter = cfg.log_level.clone().unwrap_or_else(|| "info".to_string());
    env_logger::Builder::from_env(Env::default().default_filter_or(filter))
        .format_timestamp_secs()
        .init();

    info!("{} - pictures while you're looking", env!("CARGO_PKG_NAME"));
    info!("v.{} built {}", env!("CARGO_PKG_VERSION"), BUILD_DATE);
    info!(
        "mode {}, images from {}, dwell {}s",
        cfg.mode,
        cfg.image_folder.display(),
        cfg.image_dwell_secs
    );

    if cfg.mode.uses_motion() && !motion::probe(cfg.pir_pin) {
        warn!("no PIR sensor detected - motion will read as permanently inactive");
    }

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    tokio::spawn(presentation_loop(events_rx));

    let mut scheduler = DisplayScheduler::from_config(&cfg, events_tx);
    let (stop_tx, stop_rx) = mpsc::channel(1);

    let session = tokio::spawn(async move {
        scheduler.run(stop_rx).await;
    });

    signal_handler().await?;

    let _ = stop_tx.send(()).await;
    if tokio::time::timeout(Duration::from_secs(5), session)
        .await
        .is_err()
    {
        warn!("session did not shut down within 5s; exiting anyway");
    }

    info!("Main application exiting.");
    Ok(())
}
