//! Boson thermal frame relay
//!
//! Captures raw 16-bit frames from a V4L2 device and streams them to a local
//! consumer over a Unix-domain socket.
//!
//! ## Usage
//!
//! ```bash
//! boson-relay [--config relay.toml] [--device 1] [--dry-run] [--timing]
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use boson_relay::{pipeline, utils, Config};
use color_eyre::{eyre::eyre, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// How long a stop request waits for the frame in flight.
const STOP_GRACE: Duration = Duration::from_secs(2);

/// Flags that override the loaded configuration
#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    device: Option<String>,
    dry_run: bool,
    timing: bool,
}

impl Args {
    fn parse() -> Result<Self> {
        let mut args = Args::default();
        let mut iter = std::env::args().skip(1);
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--config" => {
                    let path = iter.next().ok_or_else(|| eyre!("--config needs a path"))?;
                    args.config = Some(PathBuf::from(path));
                }
                "--device" => {
                    args.device = Some(iter.next().ok_or_else(|| eyre!("--device needs a value"))?);
                }
                "--dry-run" => args.dry_run = true,
                "--timing" => args.timing = true,
                other => return Err(eyre!("unknown argument: {}", other)),
            }
        }
        Ok(args)
    }

    fn apply(self, config: &mut Config) {
        if let Some(device) = self.device {
            config.capture.device = device;
        }
        config.transport.dry_run |= self.dry_run;
        config.diagnostics.timing |= self.timing;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("boson_relay=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("Boson relay launching...");

    let args = Args::parse()?;
    let mut config = Config::load(args.config.as_deref())?;
    args.apply(&mut config);

    let device = utils::resolve_device(&config.capture.device, config.capture.format)?;
    info!("Using capture device: {}", device.display());
    if config.transport.dry_run {
        info!("Dry run: frames will be captured but not sent");
    } else {
        info!("Consumer socket: {}", config.transport.socket_path.display());
    }

    let stop = Arc::new(AtomicBool::new(false));
    let loop_stop = stop.clone();
    let mut relay = tokio::task::spawn_blocking(move || pipeline::run(&config, &device, &loop_stop));

    let frames = tokio::select! {
        res = &mut relay => res?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, stopping after the current frame");
            stop.store(true, Ordering::Relaxed);
            match tokio::time::timeout(STOP_GRACE, &mut relay).await {
                Ok(res) => res?,
                Err(_) => {
                    warn!("Capture loop did not stop within {:?}", STOP_GRACE);
                    std::process::exit(1);
                }
            }
        }
    };

    let frames = frames?;
    info!("Boson relay shutting down after {} frames", frames);
    Ok(())
}
