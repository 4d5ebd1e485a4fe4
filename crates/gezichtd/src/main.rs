use anyhow::{Context, Result};
use gezicht_core::{DistanceMatcher, OnnxEngine};
use tracing_subscriber::EnvFilter;

mod camera;
mod config;
mod pipeline;
mod processor;
mod protocol;
mod server;
mod source;
#[cfg(test)]
mod testing;

use camera::LazyCamera;
use config::Config;
use processor::CommandProcessor;

fn main() -> Result<()> {
    // stdout carries the protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("gezichtd starting");

    let config = Config::load().context("loading configuration")?;
    tracing::info!(?config, "configuration loaded");

    let engine = OnnxEngine::load(&config.scrfd_model_path(), &config.arcface_model_path())
        .context("loading face models")?;

    let camera = LazyCamera::new(camera::device_opener(
        config.camera_device.clone(),
        config.camera_width,
        config.camera_height,
    ));

    let mut processor = CommandProcessor::new(
        Box::new(engine),
        camera,
        DistanceMatcher {
            tolerance: config.match_tolerance,
        },
        config.max_dimension,
    );

    tracing::info!("gezichtd ready");

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    server::serve(stdin.lock(), stdout.lock(), &mut processor)?;

    tracing::info!(people = processor.registry().len(), "gezichtd shutting down");
    Ok(())
}
