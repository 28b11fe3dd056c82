// Gusto - Video to image sequence converter
// Main library entry point

pub mod app;
pub mod cli;
pub mod config;
pub mod convert;
pub mod discovery;
pub mod frontend;
pub mod gstreamer_init;

use std::sync::Arc;

use anyhow::Context;

use crate::app::Controller;
use crate::cli::Cli;
use crate::frontend::{ConsoleFrontend, MessageSink, Severity};

/// Run one conversion from the command line
pub fn run(cli: Cli) -> anyhow::Result<()> {
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config_path = cli.config.clone().unwrap_or_else(config::get_config_path);
    let config = cli.apply_to(&config::Config::load_or_default(&config_path));
    if cli.save_config {
        config
            .save(&config_path)
            .with_context(|| format!("Failed to save config to {}", config_path.display()))?;
        log::info!("Saved defaults to {}", config_path.display());
    }

    if !gstreamer_init::init_gstreamer() {
        anyhow::bail!("GStreamer is not available");
    }

    let frontend = Arc::new(ConsoleFrontend::new(cli.yes));
    let mut controller = Controller::with_gstreamer(
        config,
        frontend.clone(),
        frontend.clone(),
        frontend.clone(),
    );

    let Some(metadata) = controller.select_video(cli.input.clone())? else {
        frontend.report(Severity::Info, "No video selected, nothing to do");
        return Ok(());
    };

    let mut settings = cli.settings(controller.config(), metadata.path.clone());
    controller.fill_output_dir(&mut settings);

    let summary = controller.convert(&settings)?;
    println!(
        "{} images written to {}",
        summary.frames_written,
        summary.output_dir.display()
    );
    Ok(())
}
