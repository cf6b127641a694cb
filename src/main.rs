//! WSI Pseudonym - pseudonymization engine for Whole Slide Images.
//!
//! This binary reads a JSON manifest, runs the controller, and writes the
//! output manifest to disk.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsi_pseudonym::{
    config::{Cli, Command, RunConfig},
    label::{AbGlyphRasterizer, TextRasterizer},
    manifest::Manifest,
    registry::LocalRegistry,
    Pseudonymizer,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Pseudonymize(config) => run(config, Direction::Pseudonymize).await,
        Command::Depseudonymize(config) => run(config, Direction::Depseudonymize).await,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Pseudonymize,
    Depseudonymize,
}

// =============================================================================
// Run
// =============================================================================

async fn run(config: RunConfig, direction: Direction) -> ExitCode {
    init_logging(config.verbose);

    let needs_fonts = direction == Direction::Pseudonymize;
    if let Err(e) = config.validate(needs_fonts) {
        error!("Configuration error: {e}");
        return ExitCode::FAILURE;
    }

    // Read and parse the input manifest
    info!("Reading input manifest {}", config.input.display());
    let input_text = match std::fs::read_to_string(&config.input) {
        Ok(text) => text,
        Err(e) => {
            error!("Cannot read {}: {e}", config.input.display());
            return ExitCode::FAILURE;
        }
    };
    let input = match Manifest::from_json(&input_text) {
        Ok(manifest) => manifest,
        Err(e) => {
            error!("Input file is not a valid manifest: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Open the registry
    let registry = match LocalRegistry::open(&config.registry_path).await {
        Ok(registry) => registry,
        Err(e) => {
            error!("Cannot open registry: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Load font faces; de-pseudonymization renders nothing, so a dummy
    // rasterizer is never exercised there
    let text: Arc<dyn TextRasterizer> = if needs_fonts {
        let regular = config.font_regular.as_ref().expect("validated above");
        let display = config.font_display.as_ref().expect("validated above");
        match AbGlyphRasterizer::from_files(regular, display) {
            Ok(fonts) => Arc::new(fonts),
            Err(e) => {
                error!("Cannot load fonts: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        Arc::new(NoText)
    };

    let controller = match Pseudonymizer::new(config.engine_config(), registry, text) {
        Ok(controller) => controller,
        Err(e) => {
            error!("Cannot initialize engine: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!("Performing {}", match direction {
        Direction::Pseudonymize => "pseudonymization",
        Direction::Depseudonymize => "de-pseudonymization",
    });

    let result = match direction {
        Direction::Pseudonymize => controller.pseudonymize(&input).await,
        Direction::Depseudonymize => controller.depseudonymize(&input).await,
    };

    let output = match result {
        Ok(output) => output,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    // Write the output manifest
    let output_path = config.output_path();
    let output_text = match output.to_json_pretty() {
        Ok(text) => text,
        Err(e) => {
            error!("Cannot serialize output manifest: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = std::fs::write(&output_path, output_text) {
        error!("Cannot write {}: {e}", output_path.display());
        return ExitCode::FAILURE;
    }

    info!("Done. Output manifest: {}", output_path.display());
    ExitCode::SUCCESS
}

/// Placeholder rasterizer for flows that never draw text.
struct NoText;

impl TextRasterizer for NoText {
    fn measure(&self, _text: &str, _face: wsi_pseudonym::label::FontFace, _size: f32) -> (u32, u32) {
        (0, 0)
    }

    fn draw(
        &self,
        _canvas: &mut image::RgbImage,
        _x: u32,
        _y: u32,
        _text: &str,
        _face: wsi_pseudonym::label::FontFace,
        _size: f32,
    ) {
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "wsi_pseudonym=debug"
    } else {
        "wsi_pseudonym=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
