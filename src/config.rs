//! Configuration management for the pseudonymization engine.
//!
//! This module provides:
//! - Command-line arguments via clap (subcommands `pseudonymize` and
//!   `depseudonymize`)
//! - Environment variables with `WSI_` prefix
//! - The engine-level constants (store layout, ID lengths, date formats)
//!   gathered in one place and handed to the controller as a plain struct,
//!   so there is no process-wide mutable state
//!
//! # Environment Variables
//!
//! - `WSI_STORE_PATH` - Escrow store directory (default: data/store)
//! - `WSI_REGISTRY_PATH` - Registry persistence file (default: data/registry.json)
//! - `WSI_DEST_DIR` - Directory for clone files (default: alongside the source)
//! - `WSI_FONT_REGULAR` - TTF file for regular label text
//! - `WSI_FONT_DISPLAY` - TTF file for the display (slide ID) label text

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

// =============================================================================
// Default Values
// =============================================================================

/// Default escrow store directory.
pub const DEFAULT_STORE_PATH: &str = "data/store";

/// Default registry persistence file.
pub const DEFAULT_REGISTRY_PATH: &str = "data/registry.json";

/// Length of pseudonymous entity IDs.
///
/// At 100 allocations per second a 13-character ID over `[0-9A-Za-z]` needs
/// on the order of thousands of years for a 1% collision probability, so the
/// bounded retry loop in the registry is sufficient under any realistic load.
pub const PSEUDO_ID_LENGTH: usize = 13;

/// Length of random escrow blob file names.
pub const STORE_FILE_NAME_LENGTH: usize = 20;

/// Retry budget for pseudonymous ID allocation before reporting a conflict.
pub const ID_ALLOCATION_ATTEMPTS: u32 = 10;

/// Retry budget for drawing a pseudonymous timestamp that differs from the
/// original before surfacing an inconsistency.
pub const TIMESTAMP_DRAW_ATTEMPTS: u32 = 16;

/// Date format used in emitted manifests.
pub const DATE_FORMAT: &str = "%d.%m.%Y";

/// Datetime format used in emitted manifests and on rendered labels.
pub const DATETIME_FORMAT: &str = "%I:%M%p %d.%m.%Y";

/// Bounds of the per-invocation gap year drawn for timestamp pseudonyms.
pub const GAP_YEAR_RANGE: (i32, i32) = (1, 8);

/// Bounds of randomized pseudonymous patient ages.
pub const PSEUDO_AGE_RANGE: (u32, u32) = (20, 70);

// =============================================================================
// CLI Arguments
// =============================================================================

/// WSI Pseudonym - a pseudonymization engine for Whole Slide Images.
///
/// Replaces the label image and identifying metadata of Aperio SVS slides
/// with synthetic equivalents, escrowing the originals so the operation can
/// be reversed by an authorized party.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsi-pseudonym")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

impl Cli {
    /// Consume the CLI and return the selected command.
    pub fn into_command(self) -> Command {
        self.command
    }
}

/// Top-level commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Pseudonymize the slides described by an input manifest.
    Pseudonymize(RunConfig),

    /// Restore the original slides described by a pseudonymized manifest.
    Depseudonymize(RunConfig),
}

/// Configuration shared by both commands.
#[derive(Args, Debug, Clone)]
pub struct RunConfig {
    /// Path of the JSON input manifest.
    pub input: PathBuf,

    /// Path the output manifest is written to.
    ///
    /// Defaults to the input path with an `.out.json` extension.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Escrow store directory.
    #[arg(long, default_value = DEFAULT_STORE_PATH, env = "WSI_STORE_PATH")]
    pub store_path: PathBuf,

    /// Registry persistence file.
    #[arg(long, default_value = DEFAULT_REGISTRY_PATH, env = "WSI_REGISTRY_PATH")]
    pub registry_path: PathBuf,

    /// Directory the clone files are written to.
    ///
    /// If not specified, clones are created alongside their source files.
    #[arg(long, env = "WSI_DEST_DIR")]
    pub dest_dir: Option<PathBuf>,

    /// TTF font file for regular label text.
    #[arg(long, env = "WSI_FONT_REGULAR")]
    pub font_regular: Option<PathBuf>,

    /// TTF font file for the display face (large slide ID) on labels.
    #[arg(long, env = "WSI_FONT_DISPLAY")]
    pub font_display: Option<PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl RunConfig {
    /// Validate the configuration and return an error message if invalid.
    ///
    /// `needs_fonts` is true for pseudonymization, which renders labels and
    /// therefore requires both font faces.
    pub fn validate(&self, needs_fonts: bool) -> Result<(), String> {
        if !self.input.exists() {
            return Err(format!("Input manifest not found: {}", self.input.display()));
        }

        if self.store_path.as_os_str().is_empty() {
            return Err("Escrow store path must not be empty".to_string());
        }

        if let Some(ref dest) = self.dest_dir {
            if !dest.is_dir() {
                return Err(format!(
                    "Destination path must be a directory: {}",
                    dest.display()
                ));
            }
        }

        if needs_fonts {
            for (flag, path) in [
                ("--font-regular", &self.font_regular),
                ("--font-display", &self.font_display),
            ] {
                match path {
                    None => {
                        return Err(format!(
                            "{flag} is required for pseudonymization. \
                             Set it or the matching WSI_FONT_* variable"
                        ));
                    }
                    Some(p) if !p.is_file() => {
                        return Err(format!("Font file not found: {}", p.display()));
                    }
                    Some(_) => {}
                }
            }
        }

        Ok(())
    }

    /// Resolve the output manifest path.
    pub fn output_path(&self) -> PathBuf {
        match &self.output {
            Some(path) => path.clone(),
            None => {
                let mut path = self.input.clone();
                path.set_extension("out.json");
                path
            }
        }
    }

    /// Build the engine configuration handed to the controller.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            store_dir: self.store_path.clone(),
            dest_dir: self.dest_dir.clone(),
        }
    }
}

// =============================================================================
// Engine Configuration
// =============================================================================

/// Plain configuration struct consumed by the controller.
///
/// Kept separate from the CLI type so library callers can construct it
/// directly.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Escrow store directory.
    pub store_dir: PathBuf,

    /// Directory clone files are written to; `None` places them alongside
    /// their source files.
    pub dest_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            store_dir: PathBuf::from(DEFAULT_STORE_PATH),
            dest_dir: None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
