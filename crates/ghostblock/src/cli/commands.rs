//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Blocked region commands.
#[derive(Debug, Subcommand)]
pub enum RegionsCommand {
    /// List blocked regions
    List {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Block a circle around a point
    Add {
        /// Center x coordinate
        x: f64,

        /// Center y coordinate
        y: f64,

        /// Radius in pixels (defaults to the configured block radius)
        #[arg(short, long)]
        radius: Option<f64>,
    },

    /// Remove a region by its index in `regions list`
    Remove {
        /// Zero-based index
        index: usize,
    },

    /// Remove every blocked region
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Check command arguments.
#[derive(Debug, Args)]
pub struct CheckCommand {
    /// Touch x coordinate
    pub x: f64,

    /// Touch y coordinate
    pub y: f64,
}

/// Record command arguments.
#[derive(Debug, Args)]
pub struct RecordCommand {
    /// Session length in seconds (defaults to the persisted duration)
    #[arg(short, long, value_name = "SECS")]
    pub duration: Option<u32>,
}

/// Settings commands.
#[derive(Debug, Subcommand)]
pub enum SettingsCommand {
    /// Show the persisted settings
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Set the radius of regions created by recording (1-200)
    Radius {
        /// Radius in pixels
        pixels: u32,
    },

    /// Set the recording session length (60-3600)
    Duration {
        /// Length in seconds
        seconds: u32,
    },

    /// Turn filtering on
    Enable,

    /// Turn filtering off
    Disable,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
