use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use facematch_core::faces::vector::PoolTag;

#[derive(Debug, Parser)]
#[command(
    name = "facematch",
    about = "Enroll and identify faces against student and staff pools",
    version
)]
pub struct Cli {
    /// Emit structured JSON to stdout instead of human-readable logs
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase verbosity (may be used multiple times)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the quality gate on an image without encoding it
    Check(CheckArgs),
    /// Print the face signature computed for an image
    Encode(EncodeArgs),
    /// Register a new subject from a face image
    Enroll(EnrollArgs),
    /// Find the enrolled subject closest to a face image
    Identify(IdentifyArgs),
    /// Delete a subject and its stored signatures
    Remove(RemoveArgs),
    /// List enrolled subjects
    List(ListArgs),
    /// Check configuration, models, store directory and the remote service
    Doctor(DoctorArgs),
}

/// Options shared by every subcommand that touches configuration.
#[derive(Debug, Clone, Default, Args)]
pub struct SettingsArgs {
    /// Configuration file to use instead of the default search path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory holding the per-pool embedding documents
    #[arg(long, value_name = "DIR")]
    pub store_dir: Option<PathBuf>,

    /// API key for the remote biometric service
    #[arg(long, env = "FACEMATCH_SHARED_SECRET", hide_env_values = true)]
    pub shared_secret: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct CheckArgs {
    /// Image to evaluate
    pub image: PathBuf,

    #[command(flatten)]
    pub settings: SettingsArgs,
}

#[derive(Debug, Clone, Args)]
pub struct EncodeArgs {
    /// Image containing the face to encode
    pub image: PathBuf,

    /// Use the slower, jitter-averaged enrollment encoding
    #[arg(long)]
    pub enrollment: bool,

    #[command(flatten)]
    pub settings: SettingsArgs,
}

#[derive(Debug, Clone, Args)]
pub struct EnrollArgs {
    /// Pool to enroll into (student or staff)
    #[arg(long)]
    pub pool: PoolTag,

    /// Identifier of the new subject
    #[arg(long)]
    pub subject: String,

    /// Optional human readable name stored with the subject
    #[arg(long)]
    pub name: Option<String>,

    /// Image containing the subject's face
    pub image: PathBuf,

    #[command(flatten)]
    pub settings: SettingsArgs,
}

#[derive(Debug, Clone, Args)]
pub struct IdentifyArgs {
    /// Pool to search (student or staff)
    #[arg(long)]
    pub pool: PoolTag,

    /// Image containing the face to identify
    pub image: PathBuf,

    /// Maximum distance accepted as a match (defaults to identification_tolerance)
    #[arg(long)]
    pub tolerance: Option<f64>,

    #[command(flatten)]
    pub settings: SettingsArgs,
}

#[derive(Debug, Clone, Args)]
pub struct RemoveArgs {
    /// Pool the subject belongs to
    #[arg(long)]
    pub pool: PoolTag,

    /// Identifier of the subject to delete
    #[arg(long)]
    pub subject: String,

    #[command(flatten)]
    pub settings: SettingsArgs,
}

#[derive(Debug, Clone, Args)]
pub struct ListArgs {
    /// Restrict the listing to one pool
    #[arg(long)]
    pub pool: Option<PoolTag>,

    #[command(flatten)]
    pub settings: SettingsArgs,
}

#[derive(Debug, Clone, Args)]
pub struct DoctorArgs {
    #[command(flatten)]
    pub settings: SettingsArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl From<bool> for OutputMode {
    fn from(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }
}

impl Cli {
    pub fn output_mode(&self) -> OutputMode {
        OutputMode::from(self.json)
    }
}
