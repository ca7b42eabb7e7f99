use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::verification::RetryPolicy;

#[derive(Parser, Debug)]
#[command(
    name = "species-index",
    version,
    about = "Extracts and verifies the species index of the Challenger summary report"
)]
pub struct Cli {
    /// Debug logging plus intermediate image dumps.
    #[arg(long, global = true, default_value_t = false)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Segment, OCR, classify and verify the index pages.
    ProcessSpecies(ProcessSpeciesArgs),
    /// Reclassify the texts stored in index_species.json.
    ProcessText(RetryArgs),
    /// Verify only the entries that have no match yet.
    VerifySpecies(RetryArgs),
    /// Fetch extra information for verified species.
    SpeciesExtra(SpeciesExtraArgs),
    Status(StatusArgs),
    /// Find scientific names in free text.
    FindNames(FindNamesArgs),
}

#[derive(Args, Debug, Clone)]
pub struct VerifierArgs {
    #[arg(long, default_value = "https://verifier.globalnames.org/api/v1")]
    pub verifier_url: String,

    /// Restrict verification to these data source ids.
    #[arg(long = "data-source")]
    pub data_sources: Vec<u32>,

    #[arg(long, default_value_t = 8)]
    pub workers: usize,

    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    #[arg(long, default_value_t = 3)]
    pub max_attempts: u32,

    #[arg(long, default_value_t = 500)]
    pub backoff_ms: u64,

    #[arg(long)]
    pub cache_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub no_cache: bool,
}

impl VerifierArgs {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.backoff_ms),
        }
    }

    pub fn resolved_cache_path(&self, default: &Path) -> Option<PathBuf> {
        if self.no_cache {
            return None;
        }
        Some(self.cache_path.clone().unwrap_or_else(|| default.to_path_buf()))
    }
}

#[derive(Args, Debug, Clone)]
pub struct ExtraSourceArgs {
    /// JSON list of extra-info data sources, in rank order.
    #[arg(long)]
    pub data_sources_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ProcessSpeciesArgs {
    #[arg(long, default_value = "data/Oceans1876")]
    pub output_dir: PathBuf,

    #[arg(long, default_value = "data/HathiTrust/sec.6 v.2/images")]
    pub images_dir: PathBuf,

    #[arg(long, default_value_t = 739)]
    pub first_page: u32,

    #[arg(long, default_value_t = 848)]
    pub last_page: u32,

    #[arg(long, default_value = "eng")]
    pub ocr_lang: String,

    #[arg(long, default_value_t = false)]
    pub skip_extra: bool,

    #[command(flatten)]
    pub verifier: VerifierArgs,

    #[command(flatten)]
    pub extra: ExtraSourceArgs,
}

#[derive(Args, Debug, Clone)]
pub struct RetryArgs {
    #[arg(long, default_value = "data/Oceans1876")]
    pub output_dir: PathBuf,

    #[command(flatten)]
    pub verifier: VerifierArgs,
}

#[derive(Args, Debug, Clone)]
pub struct SpeciesExtraArgs {
    #[arg(long, default_value = "data/Oceans1876")]
    pub output_dir: PathBuf,

    /// Refetch entries that already have extra information.
    #[arg(long, default_value_t = false)]
    pub refresh: bool,

    #[arg(long, default_value_t = 8)]
    pub workers: usize,

    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    #[command(flatten)]
    pub extra: ExtraSourceArgs,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = "data/Oceans1876")]
    pub output_dir: PathBuf,

    #[arg(long)]
    pub cache_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct FindNamesArgs {
    #[arg(long)]
    pub text_file: PathBuf,

    #[arg(long, default_value = "https://finder.globalnames.org/api/v1")]
    pub finder_url: String,

    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,
}
