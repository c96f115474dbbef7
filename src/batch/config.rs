//! Batch configuration types.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::mmdb::WriterOptions;

/// Which rule-list schema a job reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// `geosite.dat` to JSON
    GeoSite,
    /// `geoip.dat` to MMDB
    GeoIp,
}

impl JobKind {
    /// Get the name used in config files.
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::GeoSite => "geosite",
            JobKind::GeoIp => "geoip",
        }
    }

    /// Default output file name for this kind.
    pub fn default_output(&self) -> &'static str {
        match self {
            JobKind::GeoSite => "geosite.json",
            JobKind::GeoIp => "geoip.mmdb",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A single source/destination pair.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobConfig {
    /// Label for logs; defaults to the input file name
    #[serde(default)]
    pub name: Option<String>,
    pub kind: JobKind,
    pub input: PathBuf,
    /// Defaults to `geosite.json` / `geoip.mmdb` next to the config; unique per batch
    #[serde(default)]
    pub output: Option<PathBuf>,
    /// Promote insertion failures to errors (geoip only)
    #[serde(default)]
    pub strict: bool,
}

impl JobConfig {
    /// Label used in logs and summaries.
    pub fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            self.input
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.kind.name().to_string())
        })
    }

    /// Output path, falling back to the kind's default file name.
    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| PathBuf::from(self.kind.default_output()))
    }
}

/// MMDB settings shared by all geoip jobs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WriterSettings {
    pub database_type: String,
    pub description: BTreeMap<String, String>,
    pub languages: Vec<String>,
    pub record_size: u16,
    pub ip_version: u16,
    pub include_reserved_networks: bool,
    pub disable_ipv4_aliasing: bool,
    pub build_epoch: Option<u64>,
}

impl Default for WriterSettings {
    fn default() -> Self {
        WriterOptions::default().into()
    }
}

impl From<WriterOptions> for WriterSettings {
    fn from(options: WriterOptions) -> Self {
        Self {
            database_type: options.database_type,
            description: options.description,
            languages: options.languages,
            record_size: options.record_size,
            ip_version: options.ip_version,
            include_reserved_networks: options.include_reserved_networks,
            disable_ipv4_aliasing: options.disable_ipv4_aliasing,
            build_epoch: options.build_epoch,
        }
    }
}

impl From<WriterSettings> for WriterOptions {
    fn from(settings: WriterSettings) -> Self {
        Self {
            database_type: settings.database_type,
            description: settings.description,
            languages: settings.languages,
            record_size: settings.record_size,
            ip_version: settings.ip_version,
            include_reserved_networks: settings.include_reserved_networks,
            disable_ipv4_aliasing: settings.disable_ipv4_aliasing,
            build_epoch: settings.build_epoch,
        }
    }
}

/// A batch of independent conversion jobs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BatchConfig {
    #[serde(default)]
    pub writer: WriterSettings,
    pub jobs: Vec<JobConfig>,
}

impl BatchConfig {
    /// Parse a YAML batch config.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML batch config, resolving relative paths against its directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = serde_yaml::from_str(&content)?;

        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.validate()?;
        Ok(config)
    }

    /// Make relative input/output paths relative to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        for job in &mut self.jobs {
            if job.input.is_relative() {
                job.input = base.join(&job.input);
            }
            let output = job.output_path();
            if output.is_relative() {
                job.output = Some(base.join(output));
            }
        }
    }

    /// Check the batch can run; every job must write its own output.
    pub fn validate(&self) -> Result<()> {
        if self.jobs.is_empty() {
            return Err(Error::Config("batch contains no jobs".to_string()));
        }

        let mut outputs: HashMap<PathBuf, String> = HashMap::new();
        for job in &self.jobs {
            let output = job.output_path();
            if let Some(other) = outputs.get(&output) {
                return Err(Error::Config(format!(
                    "jobs {} and {} both write {}",
                    other,
                    job.label(),
                    output.display()
                )));
            }
            outputs.insert(output, job.label());

            if job.input.as_os_str().is_empty() {
                return Err(Error::Config(format!("job {} has no input", job.label())));
            }
            if job.strict && job.kind == JobKind::GeoSite {
                log::warn!("Job {}: strict has no effect on geosite jobs", job.label());
            }
        }
        if !matches!(self.writer.record_size, 24 | 28 | 32) {
            return Err(Error::Config(format!(
                "unsupported record size: {}",
                self.writer.record_size
            )));
        }
        Ok(())
    }
}
