use std::fmt::Display;

use clap::ValueEnum;
use serde_derive::{Deserialize, Serialize};

use crate::core::konst::{CURRENT_DIR, LOGFILE_NAME, LOGGING_JSON, LOGGING_QUIET, THREADS_AUTO};

/// A query paired with its answer, `None` when the lookup failed.
pub type LookupRecord = (String, Option<String>);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupKind {
    /// Hostname to address
    Forward,
    /// Address to hostname
    Reverse,
}

impl LookupKind {
    /// What the queries of this kind are, used in summaries.
    pub fn subject(&self) -> &'static str {
        match self {
            LookupKind::Forward => "hostnames",
            LookupKind::Reverse => "IP addresses",
        }
    }

    /// Column headers for (query, answer).
    pub fn headers(&self) -> [&'static str; 2] {
        match self {
            LookupKind::Forward => ["Hostname", "Address"],
            LookupKind::Reverse => ["Address", "Hostname"],
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ResolverOptions {
    /// Worker threads, 0 picks a value from the CPU count.
    pub threads: usize,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self { threads: THREADS_AUTO }
    }
}

impl ResolverOptions {
    pub fn concurrency(&self) -> Option<usize> {
        match self.threads {
            THREADS_AUTO => None,
            n => Some(n),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LoggingOptions {
    pub dir: String,
    pub file: String,
    pub json: bool,
    pub quiet: bool,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            dir: CURRENT_DIR.to_owned(),
            file: LOGFILE_NAME.to_owned(),
            json: LOGGING_JSON,
            quiet: LOGGING_QUIET,
        }
    }
}
