pub const APP_NAME: &str = "bulkdns";
pub const BIN_NAME: &str = "bdns";

pub const CLI_HEADER_MSG: &str = "bdns - Bulk DNS and reverse DNS lookups";

// Config
pub const CONFIG_FILE: &str = "bdns.toml";

// Logging
pub const CURRENT_DIR: &str = ".";
pub const LOGFILE_NAME: &str = "bdns.log";
pub const LOG_ENV_VAR: &str = "BDNS_LOG";
pub const LOGGING_JSON: bool = false;
pub const LOGGING_QUIET: bool = false;

// Worker pool
pub const THREADS_PER_CPU: usize = 4;
pub const QUEUE_FACTOR: usize = 2;
pub const THREADS_AUTO: usize = 0;
pub const WORKER_THREAD_NAME: &str = "bulkdns-worker";
pub const RESOLVER_THREAD_NAME: &str = "bulkdns-resolve";

// Output
pub const TERMINAL_WIDTH: usize = 80;
pub const STDIN_PATH: &str = "-";
