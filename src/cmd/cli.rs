use std::collections::HashMap;
use std::io::ErrorKind;

use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{Level, event};
use tracing_appender::rolling;

use crate::core::common::{LoggingOptions, LookupKind, LookupRecord, OutputFormat, ResolverOptions};
use crate::core::config::Config;
use crate::core::konst::{
    APP_NAME, BIN_NAME, CLI_HEADER_MSG, CONFIG_FILE, CURRENT_DIR, LOG_ENV_VAR, LOGFILE_NAME, LOGGING_JSON,
    LOGGING_QUIET, TERMINAL_WIDTH, THREADS_AUTO,
};
use crate::dns::client::{Lookups, Resolver};
use crate::util::message::{columnise, dns_error_msg, heading_msg, lookup_json_msg, lookup_table_msg};
use crate::util::parser::{input_entries, open_input};
use crate::util::result::group_by_server;

#[derive(Debug, Subcommand, PartialEq, Clone)]
pub enum ConfigCommand {
    /// Create configuration
    Create {
        /// Config filename.
        /// Search Path: $CWD/bdns.toml
        #[clap(short, long, default_value = CONFIG_FILE)]
        file: String,

        /// Warning: Overwrites existing file if found in path.
        #[clap(long, default_value_t = false)]
        force: bool,
    },
}

#[derive(Debug, Subcommand, PartialEq)]
pub enum Command {
    /// Generate a configuration file
    Config {
        #[clap(subcommand)]
        command: ConfigCommand,
    },

    /// Resolve hostnames to IP addresses
    #[command(after_help = format_examples(&[
        "bdns lookup -H example.com -H example.net  # Resolve two hostnames",
        "bdns lookup -i hosts.txt -o json          # Resolve a list, JSON output",
    ]))]
    Lookup {
        /// Hostname to resolve (repeatable)
        #[clap(short = 'H', long = "host", display_order = 1)]
        hosts: Vec<String>,

        #[clap(flatten)]
        input_options: InputOptions,

        #[clap(flatten)]
        shared_options: SharedOptions,
    },

    /// Resolve IP addresses to hostnames
    #[command(after_help = format_examples(&[
        "bdns reverse -A 192.0.2.1          # Reverse lookup one address",
        "cat ips.txt | bdns reverse -i -    # Reverse lookup from stdin",
    ]))]
    Reverse {
        /// IP address to resolve (repeatable)
        #[clap(short = 'A', long = "address", display_order = 1)]
        addresses: Vec<String>,

        #[clap(flatten)]
        input_options: InputOptions,

        #[clap(flatten)]
        shared_options: SharedOptions,
    },

    /// Group hostnames by the configured server they point at
    #[command(after_help = format_examples(&[
        "bdns check -i projects.txt  # Check DNS for a list of sites",
    ]))]
    Check {
        /// Hostname to check (repeatable)
        #[clap(short = 'H', long = "host", display_order = 1)]
        hosts: Vec<String>,

        /// Input list, one entry per line, `-` for stdin
        #[clap(short, long, display_order = 2)]
        input: Option<String>,

        #[clap(flatten)]
        shared_options: SharedOptions,
    },
}

#[derive(Clone, Debug, Args, PartialEq)]
pub struct InputOptions {
    /// Input list, one entry per line, `-` for stdin
    #[clap(short, long, display_order = 2)]
    pub input: Option<String>,

    /// Output format
    #[clap(short, long, default_value_t = OutputFormat::default(), display_order = 3)]
    pub output: OutputFormat,
}

#[derive(Clone, Debug, Args, PartialEq)]
pub struct SharedOptions {
    /// Worker threads (0 == number of CPUs x 4)
    #[clap(short, long, default_value_t = THREADS_AUTO, display_order = 120)]
    pub threads: usize,

    /// Config filename.
    /// Search Path: $CWD/bdns.toml
    #[clap(short, long, default_value = CONFIG_FILE, display_order = 121)]
    pub config: String,

    // Logging options
    // --------------
    /// Logging directory
    #[clap(long, default_value = CURRENT_DIR, display_order = 320)]
    pub dir: String,

    /// Logging filename
    #[clap(long, default_value = LOGFILE_NAME, display_order = 321)]
    pub file: String,

    /// Log to file in JSON format
    #[clap(long, default_value_t = false, display_order = 322)]
    pub json: bool,

    /// Silence terminal output other than results
    #[clap(long, default_value_t = false, display_order = 324)]
    pub quiet: bool,
}

impl Default for SharedOptions {
    fn default() -> Self {
        Self {
            threads: THREADS_AUTO,
            config: CONFIG_FILE.to_owned(),
            dir: CURRENT_DIR.to_owned(),
            file: LOGFILE_NAME.to_owned(),
            json: LOGGING_JSON,
            quiet: LOGGING_QUIET,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = BIN_NAME)]
#[command(bin_name = BIN_NAME)]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "bdns - Bulk DNS and reverse DNS lookups", long_about = None)]
pub struct Cli {
    #[clap(subcommand)]
    command: Command,
}

impl Cli {
    pub fn init() -> Cli {
        Cli::parse()
    }

    pub fn run(self) -> Result<()> {
        // This pulls out the shared options from the nested CLI commands.
        let shared_options = match self.command {
            Command::Config { .. } => SharedOptions::default(),
            Command::Lookup { ref shared_options, .. } => shared_options.clone(),
            Command::Reverse { ref shared_options, .. } => shared_options.clone(),
            Command::Check { ref shared_options, .. } => shared_options.clone(),
        };

        if let Command::Config { command } = self.command {
            match command {
                ConfigCommand::Create { file, force } => Config::generate(&file, force)?,
            }
            return Ok(());
        }

        let (config, config_msg) = load_config(&shared_options.config);
        // A broken config file is worth a warning even when quiet.
        if let Err(msg) = &config_msg {
            eprintln!("{msg}");
        }

        // CLI options should override config file options.
        // If a CLI option is NOT the same as the default,
        // the option was set from the CLI. Therefore we should
        // use the CLI option. Otherwise use the config file option.
        #[rustfmt::skip]
        let logging_options = LoggingOptions {
            dir: if shared_options.dir != CURRENT_DIR { shared_options.dir.clone() } else { config.logging_options.dir.clone() },
            file: if shared_options.file != LOGFILE_NAME { shared_options.file.clone() } else { config.logging_options.file.clone() },
            json: if shared_options.json != LOGGING_JSON { shared_options.json } else { config.logging_options.json },
            quiet: if shared_options.quiet != LOGGING_QUIET { shared_options.quiet } else { config.logging_options.quiet },
        };

        #[rustfmt::skip]
        let resolver_options = ResolverOptions {
            threads: if shared_options.threads != THREADS_AUTO { shared_options.threads } else { config.resolver_options.threads },
        };

        let file_appender = rolling::never(&logging_options.dir, &logging_options.file);
        let (logfile, _guard) = tracing_appender::non_blocking(file_appender);

        let tracer = tracing_subscriber::fmt()
            .with_env_filter(std::env::var(LOG_ENV_VAR).unwrap_or_else(|_| format!("{APP_NAME}=info")))
            .with_writer(logfile)
            .with_ansi(false)
            .with_target(true);

        if logging_options.json {
            tracer.json().init()
        } else {
            tracer.init()
        }

        // JSON output must stay machine readable.
        let json_output = match &self.command {
            Command::Lookup { input_options, .. } | Command::Reverse { input_options, .. } => {
                input_options.output == OutputFormat::Json
            }
            _ => false,
        };
        let quiet = logging_options.quiet || json_output;

        match &config_msg {
            Ok(msg) if !quiet => {
                println!("{CLI_HEADER_MSG}");
                println!("{msg}\n");
            }
            Ok(_) => {}
            Err(msg) => {
                event!(target: APP_NAME, Level::WARN, "{msg}");
                if !quiet {
                    println!("{CLI_HEADER_MSG}");
                }
            }
        }

        let resolver = Resolver::new(resolver_options.concurrency())?;
        event!(target: APP_NAME, Level::INFO, "resolver using {} threads", resolver.concurrency());

        match self.command {
            Command::Config { .. } => {}
            Command::Lookup { hosts, input_options, .. } => {
                let hostnames = collect_inputs(hosts, &input_options.input)?;
                let records = drain(resolver.lookup(hostnames)?, quiet);
                print_records(LookupKind::Forward, records, input_options.output)?;
            }
            Command::Reverse {
                addresses,
                input_options,
                ..
            } => {
                let addresses = collect_inputs(addresses, &input_options.input)?;
                let records = drain(resolver.reverse_lookup(addresses)?, quiet);
                print_records(LookupKind::Reverse, records, input_options.output)?;
            }
            Command::Check { hosts, input, .. } => {
                let hostnames = collect_inputs(hosts, &input)?;
                check_servers(&resolver, hostnames, &config.servers_ip_to_name())?;
            }
        }

        Ok(())
    }
}

/// Load the config file, falling back to the defaults.
/// The message is `Err` when the file exists but could not be used.
fn load_config(filename: &str) -> (Config, Result<String, String>) {
    match Config::load(filename) {
        Ok(config) => (config, Ok(format!("Using configuration file `{filename}`."))),
        Err(e) => {
            let not_found = e
                .downcast_ref::<std::io::Error>()
                .is_some_and(|e| e.kind() == ErrorKind::NotFound);
            let msg = if not_found {
                Ok(format!("Configuration file `{filename}` not found. Using default configuration."))
            } else {
                Err(format!("Configuration file `{filename}` is invalid: {e:#}. Using default configuration."))
            };
            (Config::default(), msg)
        }
    }
}

/// Entries given on the command line, followed by those in the input list.
fn collect_inputs(entries: Vec<String>, input: &Option<String>) -> Result<Box<dyn Iterator<Item = String>>> {
    match input {
        Some(path) => {
            let reader = open_input(path)?;
            Ok(Box::new(entries.into_iter().chain(input_entries(reader))))
        }
        None if entries.is_empty() => bail!("nothing to resolve, pass entries on the command line or use --input"),
        None => Ok(Box::new(entries.into_iter())),
    }
}

/// Consume every lookup, reporting totals unless `quiet`.
fn drain(mut lookups: Lookups<'_>, quiet: bool) -> Vec<LookupRecord> {
    let records: Vec<LookupRecord> = lookups.by_ref().collect();
    if !quiet {
        println!("{}\n", lookups.summary_msg());
    }
    records
}

fn print_records(kind: LookupKind, mut records: Vec<LookupRecord>, output: OutputFormat) -> Result<()> {
    // Results arrive in completion order.
    records.sort();
    match output {
        OutputFormat::Table => println!("{}", lookup_table_msg(kind, &records)),
        OutputFormat::Json => println!("{}", lookup_json_msg(&records)?),
    }
    Ok(())
}

/// Resolve every hostname, group them by the known server they point at,
/// then list the ones that did not match along with reverse names for
/// their addresses.
fn check_servers<H>(resolver: &Resolver, hostnames: H, servers: &HashMap<String, String>) -> Result<()>
where
    H: IntoIterator<Item = String>,
    H::IntoIter: 'static,
{
    println!("{}", heading_msg(Some("Quick Check for Hostnames"), TERMINAL_WIDTH));
    println!("{}", heading_msg(None, TERMINAL_WIDTH));

    let report = group_by_server(resolver.lookup(hostnames)?, servers);

    let longest = report.longest_grouped();
    for (server, hostnames) in &report.groups {
        let heading = format!("{server} ({} sites)", hostnames.len());
        println!("{}", heading_msg(Some(&heading), TERMINAL_WIDTH));
        println!("{}", columnise(hostnames, TERMINAL_WIDTH, Some(longest)));
        println!();
    }

    let heading = format!("{} DNS Errors", report.unmatched.len());
    println!("{}", heading_msg(Some(&heading), TERMINAL_WIDTH));

    let reversed: HashMap<String, String> = resolver
        .reverse_lookup(report.unmatched_addresses())?
        .filter_map(|(address, hostname)| hostname.map(|h| (address, h)))
        .collect();

    let longest = report.longest_unmatched();
    for (hostname, address) in &report.unmatched {
        let reverse = address.as_ref().and_then(|a| reversed.get(a));
        println!(
            "{}",
            dns_error_msg(hostname, address.as_deref(), reverse.map(String::as_str), longest)
        );
    }

    Ok(())
}

/// Format example commands
fn format_examples(examples: &[&str]) -> String {
    let mut result = String::from("\x1B[1;4mExamples:\x1B[0m\n");
    for example in examples {
        result.push_str(&format!("  {}\n", example));
    }
    // Forces visible blank new line.
    // Otherwise, clap strips out raw trailing whitespace.
    result.push_str("\x1B[0m\n");
    result
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn lookup_collects_hosts_and_options() {
        let cli = Cli::try_parse_from(["bdns", "lookup", "-H", "a.example.com", "-H", "b.example.com", "-t", "8", "-o", "json"])
            .unwrap();

        match cli.command {
            Command::Lookup {
                hosts,
                input_options,
                shared_options,
            } => {
                assert_eq!(hosts, vec!["a.example.com", "b.example.com"]);
                assert_eq!(input_options.output, OutputFormat::Json);
                assert_eq!(input_options.input, None);
                assert_eq!(shared_options.threads, 8);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn reverse_defaults_to_table_and_auto_threads() {
        let cli = Cli::try_parse_from(["bdns", "reverse", "-A", "192.0.2.1"]).unwrap();

        match cli.command {
            Command::Reverse {
                addresses,
                input_options,
                shared_options,
            } => {
                assert_eq!(addresses, vec!["192.0.2.1"]);
                assert_eq!(input_options.output, OutputFormat::Table);
                assert_eq!(shared_options, SharedOptions::default());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn config_create_parses_force() {
        let cli = Cli::try_parse_from(["bdns", "config", "create", "--force"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Config {
                command: ConfigCommand::Create {
                    file: CONFIG_FILE.to_owned(),
                    force: true,
                }
            }
        );
    }

    #[test]
    fn command_line_entries_come_before_input_list() {
        let entries = collect_inputs(vec!["a".to_owned()], &None).unwrap();
        assert_eq!(entries.collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn no_entries_and_no_input_is_an_error() {
        assert!(collect_inputs(Vec::new(), &None).is_err());
    }

    #[test]
    fn missing_input_list_is_an_error() {
        assert!(collect_inputs(Vec::new(), &Some("/nonexistent/hosts.txt".to_owned())).is_err());
    }

    #[test]
    fn missing_config_falls_back_to_defaults() {
        let (config, msg) = load_config("/nonexistent/bdns.toml");

        assert_eq!(config.resolver_options.threads, Config::default().resolver_options.threads);
        assert_eq!(
            msg,
            Ok("Configuration file `/nonexistent/bdns.toml` not found. Using default configuration.".to_owned())
        );
    }

    #[test]
    fn invalid_config_is_reported_with_the_parse_error() {
        let mut path = std::env::temp_dir();
        path.push(format!("bdns-invalid-{}.toml", std::process::id()));
        let filename = path.to_string_lossy().into_owned();
        std::fs::write(&filename, "[resolver_options]\nthreads = \"many\"\n").unwrap();

        let (config, msg) = load_config(&filename);
        std::fs::remove_file(&filename).unwrap();

        assert_eq!(config.resolver_options.threads, Config::default().resolver_options.threads);
        let msg = msg.unwrap_err();
        assert!(msg.starts_with(&format!("Configuration file `{filename}` is invalid: ")));
        assert!(msg.contains("threads"));
        assert!(msg.ends_with(". Using default configuration."));
    }
}
