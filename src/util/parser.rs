use std::fs::File;
use std::io::{self, BufRead, BufReader, ErrorKind};
use std::net::IpAddr;

use anyhow::{Context, Result};
use tracing::{Level, event};

use crate::core::konst::{APP_NAME, STDIN_PATH};

/// Parse an IP address, tolerating surrounding whitespace.
pub fn parse_ipaddr(s: &str) -> Option<IpAddr> {
    s.trim().parse::<IpAddr>().ok()
}

/// Open an input list, `-` being stdin.
pub fn open_input(path: &str) -> Result<Box<dyn BufRead>> {
    if path == STDIN_PATH {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(path).with_context(|| format!("unable to read input file `{path}`"))?;
    Ok(Box::new(BufReader::new(file)))
}

/// Lazily read one entry per line.
/// Blank lines and lines starting with `#` are skipped, as are lines that
/// are not valid UTF-8. Any other read error ends the input.
pub fn input_entries<R: BufRead>(reader: R) -> impl Iterator<Item = String> {
    reader
        .lines()
        .enumerate()
        .map_while(|(n, line)| match line {
            Ok(line) => Some(Some(line)),
            // The offending line has been consumed, keep reading.
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                event!(target: APP_NAME, Level::WARN, "skipping input line {}: {e}", n + 1);
                Some(None)
            }
            Err(e) => {
                event!(target: APP_NAME, Level::ERROR, "input read failed at line {}: {e}", n + 1);
                None
            }
        })
        .flatten()
        .map(|line| line.trim().to_owned())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}
