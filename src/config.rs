//! Server configuration, parsed from the command line. Grounded in the
//! teacher binary's `cli()` `clap::Command` (one named flag per connection
//! parameter, with a documented default) generalized to `clap::Parser`
//! derive, which is what the rest of the dependency pack (masterror's
//! `axum-rest-api` example, `hoot`'s examples) reaches for.

use clap::Parser;

/// Mirrors the teacher's `DEFAULT_PG_STATS_EXPORTER_API` constant: the
/// address the server binds when `--listen` is not given.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";

/// Default path the report collector is mounted at.
pub const DEFAULT_REPORT_PATH: &str = "/__reports";

/// Default cap on a single report body, handed to
/// [`crate::report::ReportCollector`].
pub const DEFAULT_MAX_REPORT_BYTES: usize = crate::report::collector::DEFAULT_MAX_REPORT_BYTES;

#[derive(Debug, Clone, Parser)]
#[command(name = "safeweb", version, about = "A safe HTTP request-handling framework")]
pub struct ServerConfig {
    /// Address to bind the HTTP listener on.
    #[arg(long, default_value_t = DEFAULT_LISTEN_ADDR.to_string())]
    pub listen: String,

    /// Path the W3C report collector is mounted at.
    #[arg(long, default_value_t = DEFAULT_REPORT_PATH.to_string())]
    pub report_path: String,

    /// Maximum size, in bytes, of a single incoming report body.
    #[arg(long, default_value_t = DEFAULT_MAX_REPORT_BYTES)]
    pub max_report_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen: DEFAULT_LISTEN_ADDR.to_string(),
            report_path: DEFAULT_REPORT_PATH.to_string(),
            max_report_bytes: DEFAULT_MAX_REPORT_BYTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        ServerConfig::command().debug_assert();
    }

    #[test]
    fn defaults_match_constants() {
        let config = ServerConfig::parse_from(["safeweb"]);
        assert_eq!(config.listen, DEFAULT_LISTEN_ADDR);
        assert_eq!(config.report_path, DEFAULT_REPORT_PATH);
        assert_eq!(config.max_report_bytes, DEFAULT_MAX_REPORT_BYTES);
    }
}
