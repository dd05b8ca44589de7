//! Command-line configuration.
//!
//! The server reads no files and no environment variables; everything it can
//! be told comes from flags.

use crate::{DEFAULT_HOST, DEFAULT_PORT, VERSION};
use thiserror::Error;

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Log at DEBUG instead of INFO
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            verbose: false,
        }
    }
}

/// What the command line asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigAction {
    Run(Config),
    PrintHelp,
    PrintVersion,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} requires a value")]
    MissingValue(String),

    #[error("invalid port number: {0}")]
    InvalidPort(String),

    #[error("unknown argument: {0}")]
    UnknownArgument(String),
}

impl Config {
    /// Parses flags, not including the program name.
    pub fn parse_from<I>(args: I) -> Result<ConfigAction, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = Config::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--host" | "-h" => {
                    config.host = args.next().ok_or(ConfigError::MissingValue(arg))?;
                }
                "--port" | "-p" => {
                    let value = args.next().ok_or(ConfigError::MissingValue(arg))?;
                    config.port = value
                        .parse()
                        .map_err(|_| ConfigError::InvalidPort(value))?;
                }
                "--verbose" => config.verbose = true,
                "--help" => return Ok(ConfigAction::PrintHelp),
                "--version" | "-v" => return Ok(ConfigAction::PrintVersion),
                _ => return Err(ConfigError::UnknownArgument(arg)),
            }
        }

        Ok(ConfigAction::Run(config))
    }

    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub fn help_text() -> String {
    format!(
        r#"
kvlite {VERSION} - in-memory key-value server

USAGE:
    kvlite [OPTIONS]

OPTIONS:
    -h, --host <HOST>    Host to bind to (default: {DEFAULT_HOST})
    -p, --port <PORT>    Port to listen on (default: {DEFAULT_PORT})
        --verbose        Log at debug level
    -v, --version        Print version information
        --help           Print this help message

COMMANDS:
    PING
    ECHO <value>
    GET <key>
    SET <key> <value> [PX <milliseconds>]
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<ConfigAction, ConfigError> {
        Config::parse_from(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_defaults() {
        let action = parse(&[]).unwrap();
        let ConfigAction::Run(config) = &action else {
            panic!("expected Run, got {:?}", action);
        };
        assert_eq!(config.bind_address(), "0.0.0.0:6379");
        assert!(!config.verbose);
    }

    #[test]
    fn test_overrides() {
        let action = parse(&["--host", "127.0.0.1", "-p", "7000", "--verbose"]).unwrap();
        assert_eq!(
            action,
            ConfigAction::Run(Config {
                host: "127.0.0.1".to_string(),
                port: 7000,
                verbose: true,
            })
        );
    }

    #[test]
    fn test_help_and_version() {
        assert_eq!(parse(&["--help"]), Ok(ConfigAction::PrintHelp));
        assert_eq!(parse(&["-v"]), Ok(ConfigAction::PrintVersion));
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            parse(&["--port"]),
            Err(ConfigError::MissingValue("--port".to_string()))
        );
        assert_eq!(
            parse(&["--port", "70000"]),
            Err(ConfigError::InvalidPort("70000".to_string()))
        );
        assert_eq!(
            parse(&["--bogus"]),
            Err(ConfigError::UnknownArgument("--bogus".to_string()))
        );
    }
}
