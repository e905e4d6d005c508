//! Runtime configuration from command-line flags, each backed by an
//! environment variable.

use clap::{Parser, ValueEnum};
use labelscan_ocr::PreprocessMode;
use std::net::{IpAddr, SocketAddr};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    #[value(alias = "text")]
    Pretty,
    /// Bunyan-style JSON lines.
    #[value(alias = "bunyan")]
    Json,
}

/// Label scanning OCR service.
///
/// ```bash
/// labelscan-server --port 5001
/// PORT=5001 SCAN_PREPROCESS=baseline labelscan-server
/// ```
#[derive(Debug, Clone, Parser)]
#[command(name = "labelscan-server", version, about, long_about = None)]
pub struct ServerConfig {
    /// Address to bind to.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    #[arg(short = 'p', long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Largest accepted request body, in bytes.
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,

    /// `full` or `baseline`.
    #[arg(long = "preprocess", env = "SCAN_PREPROCESS", default_value = "full")]
    pub preprocess_mode: PreprocessMode,

    /// Directory holding Tesseract `*.traineddata` files; engine default when unset.
    #[arg(long, env = "TESSDATA_PREFIX")]
    pub tessdata: Option<String>,

    #[arg(long, env = "OCR_LANG", default_value = "eng")]
    pub ocr_lang: String,

    #[arg(long, env = "LOG_FORMAT", value_enum, ignore_case = true, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Result<ServerConfig, clap::Error> {
        ServerConfig::try_parse_from(std::iter::once("labelscan-server").chain(args.iter().copied()))
    }

    #[test]
    fn command_definition_is_valid() {
        ServerConfig::command().debug_assert();
    }

    #[test]
    fn defaults_use_canonical_pipeline() {
        let c = parse(&["--host", "0.0.0.0", "--port", "8080"]).unwrap();
        assert_eq!(c.socket_addr().to_string(), "0.0.0.0:8080");
        assert_eq!(c.preprocess_mode, PreprocessMode::Full);
        assert_eq!(c.ocr_lang, "eng");
        assert_eq!(c.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert!(c.tessdata.is_none());
    }

    #[test]
    fn host_and_port_flags() {
        let c = parse(&["--host", "127.0.0.1", "-p", "5001"]).unwrap();
        assert_eq!(c.socket_addr().to_string(), "127.0.0.1:5001");
    }

    #[test]
    fn invalid_port_is_an_error() {
        assert!(parse(&["--port", "eighty"]).is_err());
        assert!(parse(&["--port", "70000"]).is_err());
        assert!(parse(&["--host", "not-an-ip"]).is_err());
    }

    #[test]
    fn preprocess_and_log_format() {
        let c = parse(&["--preprocess", "baseline", "--log-format", "JSON"]).unwrap();
        assert_eq!(c.preprocess_mode, PreprocessMode::Baseline);
        assert_eq!(c.log_format, LogFormat::Json);

        let c = parse(&["--log-format", "bunyan"]).unwrap();
        assert_eq!(c.log_format, LogFormat::Json);

        assert!(parse(&["--log-format", "xml"]).is_err());
        assert!(parse(&["--preprocess", "fast"]).is_err());
    }

    #[test]
    fn tesseract_settings() {
        let c = parse(&["--tessdata", "/usr/share/tessdata", "--ocr-lang", "deu"]).unwrap();
        assert_eq!(c.tessdata.as_deref(), Some("/usr/share/tessdata"));
        assert_eq!(c.ocr_lang, "deu");
    }
}
