use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

use crate::backends::{gemini, openai, DEFAULT_MODEL_TIMEOUT};
use crate::pipeline::answer::DEFAULT_MAX_CONTEXT_CHARS;
use crate::utils::document_fetch::DEFAULT_FETCH_TIMEOUT;
use crate::utils::relevance::KeywordTable;

/// Process-wide configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub api_token: Option<String>,
    pub keywords_file: Option<PathBuf>,
    pub fetch_timeout: Duration,
    pub model_timeout: Duration,
    /// Policy text beyond this many characters is cut before prompting
    pub max_context_chars: usize,
    pub quiet: bool,
}

pub fn command() -> Command {
    Command::new("policy-qa")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Answers questions about insurance policy PDFs")
        .long_about(
            "HTTP service that downloads an insurance policy PDF and answers\n\
            questions about it with OpenAI, falling back to Gemini.\n\
            Endpoints:\n\
            - POST /hackrx/run: answer questions about a policy document\n\
            - GET /health: service and backend status\n\
            - POST /webhook/railway, /webhook/generic: event acknowledgement",
        )
        .arg(
            Arg::new("host")
                .long("host")
                .env("HOST")
                .value_name("ADDR")
                .default_value("0.0.0.0")
                .help("Address to bind"),
        )
        .arg(
            Arg::new("port")
                .long("port")
                .env("PORT")
                .value_name("PORT")
                .default_value("8000")
                .value_parser(value_parser!(u16))
                .help("Port to listen on"),
        )
        .arg(
            Arg::new("openai-api-key")
                .long("openai-api-key")
                .env("OPENAI_API_KEY")
                .hide_env_values(true)
                .value_name("KEY")
                .help("OpenAI API key (primary backend)"),
        )
        .arg(
            Arg::new("openai-model")
                .long("openai-model")
                .env("OPENAI_MODEL")
                .value_name("MODEL")
                .default_value(openai::DEFAULT_MODEL)
                .help("OpenAI chat model"),
        )
        .arg(
            Arg::new("gemini-api-key")
                .long("gemini-api-key")
                .env("GEMINI_API_KEY")
                .hide_env_values(true)
                .value_name("KEY")
                .help("Gemini API key (fallback backend)"),
        )
        .arg(
            Arg::new("gemini-model")
                .long("gemini-model")
                .env("GEMINI_MODEL")
                .value_name("MODEL")
                .default_value(gemini::DEFAULT_MODEL)
                .help("Gemini model"),
        )
        .arg(
            Arg::new("api-token")
                .long("api-token")
                .env("HACKRX_API_TOKEN")
                .hide_env_values(true)
                .value_name("TOKEN")
                .help("Required Bearer token; any token is accepted when unset"),
        )
        .arg(
            Arg::new("keywords-file")
                .long("keywords-file")
                .env("KEYWORDS_FILE")
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .help("JSON keyword table replacing the built-in one"),
        )
        .arg(
            Arg::new("fetch-timeout")
                .long("fetch-timeout")
                .env("FETCH_TIMEOUT_SECS")
                .value_name("SECS")
                .default_value("15")
                .value_parser(value_parser!(u64))
                .help("Timeout for downloading the policy document"),
        )
        .arg(
            Arg::new("model-timeout")
                .long("model-timeout")
                .env("MODEL_TIMEOUT_SECS")
                .value_name("SECS")
                .default_value("30")
                .value_parser(value_parser!(u64))
                .help("Timeout for each model call"),
        )
        .arg(
            Arg::new("max-context-chars")
                .long("max-context-chars")
                .env("MAX_CONTEXT_CHARS")
                .value_name("CHARS")
                .default_value("100000")
                .value_parser(value_parser!(usize))
                .help("Maximum policy characters sent to a model per question"),
        )
        .arg(
            Arg::new("quiet")
                .long("quiet")
                .short('q')
                .help("Only log errors")
                .action(ArgAction::SetTrue),
        )
}

impl Settings {
    pub fn from_matches(matches: &ArgMatches) -> Self {
        let string = |id: &str| {
            matches
                .get_one::<String>(id)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        let secs = |id: &str, default: Duration| {
            matches
                .get_one::<u64>(id)
                .map(|s| Duration::from_secs(*s))
                .unwrap_or(default)
        };

        Self {
            host: string("host").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: matches.get_one::<u16>("port").copied().unwrap_or(8000),
            openai_api_key: string("openai-api-key"),
            openai_model: string("openai-model")
                .unwrap_or_else(|| openai::DEFAULT_MODEL.to_string()),
            gemini_api_key: string("gemini-api-key"),
            gemini_model: string("gemini-model")
                .unwrap_or_else(|| gemini::DEFAULT_MODEL.to_string()),
            api_token: string("api-token"),
            keywords_file: matches.get_one::<PathBuf>("keywords-file").cloned(),
            fetch_timeout: secs("fetch-timeout", DEFAULT_FETCH_TIMEOUT),
            model_timeout: secs("model-timeout", DEFAULT_MODEL_TIMEOUT),
            max_context_chars: matches
                .get_one::<usize>("max-context-chars")
                .copied()
                .unwrap_or(DEFAULT_MAX_CONTEXT_CHARS),
            quiet: matches.get_flag("quiet"),
        }
    }

    /// Resolves `host` and `port`. IPv6 hosts may be given with or without brackets.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let host = self.host.trim_start_matches('[').trim_end_matches(']');
        (host, self.port)
            .to_socket_addrs()
            .with_context(|| format!("invalid bind address {} port {}", self.host, self.port))?
            .next()
            .with_context(|| format!("no address found for {}", self.host))
    }

    /// The configured keyword table, or the built-in one.
    pub fn keyword_table(&self) -> Result<KeywordTable> {
        match &self.keywords_file {
            Some(path) => KeywordTable::from_json_file(path)
                .with_context(|| format!("loading keywords from {}", path.display())),
            None => Ok(KeywordTable::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(args: &[&str]) -> Settings {
        let mut argv = vec!["policy-qa"];
        argv.extend_from_slice(args);
        Settings::from_matches(&command().get_matches_from(argv))
    }

    #[test]
    fn flags_override_defaults() {
        let settings = parse(&[
            "--host",
            "127.0.0.1",
            "--port",
            "9100",
            "--openai-model",
            "gpt-4o",
            "--api-token",
            "secret",
            "--fetch-timeout",
            "5",
            "-q",
        ]);
        assert_eq!(settings.host, "127.0.0.1");
        assert_eq!(settings.port, 9100);
        assert_eq!(settings.openai_model, "gpt-4o");
        assert_eq!(settings.api_token.as_deref(), Some("secret"));
        assert_eq!(settings.fetch_timeout, Duration::from_secs(5));
        assert!(settings.quiet);
        assert_eq!(settings.max_context_chars, DEFAULT_MAX_CONTEXT_CHARS);
        assert_eq!(
            settings.bind_addr().unwrap(),
            "127.0.0.1:9100".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn ipv6_hosts_bind() {
        let expected = "[::]:8080".parse::<SocketAddr>().unwrap();
        for host in ["::", "[::]"] {
            let settings = parse(&["--host", host, "--port", "8080"]);
            assert_eq!(settings.bind_addr().unwrap(), expected);
        }
    }

    #[test]
    fn context_cap_is_configurable() {
        let settings = parse(&["--max-context-chars", "2500"]);
        assert_eq!(settings.max_context_chars, 2500);
    }

    #[test]
    fn blank_keys_count_as_unset() {
        let settings = parse(&["--openai-api-key", "  ", "--gemini-api-key", ""]);
        assert!(settings.openai_api_key.is_none());
        assert!(settings.gemini_api_key.is_none());
    }

    #[test]
    fn keyword_file_replaces_builtin_table() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"topic": "deductible", "keywords": ["deductible"]}}]"#
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let table = parse(&["--keywords-file", &path]).keyword_table().unwrap();
        assert_eq!(table.clusters().len(), 1);
        assert_eq!(table.keywords_for("What is the deductible?"), vec!["deductible"]);
    }

    #[test]
    fn missing_keyword_file_is_an_error() {
        let settings = parse(&["--keywords-file", "/nonexistent/keywords.json"]);
        assert!(settings.keyword_table().is_err());
    }
}
