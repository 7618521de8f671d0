use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

#[derive(Parser)]
#[command(name = "codeservice")]
#[command(version)]
#[command(about = "Ask a hosted code-service function a question and print its markdown answer")]
pub struct Args {
    /// Text to send. Without it, lines are read from stdin as a chat.
    pub prompt: Option<String>,

    /// Print the answer as it streams in instead of waiting for the full body
    #[arg(long, short)]
    pub stream: bool,

    /// TOML config file; environment variables override its values
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// JSON file holding the cached credential and chat history
    #[arg(long, default_value = ".codeservice.json")]
    pub store: PathBuf,

    /// Keep nothing on disk for this run
    #[arg(long, conflicts_with = "store")]
    pub ephemeral: bool,

    /// Deadline in seconds for each request (overrides REQUEST_TIMEOUT_SECS)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// HTTP method used for submissions (default POST, or the config file's)
    #[arg(long)]
    pub method: Option<String>,

    /// Print the persisted chat history and exit
    #[arg(long)]
    pub history: bool,

    /// Log at debug level (RUST_LOG still takes precedence)
    #[arg(long, short)]
    pub verbose: bool,
}

impl Args {
    /// Deadline requested on the command line. Zero disables it.
    pub fn deadline(&self) -> Option<Option<Duration>> {
        self.timeout
            .map(|secs| if secs == 0 { None } else { Some(Duration::from_secs(secs)) })
    }
}

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter(verbose: bool) -> &'static str {
    if verbose {
        "codeservice_client=debug,codeservice=debug"
    } else {
        "warn"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse_minimal() {
        let args = Args::parse_from(["codeservice", "hello world"]);
        assert_eq!(args.prompt.as_deref(), Some("hello world"));
        assert!(!args.stream);
        assert!(args.config.is_none());
        assert_eq!(args.store, PathBuf::from(".codeservice.json"));
        assert!(!args.ephemeral);
        assert!(args.method.is_none());
        assert!(!args.history);
        assert!(!args.verbose);
        assert!(args.deadline().is_none());
    }

    #[test]
    fn test_args_no_prompt_is_chat_mode() {
        let args = Args::parse_from(["codeservice"]);
        assert!(args.prompt.is_none());
    }

    #[test]
    fn test_args_parse_full() {
        let args = Args::parse_from([
            "codeservice",
            "question",
            "--stream",
            "--config",
            "svc.toml",
            "--store",
            "/tmp/s.json",
            "--timeout",
            "30",
            "--method",
            "put",
            "--verbose",
        ]);
        assert!(args.stream);
        assert_eq!(args.config, Some(PathBuf::from("svc.toml")));
        assert_eq!(args.store, PathBuf::from("/tmp/s.json"));
        assert_eq!(args.deadline(), Some(Some(Duration::from_secs(30))));
        assert_eq!(args.method.as_deref(), Some("put"));
        assert!(args.verbose);
    }

    #[test]
    fn test_args_short_flags() {
        let args = Args::parse_from(["codeservice", "q", "-s", "-v", "-c", "a.toml"]);
        assert!(args.stream);
        assert!(args.verbose);
        assert_eq!(args.config, Some(PathBuf::from("a.toml")));
    }

    #[test]
    fn test_zero_timeout_disables_deadline() {
        let args = Args::parse_from(["codeservice", "q", "--timeout", "0"]);
        assert_eq!(args.deadline(), Some(None));
    }

    #[test]
    fn test_ephemeral_conflicts_with_store() {
        let res = Args::try_parse_from(["codeservice", "q", "--ephemeral", "--store", "x.json"]);
        assert!(res.is_err());
    }

    #[test]
    fn test_history_flag() {
        let args = Args::parse_from(["codeservice", "--history"]);
        assert!(args.history);
    }

    #[test]
    fn test_default_log_filter() {
        assert_eq!(default_log_filter(false), "warn");
        assert!(default_log_filter(true).contains("debug"));
    }
}
