use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// HTTP Latency Bench - measure and rank endpoint response times
#[derive(Parser, Debug, Clone)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// URLs to benchmark, in order (invalid entries are skipped)
    #[clap(help_heading = "Core Options")]
    pub urls: Vec<String>,

    /// JSON project file with "urls" and an optional "output_dir"
    #[clap(short = 'p', long, help_heading = "Core Options")]
    pub project: Option<PathBuf>,

    /// Root directory for run outputs (overrides the project file)
    #[clap(short = 'o', long, help_heading = "Core Options")]
    pub output_dir: Option<PathBuf>,

    /// Measured requests per URL
    #[clap(short = 'n', long, default_value_t = crate::defaults::ATTEMPT_COUNT)]
    pub attempts: usize,

    /// Maximum simultaneous requests per URL
    #[clap(short = 'c', long, default_value_t = crate::defaults::CONCURRENCY)]
    pub concurrency: usize,

    /// Maximum number of warmup requests per URL
    #[clap(long, default_value_t = crate::defaults::WARMUP_MAX)]
    pub warmup_max: usize,

    /// Warmup requests that must complete before warmup may stop early
    #[clap(long, default_value_t = crate::defaults::WARMUP_MIN)]
    pub warmup_min: usize,

    /// Per-request timeout (e.g. "500ms", "30s", "2m")
    #[clap(short = 't', long, value_parser = parse_duration, default_value = "100s")]
    pub timeout: Duration,

    /// Count 4xx and 5xx responses as failed requests
    #[clap(long, default_value_t = false)]
    pub fail_on_error_status: bool,

    /// Skip writing histogram files
    #[clap(long, default_value_t = false)]
    pub no_histograms: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[clap(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[clap(short = 'q', long, default_value_t = false, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Also write logs to this file
    #[clap(long)]
    pub log_file: Option<PathBuf>,
}

impl Default for Args {
    /// Same values as the command line defaults.
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            project: None,
            output_dir: None,
            attempts: crate::defaults::ATTEMPT_COUNT,
            concurrency: crate::defaults::CONCURRENCY,
            warmup_max: crate::defaults::WARMUP_MAX,
            warmup_min: crate::defaults::WARMUP_MIN,
            timeout: crate::defaults::REQUEST_TIMEOUT,
            fail_on_error_status: false,
            no_histograms: false,
            verbose: 0,
            quiet: false,
            log_file: None,
        }
    }
}

impl Args {
    /// Default log filter directive derived from `-v`/`-q`.
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "warn";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// On-disk project description.
///
/// Both `snake_case` and the `PascalCase`/`camelCase` spellings used by
/// existing project files are accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectFile {
    #[serde(default, alias = "Urls")]
    pub urls: Vec<String>,

    #[serde(default, alias = "OutputDir", alias = "outputDir")]
    pub output_dir: Option<PathBuf>,
}

impl ProjectFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read project file {:?}", path))?;
        let project: ProjectFile = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse project file {:?}", path))?;
        Ok(project)
    }
}

/// URLs and output root after merging CLI arguments with a project file
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedProject {
    pub urls: Vec<String>,
    pub output_root: PathBuf,
}

impl ResolvedProject {
    /// Project file URLs come first, then positional ones. The CLI output
    /// directory wins over the project file's.
    pub fn resolve(args: &Args, project: Option<ProjectFile>) -> Self {
        let project = project.unwrap_or_default();
        let mut urls = project.urls;
        urls.extend(args.urls.iter().cloned());

        let output_root = args
            .output_dir
            .clone()
            .or(project.output_dir)
            .unwrap_or_else(|| PathBuf::from(crate::defaults::OUTPUT_ROOT));

        Self { urls, output_root }
    }
}

/// Parse duration from string (e.g., "500ms", "10s", "5m", "1h")
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Duration cannot be empty".to_string());
    }

    let (num_str, unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, "m")
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, "h")
    } else {
        (s, "s")
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number in duration: {}", num_str))?;
    if !num.is_finite() || num <= 0.0 {
        return Err(format!("Duration must be positive: {}", s));
    }

    let seconds = match unit {
        "ms" => num / 1_000.0,
        "s" => num,
        "m" => num * 60.0,
        "h" => num * 3_600.0,
        _ => return Err(format!("Invalid duration unit: {}", unit)),
    };

    Ok(Duration::from_secs_f64(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("10").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));

        assert!(parse_duration("").is_err());
        assert!(parse_duration("invalid").is_err());
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("-3s").is_err());
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["http-latency-bench", "https://example.com/"]);
        assert_eq!(args.urls, vec!["https://example.com/"]);
        assert_eq!(args.attempts, crate::defaults::ATTEMPT_COUNT);
        assert_eq!(args.concurrency, crate::defaults::CONCURRENCY);
        assert_eq!(args.warmup_max, crate::defaults::WARMUP_MAX);
        assert_eq!(args.warmup_min, crate::defaults::WARMUP_MIN);
        assert_eq!(args.timeout, crate::defaults::REQUEST_TIMEOUT);
        assert_eq!(args.log_level(), "info");
    }

    #[test]
    fn test_default_matches_command_line() {
        let parsed = Args::parse_from(["http-latency-bench"]);
        let default = Args::default();
        assert_eq!(default.attempts, parsed.attempts);
        assert_eq!(default.concurrency, parsed.concurrency);
        assert_eq!(default.warmup_max, parsed.warmup_max);
        assert_eq!(default.warmup_min, parsed.warmup_min);
        assert_eq!(default.timeout, parsed.timeout);
        assert_eq!(default.log_level(), parsed.log_level());
        assert!(crate::BenchmarkConfig::from_args(&default).is_ok());
    }

    #[test]
    fn test_args_verbosity() {
        let args = Args::parse_from(["http-latency-bench", "-vv"]);
        assert_eq!(args.log_level(), "trace");
        let args = Args::parse_from(["http-latency-bench", "-q"]);
        assert_eq!(args.log_level(), "warn");
        assert!(Args::try_parse_from(["http-latency-bench", "-q", "-v"]).is_err());
    }

    #[test]
    fn test_project_file_aliases() {
        let pascal: ProjectFile =
            serde_json::from_str(r#"{"Urls": ["https://a.test/"], "OutputDir": "/tmp/x"}"#).unwrap();
        assert_eq!(pascal.urls, vec!["https://a.test/"]);
        assert_eq!(pascal.output_dir, Some(PathBuf::from("/tmp/x")));

        let snake: ProjectFile = serde_json::from_str(r#"{"urls": []}"#).unwrap();
        assert!(snake.urls.is_empty());
        assert!(snake.output_dir.is_none());
    }

    #[test]
    fn test_project_file_load() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"urls": ["https://a.test/", "not a url"]}}"#).unwrap();
        let project = ProjectFile::load(file.path()).unwrap();
        assert_eq!(project.urls.len(), 2);

        let mut broken = NamedTempFile::new().unwrap();
        writeln!(broken, "{{").unwrap();
        assert!(ProjectFile::load(broken.path()).is_err());
    }

    #[test]
    fn test_resolve_project() {
        let args = Args::parse_from(["http-latency-bench", "https://cli.test/"]);
        let project = ProjectFile {
            urls: vec!["https://file.test/".to_string()],
            output_dir: Some(PathBuf::from("/data/out")),
        };
        let resolved = ResolvedProject::resolve(&args, Some(project.clone()));
        assert_eq!(resolved.urls, vec!["https://file.test/", "https://cli.test/"]);
        assert_eq!(resolved.output_root, PathBuf::from("/data/out"));

        let args = Args::parse_from(["http-latency-bench", "-o", "/override"]);
        let resolved = ResolvedProject::resolve(&args, Some(project));
        assert_eq!(resolved.output_root, PathBuf::from("/override"));

        let resolved = ResolvedProject::resolve(&Args::default(), None);
        assert_eq!(
            resolved.output_root,
            PathBuf::from(crate::defaults::OUTPUT_ROOT)
        );
    }
}
