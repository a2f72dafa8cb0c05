//! `seqfetch` command line: read URLs one per line, download them all at once,
//! write the bodies to the output in input order.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tracing_subscriber::EnvFilter;

use seqfetch::{Chain, Config, HttpFetcher, TaskSource, cancel_on_signal};

#[derive(Debug, Parser)]
#[command(name = "seqfetch")]
#[command(version)]
#[command(
    about = "Download URLs concurrently and write their bodies in input order",
    long_about = None
)]
struct Cli {
    /// JSON configuration file; flags below override its values
    #[arg(short, long, env = "SEQFETCH_CONFIG")]
    config: Option<PathBuf>,

    /// Read URLs from this file instead of stdin
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Write output to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// How long a download waits for its turn before buffering, in milliseconds
    #[arg(long, env = "SEQFETCH_HANDOFF_WAIT_MS")]
    handoff_wait_ms: Option<u64>,

    /// Connect timeout in seconds
    #[arg(long)]
    connect_timeout: Option<u64>,

    /// Whole-request timeout in seconds (unset: no limit)
    #[arg(long)]
    request_timeout: Option<u64>,
}

impl Cli {
    fn load_config(&self) -> seqfetch::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        if let Some(ms) = self.handoff_wait_ms {
            config.sequencer.handoff_wait_ms = ms;
        }
        if let Some(secs) = self.connect_timeout {
            config.http.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.request_timeout {
            config.http.request_timeout = Some(Duration::from_secs(secs));
        }
        config.validate()?;
        Ok(config)
    }
}

type Sink = Box<dyn AsyncWrite + Unpin + Send>;
type Input = Box<dyn AsyncBufRead + Unpin + Send>;

async fn open_output(path: Option<&PathBuf>) -> seqfetch::Result<Sink> {
    Ok(match path {
        Some(path) => Box::new(tokio::fs::File::create(path).await.map_err(|e| {
            seqfetch::Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to create output file '{}': {}", path.display(), e),
            ))
        })?),
        None => Box::new(tokio::io::stdout()),
    })
}

async fn open_input(path: Option<&PathBuf>) -> seqfetch::Result<Input> {
    Ok(match path {
        Some(path) => Box::new(BufReader::new(tokio::fs::File::open(path).await.map_err(
            |e| {
                seqfetch::Error::Input(std::io::Error::new(
                    e.kind(),
                    format!("failed to open input file '{}': {}", path.display(), e),
                ))
            },
        )?)),
        None => Box::new(BufReader::new(tokio::io::stdin())),
    })
}

async fn run(cli: Cli) -> seqfetch::Result<()> {
    let config = cli.load_config()?;
    let fetcher = Arc::new(HttpFetcher::new(&config.http)?);
    let sink = open_output(cli.output.as_ref()).await?;
    let mut source = TaskSource::new(open_input(cli.input.as_ref()).await?);

    let chain = Chain::new(sink, fetcher, &config.sequencer);
    tokio::spawn(cancel_on_signal(chain.cancellation_token()));

    let completed = chain.run(&mut source).await?;
    tracing::info!(
        tasks = completed.tasks,
        bytes = completed.bytes_written,
        "done"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // stdout may be the sink, so diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let result = run(cli).await;
    if let Err(e) = &result {
        eprintln!("error: {e}");
    }
    ExitCode::from(exit_status(&result))
}

/// 0 on full success, 1 on any task, input or setup failure
fn exit_status(result: &seqfetch::Result<()>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("seqfetch").chain(args.iter().copied())).unwrap()
    }

    fn config_file(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("seqfetch.json");
        std::fs::write(
            &path,
            r#"{
                "sequencer": { "handoff_wait_ms": 250 },
                "http": { "connect_timeout": 7, "request_timeout": 20 }
            }"#,
        )
        .unwrap();
        path
    }

    #[test]
    fn flags_override_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = config_file(&dir);
        let cli = parse(&[
            "--config",
            path.to_str().unwrap(),
            "--handoff-wait-ms",
            "40",
            "--connect-timeout",
            "3",
        ]);

        let config = cli.load_config().unwrap();
        assert_eq!(config.sequencer.handoff_wait_ms, 40);
        assert_eq!(config.http.connect_timeout, Duration::from_secs(3));
        // Not given on the command line, so the file wins.
        assert_eq!(config.http.request_timeout, Some(Duration::from_secs(20)));
    }

    #[test]
    fn file_values_apply_without_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = config_file(&dir);

        let config = parse(&["-c", path.to_str().unwrap()]).load_config().unwrap();
        assert_eq!(config.sequencer.handoff_wait_ms, 250);
        assert_eq!(config.http.connect_timeout, Duration::from_secs(7));
    }

    #[test]
    fn zero_handoff_wait_flag_is_rejected() {
        let err = parse(&["--handoff-wait-ms", "0"]).load_config().unwrap_err();
        assert_eq!(err.error_code(), "config_error");
    }

    #[tokio::test]
    async fn run_reports_failing_task_position() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("urls.txt");
        let output = dir.path().join("out.bin");
        std::fs::write(&input, format!("{}/missing\n", server.uri())).unwrap();

        let cli = parse(&[
            "-i",
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "--handoff-wait-ms",
            "50",
        ]);

        let result = run(cli).await;
        assert_eq!(exit_status(&result), 1);
        match result {
            Err(seqfetch::Error::Task { index, source, .. }) => {
                assert_eq!(index, 0);
                assert_eq!(source.error_code(), "bad_status");
            }
            other => panic!("expected task failure, got {other:?}"),
        }
        assert!(std::fs::read(&output).unwrap().is_empty());
    }

    #[tokio::test]
    async fn run_writes_bodies_to_output_file() {
        let server = MockServer::start().await;
        for (route, body) in [("/1", "one "), ("/2", "two")] {
            Mock::given(method("GET"))
                .and(path(route))
                .respond_with(ResponseTemplate::new(200).set_body_string(body))
                .mount(&server)
                .await;
        }

        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("urls.txt");
        let output = dir.path().join("out.txt");
        std::fs::write(&input, format!("{0}/1\n{0}/2\n", server.uri())).unwrap();

        let cli = parse(&["-i", input.to_str().unwrap(), "-o", output.to_str().unwrap()]);
        assert_eq!(exit_status(&run(cli).await), 0);

        assert_eq!(std::fs::read_to_string(&output).unwrap(), "one two");
    }
}
