//! Quill entrypoint.
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use core_config::{Config, load_from};
use core_encoding::TextEncoding;
use core_session::{FileTarget, FsStorage, LoadOutcome, SessionController};
use core_surface::{MemorySurface, TextSurface};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "quill", version, about = "Quill document sessions")]
struct Args {
    /// Optional configuration file path (overrides discovery of `quill.toml`).
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the detected encoding and line count of a file.
    Detect { path: PathBuf },
    /// Load a file and save it back through a session.
    Normalize { path: PathBuf },
    /// Append text as a user edit, then close the session.
    Append {
        path: PathBuf,
        text: String,
        /// Skip the save on close and report whether closing would prompt.
        /// A trailing-whitespace-only append is still written by the
        /// normalizing save, as is any edit when auto-save is on.
        #[arg(long)]
        no_save: bool,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Detect { .. } => "detect",
            Command::Normalize { .. } => "normalize",
            Command::Append { .. } => "append",
        }
    }
}

type CliSession = SessionController<FsStorage, MemorySurface>;

#[derive(Debug, Clone, PartialEq, Eq)]
struct DetectReport {
    /// `None` for rich documents.
    encoding: Option<TextEncoding>,
    lines: usize,
}

impl fmt::Display for DetectReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.encoding {
            Some(enc) => write!(f, "{enc}, {} lines", self.lines),
            None => write!(f, "rich text, {} lines", self.lines),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AppendReport {
    real_edit: bool,
    needs_prompt: bool,
    saved: bool,
}

impl fmt::Display for AppendReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let edit = if self.real_edit {
            "edit"
        } else {
            "no-op (trailing whitespace only)"
        };
        let outcome = match (self.saved, self.needs_prompt) {
            (true, _) => "saved",
            (false, true) => "unsaved, close would prompt",
            (false, false) => "clean",
        };
        write!(f, "{edit}; {outcome}")
    }
}

#[derive(Default)]
struct AppStartup {
    log_guard: Option<WorkerGuard>,
}

impl AppStartup {
    fn configure_logging(&mut self) -> Result<()> {
        let log_dir = Path::new(".");
        let log_path = log_dir.join("quill.log");
        if log_path.exists() {
            let _ = std::fs::remove_file(&log_path);
        }

        let file_appender = tracing_appender::rolling::never(log_dir, "quill.log");
        let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
        if tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(nb_writer)
            .try_init()
            .is_ok()
        {
            self.log_guard = Some(guard);
        }
        Ok(())
    }

    fn install_panic_hook() {
        static HOOK: Once = Once::new();
        HOOK.call_once(|| {
            let default_panic = std::panic::take_hook();
            std::panic::set_hook(Box::new(move |info| {
                tracing::error!(target: "runtime.panic", ?info, "panic");
                default_panic(info);
            }));
        });
    }
}

fn open_session(path: &Path, config: &Arc<Config>) -> Result<CliSession> {
    let session = SessionController::new(
        FileTarget::new(path),
        FsStorage::new(),
        MemorySurface::detached(),
        config.clone(),
        config,
    )?;
    Ok(session)
}

async fn load(session: &CliSession) -> Result<()> {
    let outcome = session
        .load()
        .await
        .with_context(|| format!("loading {}", session.target()))?;
    if outcome == LoadOutcome::Skipped {
        bail!("{} is busy", session.target());
    }
    Ok(())
}

async fn detect(path: &Path, config: &Arc<Config>) -> Result<DetectReport> {
    let session = open_session(path, config)?;
    load(&session).await?;
    let report = DetectReport {
        encoding: (!session.is_rich()).then(|| session.encoding()),
        lines: session.line_count(),
    };
    session.close().await?;
    Ok(report)
}

async fn normalize(path: &Path, config: &Arc<Config>) -> Result<()> {
    let session = open_session(path, config)?;
    load(&session).await?;
    session
        .save()
        .await
        .with_context(|| format!("saving {}", path.display()))?;
    session.close().await?;
    Ok(())
}

async fn append(
    path: &Path,
    text: &str,
    no_save: bool,
    config: &Arc<Config>,
) -> Result<AppendReport> {
    let session = open_session(path, config)?;
    load(&session).await?;
    let current = session.with_surface(|s| {
        s.append(text);
        s.text()
    });
    let real_edit = session.on_text_changed(&current).await;
    let needs_prompt = !session.prepare_close();
    if !no_save {
        session
            .close()
            .await
            .with_context(|| format!("closing {}", path.display()))?;
    }
    Ok(AppendReport {
        real_edit,
        needs_prompt,
        saved: session.saves_completed() > 0,
    })
}

async fn run(command: Command, config: &Arc<Config>) -> Result<String> {
    match command {
        Command::Detect { path } => Ok(detect(&path, config).await?.to_string()),
        Command::Normalize { path } => {
            normalize(&path, config).await?;
            Ok(format!("normalized {}", path.display()))
        }
        Command::Append {
            path,
            text,
            no_save,
        } => Ok(append(&path, &text, no_save, config).await?.to_string()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut startup = AppStartup::default();
    startup.configure_logging()?;
    AppStartup::install_panic_hook();

    let args = Args::parse();
    let config = Arc::new(load_from(args.config.clone())?);
    info!(
        target: "runtime",
        command = args.command.name(),
        config_override = args.config.is_some(),
        auto_save = config.auto_save(),
        "startup"
    );

    match run(args.command, &config).await {
        Ok(report) => {
            println!("{report}");
            Ok(())
        }
        Err(e) => {
            error!(target: "runtime", error = %e, "command_failed");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_encoding::EncodingKind;
    use pretty_assertions::assert_eq;

    fn config(auto_save: bool) -> Arc<Config> {
        let mut cfg = Config::default();
        cfg.file.session.auto_save = auto_save;
        cfg.resolve();
        Arc::new(cfg)
    }

    #[test]
    fn parses_append_flags() {
        let args =
            Args::try_parse_from(["quill", "append", "a.txt", "more", "--no-save"]).unwrap();
        match args.command {
            Command::Append {
                path,
                text,
                no_save,
            } => {
                assert_eq!(path, PathBuf::from("a.txt"));
                assert_eq!(text, "more");
                assert!(no_save);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn config_flag_is_global() {
        let args = Args::try_parse_from(["quill", "detect", "a.txt", "--config", "q.toml"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("q.toml")));
        assert_eq!(args.command.name(), "detect");
    }

    #[tokio::test]
    async fn detect_reports_encoding_and_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"\xEF\xBB\xBFone\ntwo\n").unwrap();

        let report = detect(&path, &config(false)).await.unwrap();
        assert_eq!(
            report.encoding,
            Some(TextEncoding::new(EncodingKind::Utf8, true))
        );
        assert_eq!(report.lines, 2);
        assert_eq!(report.to_string(), "utf-8 (bom), 2 lines");
    }

    #[tokio::test]
    async fn normalize_round_trips_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        let original = b"caf\xE9\r\n".to_vec();
        std::fs::write(&path, &original).unwrap();

        normalize(&path, &config(false)).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), original);
    }

    #[tokio::test]
    async fn append_saves_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "a").unwrap();

        let report = append(&path, "b", false, &config(false)).await.unwrap();
        assert_eq!(
            report,
            AppendReport {
                real_edit: true,
                needs_prompt: true,
                saved: true,
            }
        );
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "ab");
    }

    #[tokio::test]
    async fn append_without_save_leaves_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "a").unwrap();

        let report = append(&path, "b", true, &config(false)).await.unwrap();
        assert!(report.needs_prompt);
        assert_eq!(report.to_string(), "edit; unsaved, close would prompt");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a");
    }

    #[tokio::test]
    async fn trailing_whitespace_append_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "hello\n").unwrap();

        let report = append(&path, "   ", true, &config(false)).await.unwrap();
        assert!(!report.real_edit);
        assert!(!report.needs_prompt);
        assert!(report.saved);
        assert_eq!(report.to_string(), "no-op (trailing whitespace only); saved");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello\n   ");
    }

    #[tokio::test]
    async fn auto_saved_append_reports_the_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "a").unwrap();

        let report = append(&path, "b", true, &config(true)).await.unwrap();
        assert_eq!(
            report,
            AppendReport {
                real_edit: true,
                needs_prompt: false,
                saved: true,
            }
        );
        assert_eq!(report.to_string(), "edit; saved");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "ab");
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = detect(&dir.path().join("nope.txt"), &config(false))
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("loading"));
    }
}
