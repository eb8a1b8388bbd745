mod app;
mod embed;
mod host;
mod model;
mod msg;

use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

use anyhow::{Result, bail};
use clap::Parser;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing_subscriber::EnvFilter;

use app::App;
use model::config::AppConfig;
use msg::Msg;

/// Render lab notebook markdown to HTML, embedding marked images and plots.
#[derive(Debug, Parser)]
#[command(name = "workbook", version)]
struct Cli {
    /// Markdown file, or a directory of them
    path: PathBuf,

    /// Directory for rendered pages (default: next to each input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Extra configuration file, layered over the defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep running and re-render on change
    #[arg(long)]
    watch: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(output) = &cli.output {
        config.general.output_dir = output.to_string_lossy().into_owned();
    }

    // Initialize logging to file (never stdout)
    let log_dir = directories::ProjectDirs::from("", "", "workbook")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| std::path::PathBuf::from("/tmp"));
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "workbook.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(filter)
        .init();

    tracing::info!("workbook starting");

    let (tx, rx) = mpsc::channel::<Msg>();
    let mut app = App::new(config, tx.clone())?;

    if cli.watch {
        spawn_file_watcher(cli.path.clone(), tx.clone());
    }
    tx.send(Msg::RenderPath(cli.path.clone()))?;

    // ── Main event loop ──
    loop {
        // Batch-drain all pending messages
        let first = rx.recv()?;
        app.update(first);

        while let Ok(msg) = rx.try_recv() {
            app.update(msg);
        }

        for path in app.take_written() {
            println!("wrote {}", path.display());
        }

        if app.should_quit || (!cli.watch && app.is_idle()) {
            break;
        }
    }

    if app.failures() > 0 {
        bail!("{} page(s) failed to render; see the log in {}", app.failures(), log_dir.display());
    }

    Ok(())
}

fn spawn_file_watcher(path: PathBuf, tx: mpsc::Sender<Msg>) {
    thread::spawn(move || {
        let (target, mode) = if path.is_dir() {
            (path.clone(), RecursiveMode::Recursive)
        } else {
            // Editors often replace files on save; watch the directory.
            let parent = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map_or_else(|| PathBuf::from("."), PathBuf::from);
            (parent, RecursiveMode::NonRecursive)
        };

        let tx_watch = tx.clone();
        let mut watcher: RecommendedWatcher =
            match notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                        for path in event.paths {
                            if tx_watch.send(Msg::FileChanged(path)).is_err() {
                                return;
                            }
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!("file watcher error: {err}");
                }
            }) {
                Ok(w) => w,
                Err(err) => {
                    tracing::warn!("failed to initialize file watcher: {err}");
                    return;
                }
            };

        if let Err(err) = watcher.watch(&target, mode) {
            tracing::warn!("failed to watch {}: {err}", target.display());
            let _ = tx.send(Msg::Quit);
            return;
        }

        loop {
            thread::park();
        }
    });
}
