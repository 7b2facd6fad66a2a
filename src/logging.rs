use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "tether=info";
const VERBOSE_LOG_FILTER: &str = "tether=debug";
const LOG_FILE_NAME: &str = "tether.log";

fn env_filter(verbose: bool) -> EnvFilter {
    if verbose {
        return EnvFilter::new(VERBOSE_LOG_FILTER);
    }
    for var in ["TETHER_LOG", "RUST_LOG"] {
        if let Ok(raw) = std::env::var(var)
            && !raw.trim().is_empty()
            && let Ok(filter) = EnvFilter::try_new(raw.trim())
        {
            return filter;
        }
    }
    EnvFilter::new(DEFAULT_LOG_FILTER)
}

#[derive(Clone)]
struct SharedFileWriter {
    inner: Arc<Mutex<File>>,
}

struct SharedFileWriterGuard {
    inner: Arc<Mutex<File>>,
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedFileWriter {
    type Writer = SharedFileWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedFileWriterGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for SharedFileWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut file = self
            .inner
            .lock()
            .map_err(|_| io::Error::other("log writer lock poisoned"))?;
        file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut file = self
            .inner
            .lock()
            .map_err(|_| io::Error::other("log writer lock poisoned"))?;
        file.flush()
    }
}

fn open_log_file(logs_dir: &Path) -> io::Result<SharedFileWriter> {
    fs::create_dir_all(logs_dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(logs_dir.join(LOG_FILE_NAME))?;
    Ok(SharedFileWriter {
        inner: Arc::new(Mutex::new(file)),
    })
}

/// Install the global subscriber: stderr plus `<logs_dir>/tether.log`.
/// When the log file cannot be opened, logging continues on stderr only.
pub fn init(logs_dir: &Path, verbose: bool) {
    match open_log_file(logs_dir) {
        Ok(writer) => {
            let _ = tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_filter(env_filter(verbose)),
                )
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(io::stderr)
                        .with_target(false)
                        .with_filter(env_filter(verbose)),
                )
                .try_init();
        }
        Err(err) => {
            let _ = tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(io::stderr)
                        .with_target(false)
                        .with_filter(env_filter(verbose)),
                )
                .try_init();
            tracing::warn!(
                logs_dir = %logs_dir.display(),
                error = %err,
                "log file unavailable; logging to stderr only"
            );
        }
    }
}
