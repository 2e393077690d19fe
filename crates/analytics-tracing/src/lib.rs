use std::{fs::File, path::PathBuf, sync::Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// `RUST_LOG` wins; `default_filter` applies when it is unset or invalid.
fn init_env_layer(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into())
}

pub fn init_tracing_to_stdout(default_filter: &str) {
    let env_layer = init_env_layer(default_filter);

    let stdout_layer = tracing_subscriber::fmt::layer().with_ansi(true);

    tracing_subscriber::registry()
        .with(env_layer)
        .with(stdout_layer)
        .init();
}

fn create_log_file(log_dir: &PathBuf) -> std::io::Result<File> {
    std::fs::create_dir_all(log_dir)?;
    File::create(log_dir.join("app.log"))
}

/// Logs to `<log_dir>/app.log`, falling back to stdout if the file cannot be created.
pub fn init_tracing_to_file(log_dir: PathBuf, default_filter: &str) {
    let file = match create_log_file(&log_dir) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Failed to create log file in {}: {}", log_dir.display(), e);
            init_tracing_to_stdout(default_filter); // fallback to stdout tracing
            return;
        }
    };

    let env_layer = init_env_layer(default_filter);

    let file_log_layer = tracing_subscriber::fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_layer)
        .with(file_log_layer)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    // installs the global subscriber, keep it the only test in this crate
    #[test]
    fn file_logging_writes_app_log() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs");

        init_tracing_to_file(log_dir.clone(), "info");
        tracing::error!("caption service failed to start");

        let content = std::fs::read_to_string(log_dir.join("app.log")).unwrap();
        assert!(content.contains("caption service failed to start"));
    }
}
