use anyhow::Result;
use log::LevelFilter;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const FILE_PREFIX: &str = "terminal-";
const FILE_SUFFIX: &str = ".log";

/// Where and how much the terminal logs.
#[derive(Debug, Clone, PartialEq)]
pub struct LogSettings {
    pub dir: PathBuf,
    pub level: String,
    /// Log files retained per directory, the one opened at startup included.
    pub keep: usize,
}

/// Stdout plus a timestamped file under `settings.dir`. Returns the file path.
pub fn setup_logging(settings: &LogSettings) -> Result<PathBuf> {
    fs::create_dir_all(&settings.dir)?;
    let pruned = prune_logs(&settings.dir, settings.keep.saturating_sub(1))?;

    let path = settings.dir.join(file_name(chrono::Local::now()));
    let level = LevelFilter::from_str(&settings.level).ok();

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} {:<5} {}: {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level.unwrap_or(LevelFilter::Info))
        // Connection pool and frame chatter
        .level_for("hyper_util", LevelFilter::Info)
        .level_for("tungstenite", LevelFilter::Info)
        .chain(std::io::stdout())
        .chain(fern::log_file(&path)?)
        .apply()?;

    if level.is_none() {
        log::warn!("Unknown log level '{}', using info.", settings.level);
    }
    log::info!("Logging to {} ({} older file(s) removed).", path.display(), pruned);
    Ok(path)
}

fn file_name(at: chrono::DateTime<chrono::Local>) -> String {
    format!("{}{}{}", FILE_PREFIX, at.format("%Y%m%d-%H%M%S"), FILE_SUFFIX)
}

/// Deletes all but the `keep` newest terminal logs in `dir`. Timestamped
/// names sort chronologically; files not written by the terminal are untouched.
fn prune_logs(dir: &Path, keep: usize) -> Result<usize> {
    let mut ours: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX))
        })
        .collect();
    ours.sort();

    let excess = ours.len().saturating_sub(keep);
    let mut removed = 0;
    for path in &ours[..excess] {
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => eprintln!("Cannot remove old log {}: {}", path.display(), e),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn names(dir: &Path) -> Vec<String> {
        let mut left: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        left.sort();
        left
    }

    #[test]
    fn test_file_names_sort_by_time() {
        let earlier = chrono::Local.with_ymd_and_hms(2026, 1, 9, 23, 59, 59).unwrap();
        let later = chrono::Local.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap();
        assert_eq!(file_name(earlier), "terminal-20260109-235959.log");
        assert!(file_name(earlier) < file_name(later));
    }

    #[test]
    fn test_prune_keeps_newest_terminal_logs() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "terminal-20260101-000000.log",
            "terminal-20260102-000000.log",
            "terminal-20260103-000000.log",
            "terminal-20260104-000000.log",
            "other.log",
            "terminal-notes.txt",
        ] {
            fs::write(dir.path().join(name), name).unwrap();
        }

        assert_eq!(prune_logs(dir.path(), 2).unwrap(), 2);
        assert_eq!(
            names(dir.path()),
            ["other.log", "terminal-20260103-000000.log", "terminal-20260104-000000.log", "terminal-notes.txt"]
        );
    }

    #[test]
    fn test_prune_with_zero_keep_clears_terminal_logs() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("terminal-20260101-000000.log"), "x").unwrap();
        assert_eq!(prune_logs(dir.path(), 0).unwrap(), 1);
        assert_eq!(prune_logs(dir.path(), 3).unwrap(), 0);
        assert!(names(dir.path()).is_empty());
    }
}
