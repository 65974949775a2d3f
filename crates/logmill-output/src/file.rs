use chrono::{DateTime, Local, NaiveDateTime, Timelike};
use logmill_core::{OutputError, PipelineConfig, RetentionConfig, RotationPolicy, Stream};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::retention;

const LOG_SUFFIX: &str = ".log";

/// Naming, placement and rotation settings shared by all streams
#[derive(Debug, Clone)]
pub struct FileSettings {
    pub app_name: String,
    pub log_dir: PathBuf,
    pub policy: RotationPolicy,
    pub retention: RetentionConfig,
}

impl FileSettings {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            app_name: config.general.app_name.clone(),
            log_dir: config.general.log_dir.clone(),
            policy: config.rotation.policy(),
            retention: config.rotation.retention(),
        }
    }

    /// Leading part of every rotated file name of `stream`
    pub fn file_prefix(&self, stream: Stream) -> String {
        format!("{}{}-", self.app_name, stream.infix())
    }

    /// Path of the "latest" symlink of `stream`
    pub fn symlink_path(&self, stream: Stream) -> PathBuf {
        self.log_dir
            .join(format!("{}{}{}", self.app_name, stream.infix(), LOG_SUFFIX))
    }

    fn timestamp(&self, now: &DateTime<Local>) -> String {
        match self.policy {
            RotationPolicy::Hourly => now.format("%Y%m%d%H").to_string(),
            RotationPolicy::SizeBound { .. } => now.format("%Y%m%d%H%M%S").to_string(),
        }
    }

    /// Name of the file a rotation at `now` opens.
    ///
    /// Hourly files are reopened in append mode within the same hour. Size
    /// rotations always get a fresh file: when the second-granularity name is
    /// taken, a `-N` suffix is added.
    fn next_path(&self, stream: Stream, now: &DateTime<Local>) -> PathBuf {
        let base = format!("{}{}", self.file_prefix(stream), self.timestamp(now));
        let path = self.log_dir.join(format!("{}{}", base, LOG_SUFFIX));
        if matches!(self.policy, RotationPolicy::Hourly) || !path.exists() {
            return path;
        }
        (1u32..)
            .map(|n| self.log_dir.join(format!("{}-{}{}", base, n, LOG_SUFFIX)))
            .find(|p| !p.exists())
            .unwrap_or(path)
    }
}

/// Open file and counters of one stream
#[derive(Debug, Default)]
struct StreamState {
    file: Option<File>,
    path: Option<PathBuf>,
    /// Local wall-clock hour of the open file (hourly policy)
    epoch: Option<NaiveDateTime>,
    /// Bytes in the open file
    bytes: u64,
}

/// What a write did besides writing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub rotated: bool,
    pub pruned: usize,
    pub bytes: u64,
}

/// Rotating file streams of one pipeline
///
/// Not synchronized itself: the owner holds it under the pipeline lock so
/// that rotate-check and write of one event are a single critical section.
pub struct RotationManager {
    settings: FileSettings,
    streams: HashMap<Stream, StreamState>,
}

impl RotationManager {
    /// Create a manager for `streams` without opening anything
    pub fn new(settings: FileSettings, streams: &[Stream]) -> Self {
        Self {
            settings,
            streams: streams
                .iter()
                .map(|s| (*s, StreamState::default()))
                .collect(),
        }
    }

    /// Create a manager and open the first file of every stream
    pub fn open(
        settings: FileSettings,
        streams: &[Stream],
        now: DateTime<Local>,
    ) -> Result<Self, OutputError> {
        let mut manager = Self::new(settings, streams);
        for stream in streams {
            manager.rotate_if_needed(*stream, &now)?;
        }
        Ok(manager)
    }

    pub fn settings(&self) -> &FileSettings {
        &self.settings
    }

    /// Rotate `stream` when its policy says so. Returns the number of files
    /// pruned, or `None` when no rotation happened.
    pub fn rotate_if_needed(
        &mut self,
        stream: Stream,
        now: &DateTime<Local>,
    ) -> Result<Option<usize>, OutputError> {
        let state = self.streams.entry(stream).or_default();

        let needs_rotation = match self.settings.policy {
            RotationPolicy::Hourly => {
                let hour = truncate_to_hour(now);
                if state.file.is_none() || state.epoch != Some(hour) {
                    state.epoch = Some(hour);
                    state.bytes = 0;
                    true
                } else {
                    false
                }
            }
            RotationPolicy::SizeBound { max_bytes } => {
                if state.file.is_none() {
                    true
                } else if max_bytes > 0 && state.bytes >= max_bytes {
                    state.bytes = 0;
                    true
                } else {
                    false
                }
            }
        };

        if !needs_rotation {
            return Ok(None);
        }
        self.rotate(stream, now).map(Some)
    }

    /// Close the current file of `stream` and open the next one
    fn rotate(&mut self, stream: Stream, now: &DateTime<Local>) -> Result<usize, OutputError> {
        let settings = &self.settings;
        let state = self.streams.entry(stream).or_default();

        state.file = None;
        state.path = None;

        create_log_dir(&settings.log_dir)?;

        let path = settings.next_path(stream, now);
        let file = open_append(&path)?;
        state.bytes = file.metadata().map(|m| m.len()).unwrap_or(0);
        state.file = Some(file);
        state.path = Some(path.clone());

        info!(stream = %stream, path = %path.display(), "Opened log file for writing");

        if let Err(e) = replace_symlink(&settings.symlink_path(stream), &path) {
            warn!(stream = %stream, error = %e, "Failed to update latest-file symlink");
        }

        let pruned = if settings.retention.enabled() {
            retention::sweep(
                &settings.log_dir,
                &settings.file_prefix(stream),
                LOG_SUFFIX,
                settings.retention.max_backups,
                Some(&path),
            )
        } else {
            0
        };

        Ok(pruned)
    }

    /// Rotate if needed, then append `line` to `stream`
    ///
    /// The line goes straight to the file, so a failed write is reported
    /// here and never counted as written.
    pub fn write(
        &mut self,
        stream: Stream,
        line: &str,
        now: &DateTime<Local>,
    ) -> Result<WriteReport, OutputError> {
        let rotation = self.rotate_if_needed(stream, now)?;

        let state = self.streams.entry(stream).or_default();
        let file = state.file.as_mut().ok_or_else(|| OutputError::Write {
            stream: stream.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not open"),
        })?;

        file.write_all(line.as_bytes())
            .map_err(|e| OutputError::Write {
                stream: stream.to_string(),
                source: e,
            })?;

        let bytes = line.len() as u64;
        state.bytes += bytes;

        debug!(stream = %stream, bytes, "Wrote line to file");

        Ok(WriteReport {
            rotated: rotation.is_some(),
            pruned: rotation.unwrap_or(0),
            bytes,
        })
    }

    /// Close every stream; paths are kept for inspection
    pub fn close(&mut self) {
        for state in self.streams.values_mut() {
            state.file = None;
        }
    }

    /// Path of the file currently open for `stream`
    pub fn current_path(&self, stream: Stream) -> Option<&Path> {
        self.streams.get(&stream).and_then(|s| s.path.as_deref())
    }

    /// Bytes in the file currently open for `stream`
    pub fn bytes_written(&self, stream: Stream) -> u64 {
        self.streams.get(&stream).map(|s| s.bytes).unwrap_or(0)
    }

    pub fn is_open(&self, stream: Stream) -> bool {
        self.streams
            .get(&stream)
            .map(|s| s.file.is_some())
            .unwrap_or(false)
    }
}

fn truncate_to_hour(now: &DateTime<Local>) -> NaiveDateTime {
    let local = now.naive_local();
    local
        .date()
        .and_hms_opt(local.hour(), 0, 0)
        .unwrap_or(local)
}

fn create_log_dir(dir: &Path) -> Result<(), OutputError> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    builder.create(dir).map_err(|e| OutputError::Directory {
        path: dir.display().to_string(),
        source: e,
    })
}

fn open_append(path: &Path) -> Result<File, OutputError> {
    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o644);
    }
    options.open(path).map_err(|e| OutputError::Open {
        path: path.display().to_string(),
        source: e,
    })
}

/// Point `link` at the base name of `target`, replacing any previous link.
///
/// The new link is created under a temporary name and renamed over the old
/// one, so readers never see a missing link.
#[cfg(unix)]
fn replace_symlink(link: &Path, target: &Path) -> Result<(), OutputError> {
    let err = |e| OutputError::Symlink {
        path: link.display().to_string(),
        source: e,
    };
    let target_name = target.file_name().ok_or_else(|| {
        err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "target has no file name",
        ))
    })?;
    let link_name = link
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = link.with_file_name(format!(".{}.tmp", link_name));

    let _ = fs::remove_file(&tmp);
    std::os::unix::fs::symlink(target_name, &tmp).map_err(err)?;
    fs::rename(&tmp, link).map_err(err)
}

#[cfg(not(unix))]
fn replace_symlink(_link: &Path, _target: &Path) -> Result<(), OutputError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Read;
    use tempfile::TempDir;

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(y, mo, d, h, mi, s)
            .single()
            .expect("unambiguous local time")
    }

    fn settings(dir: &Path, policy: RotationPolicy, max_backups: usize) -> FileSettings {
        FileSettings {
            app_name: "test".to_string(),
            log_dir: dir.join("logs"),
            policy,
            retention: RetentionConfig { max_backups },
        }
    }

    fn read(path: &Path) -> String {
        let mut content = String::new();
        File::open(path)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        content
    }

    fn log_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_open_creates_directory_and_file() {
        let dir = TempDir::new().unwrap();
        let now = local(2024, 1, 15, 9, 30, 0);
        let manager =
            RotationManager::open(settings(dir.path(), RotationPolicy::Hourly, 0), &[Stream::Normal], now)
                .unwrap();

        let path = manager.current_path(Stream::Normal).unwrap();
        assert_eq!(path.file_name().unwrap(), "test-2024011509.log");
        assert!(path.exists());
        assert!(manager.is_open(Stream::Normal));
        assert!(!manager.is_open(Stream::Elevated));
    }

    #[test]
    fn test_hourly_rotation_at_boundary() {
        let dir = TempDir::new().unwrap();
        let s = settings(dir.path(), RotationPolicy::Hourly, 0);
        let logs = s.log_dir.clone();
        let mut manager = RotationManager::new(s, &[Stream::Normal]);

        let before = local(2024, 1, 15, 9, 59, 59);
        let after = local(2024, 1, 15, 10, 0, 1);

        let first = manager.write(Stream::Normal, "{\"n\":1}\n", &before).unwrap();
        assert!(first.rotated);
        let second = manager.write(Stream::Normal, "{\"n\":2}\n", &after).unwrap();
        assert!(second.rotated);
        let third = manager.write(Stream::Normal, "{\"n\":3}\n", &after).unwrap();
        assert!(!third.rotated);

        assert_eq!(
            log_files(&logs),
            vec!["test-2024011509.log", "test-2024011510.log"]
        );
        assert_eq!(read(&logs.join("test-2024011509.log")), "{\"n\":1}\n");
        assert_eq!(
            read(&logs.join("test-2024011510.log")),
            "{\"n\":2}\n{\"n\":3}\n"
        );

        #[cfg(unix)]
        assert_eq!(
            fs::read_link(logs.join("test.log")).unwrap(),
            PathBuf::from("test-2024011510.log")
        );
    }

    #[test]
    fn test_hourly_reopen_same_hour_appends() {
        let dir = TempDir::new().unwrap();
        let now = local(2024, 1, 15, 9, 10, 0);
        {
            let mut manager = RotationManager::new(
                settings(dir.path(), RotationPolicy::Hourly, 0),
                &[Stream::Normal],
            );
            manager.write(Stream::Normal, "a\n", &now).unwrap();
        }

        let mut manager =
            RotationManager::new(settings(dir.path(), RotationPolicy::Hourly, 0), &[Stream::Normal]);
        manager.write(Stream::Normal, "b\n", &now).unwrap();
        assert_eq!(manager.bytes_written(Stream::Normal), 4);

        let path = manager.current_path(Stream::Normal).unwrap().to_path_buf();
        assert_eq!(read(&path), "a\nb\n");
    }

    #[test]
    fn test_size_rotation_resets_counter() {
        let dir = TempDir::new().unwrap();
        let s = settings(dir.path(), RotationPolicy::SizeBound { max_bytes: 1024 }, 0);
        let logs = s.log_dir.clone();
        let mut manager = RotationManager::new(s, &[Stream::Normal]);
        let now = local(2024, 1, 15, 9, 30, 0);

        let line = format!("{{\"pad\":\"{}\"}}\n", "x".repeat(90));
        assert_eq!(line.len(), 101);

        let mut rotations = 0;
        for _ in 0..12 {
            if manager.write(Stream::Normal, &line, &now).unwrap().rotated {
                rotations += 1;
            }
        }
        // first open, then one rotation once 11 lines (1111 bytes) passed 1024
        assert_eq!(rotations, 2);
        assert_eq!(manager.bytes_written(Stream::Normal), 101);

        let files = log_files(&logs);
        assert_eq!(
            files,
            vec!["test-20240115093000-1.log", "test-20240115093000.log"]
        );
        assert_eq!(read(&logs.join("test-20240115093000-1.log")), line);

        #[cfg(unix)]
        assert_eq!(
            fs::read_link(logs.join("test.log")).unwrap(),
            PathBuf::from("test-20240115093000-1.log")
        );
    }

    #[test]
    fn test_size_zero_never_rotates() {
        let dir = TempDir::new().unwrap();
        let mut manager = RotationManager::new(
            settings(dir.path(), RotationPolicy::SizeBound { max_bytes: 0 }, 0),
            &[Stream::Normal],
        );
        let now = local(2024, 1, 15, 9, 30, 0);
        let rotated: Vec<bool> = (0..5)
            .map(|_| manager.write(Stream::Normal, "line\n", &now).unwrap().rotated)
            .collect();
        assert_eq!(rotated, vec![true, false, false, false, false]);
    }

    #[test]
    fn test_streams_rotate_independently() {
        let dir = TempDir::new().unwrap();
        let s = settings(dir.path(), RotationPolicy::SizeBound { max_bytes: 10 }, 0);
        let logs = s.log_dir.clone();
        let now = local(2024, 1, 15, 9, 30, 0);
        let mut manager =
            RotationManager::open(s, &[Stream::Normal, Stream::Elevated], now).unwrap();

        manager.write(Stream::Elevated, "0123456789\n", &now).unwrap();
        assert_eq!(manager.bytes_written(Stream::Elevated), 11);
        assert_eq!(manager.bytes_written(Stream::Normal), 0);

        let normal = manager.write(Stream::Normal, "abc\n", &now).unwrap();
        assert!(!normal.rotated);
        let elevated = manager.write(Stream::Elevated, "def\n", &now).unwrap();
        assert!(elevated.rotated);

        assert_eq!(
            log_files(&logs),
            vec![
                "test-20240115093000.log",
                "test.wf-20240115093000-1.log",
                "test.wf-20240115093000.log",
            ]
        );
        assert_eq!(read(&logs.join("test-20240115093000.log")), "abc\n");

        #[cfg(unix)]
        assert_eq!(
            fs::read_link(logs.join("test.wf.log")).unwrap(),
            PathBuf::from("test.wf-20240115093000-1.log")
        );
    }

    #[test]
    fn test_rotation_prunes_old_files() {
        let dir = TempDir::new().unwrap();
        let s = settings(dir.path(), RotationPolicy::Hourly, 2);
        let logs = s.log_dir.clone();
        let mut manager = RotationManager::new(s, &[Stream::Normal]);

        let mut pruned = 0;
        for hour in 0..5 {
            let now = local(2024, 1, 15, hour, 0, 0);
            let report = manager.write(Stream::Normal, "x\n", &now).unwrap();
            pruned += report.pruned;
            // distinct modification times
            std::thread::sleep(std::time::Duration::from_millis(20));
        }

        assert_eq!(pruned, 3);
        assert_eq!(
            log_files(&logs),
            vec!["test-2024011503.log", "test-2024011504.log"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_never_dangles() {
        let dir = TempDir::new().unwrap();
        let s = settings(dir.path(), RotationPolicy::SizeBound { max_bytes: 1 }, 1);
        let link = s.symlink_path(Stream::Normal);
        let mut manager = RotationManager::new(s, &[Stream::Normal]);
        let now = local(2024, 1, 15, 9, 30, 0);

        for _ in 0..10 {
            manager.write(Stream::Normal, "x\n", &now).unwrap();
            let target = fs::read_link(&link).unwrap();
            assert_eq!(
                Some(target.as_os_str()),
                manager.current_path(Stream::Normal).unwrap().file_name()
            );
            assert!(fs::metadata(&link).is_ok(), "symlink points at a missing file");
        }
    }

    #[test]
    fn test_open_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("logs");
        fs::write(&blocker, "not a directory").unwrap();

        let result = RotationManager::open(
            settings(dir.path(), RotationPolicy::Hourly, 0),
            &[Stream::Normal],
            Local::now(),
        );
        assert!(matches!(result, Err(OutputError::Directory { .. })));
    }

    #[test]
    fn test_failed_rotation_retries_on_next_write() {
        let dir = TempDir::new().unwrap();
        let s = settings(dir.path(), RotationPolicy::Hourly, 0);
        let logs = s.log_dir.clone();
        fs::write(&logs, "in the way").unwrap();
        let mut manager = RotationManager::new(s, &[Stream::Normal]);
        let now = local(2024, 1, 15, 9, 0, 0);

        assert!(manager.write(Stream::Normal, "a\n", &now).is_err());
        assert!(manager.write(Stream::Normal, "b\n", &now).is_err());

        fs::remove_file(&logs).unwrap();
        let report = manager.write(Stream::Normal, "c\n", &now).unwrap();
        assert!(report.rotated);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_device_full_is_a_write_error() {
        let dir = TempDir::new().unwrap();
        let s = settings(dir.path(), RotationPolicy::Hourly, 0);
        fs::create_dir_all(&s.log_dir).unwrap();
        std::os::unix::fs::symlink("/dev/full", s.log_dir.join("test-2024011509.log")).unwrap();

        let now = local(2024, 1, 15, 9, 10, 0);
        let mut manager = RotationManager::open(s, &[Stream::Normal], now).unwrap();

        let result = manager.write(Stream::Normal, "{\"msg\":\"lost\"}\n", &now);
        assert!(matches!(result, Err(OutputError::Write { .. })));
        assert_eq!(manager.bytes_written(Stream::Normal), 0);
    }
}
