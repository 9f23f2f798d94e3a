use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local, TimeDelta};
use rayon::prelude::*;

use crate::logging;

/// 單檔上限 10 MB
pub const DEFAULT_MAX_SIZE: u64 = 10 * 1024 * 1024;
/// 保留 7 天
pub const DEFAULT_MAX_AGE_DAYS: i64 = 7;

/// Date-named log file with size based generations.
///
/// `log/%Y-%m-%d-quote_sync.log` becomes `log/2024-05-06-quote_sync.log`,
/// then `log/2024-05-06-quote_sync.1.log` once the first file is full.
/// A new day starts again at generation zero and prunes files older than
/// `max_age`.
pub struct Rotate {
    pattern: String,
    base_fn: String,
    generation: u32,
    max_size: u64,
    written: u64,
    max_age: TimeDelta,
    out: Option<BufWriter<File>>,
}

impl Rotate {
    pub fn new(pattern: String) -> Self {
        Self::with_options(pattern, DEFAULT_MAX_SIZE, DEFAULT_MAX_AGE_DAYS)
    }

    pub fn with_options(pattern: String, max_size: u64, max_age_days: i64) -> Self {
        Rotate {
            pattern,
            base_fn: String::new(),
            generation: 0,
            max_size,
            written: 0,
            max_age: TimeDelta::try_days(max_age_days).unwrap_or(TimeDelta::days(7)),
            out: None,
        }
    }

    pub fn write_msg(&mut self, now: DateTime<Local>, msg: &[u8]) -> Result<()> {
        let base_fn = now.format(&self.pattern).to_string();
        if base_fn != self.base_fn || self.out.is_none() {
            self.base_fn = base_fn;
            self.generation = 0;
            self.open()?;
            self.prune(now);
        }

        if self.written > 0 && self.written + msg.len() as u64 > self.max_size {
            self.flush();
            self.generation += 1;
            self.open()?;
        }

        let out = self
            .out
            .as_mut()
            .ok_or_else(|| anyhow!("log file {} is not open", self.base_fn))?;
        out.write_all(msg)?;
        self.written += msg.len() as u64;

        Ok(())
    }

    pub fn flush(&mut self) {
        if let Some(out) = self.out.as_mut() {
            let _ = out.flush();
        }
    }

    fn file_name(&self, generation: u32) -> String {
        if generation == 0 {
            return self.base_fn.clone();
        }

        let path = Path::new(&self.base_fn);
        let parent = path.parent().unwrap_or(Path::new(""));
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("log");
        let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("log");

        parent
            .join(format!("{}.{}.{}", stem, generation, ext))
            .to_string_lossy()
            .to_string()
    }

    fn open(&mut self) -> Result<()> {
        self.flush();

        let filename = self.file_name(self.generation);
        if let Some(parent) = Path::new(&filename).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&filename)?;
        self.written = file.metadata().map(|m| m.len()).unwrap_or(0);
        self.out = Some(BufWriter::with_capacity(4096, file));

        Ok(())
    }

    /// 刪除超過保留期限的檔案
    fn prune(&self, now: DateTime<Local>) {
        let files = match Self::siblings(&self.base_fn) {
            Ok(files) => files,
            Err(why) => {
                logging::error_console(format!("Failed to list log directory because {:?}", why));
                return;
            }
        };

        let cut_off = (now - self.max_age).timestamp().max(0) as u64;
        let expired: Vec<PathBuf> = files
            .into_iter()
            .filter(|file| {
                fs::metadata(file)
                    .and_then(|metadata| metadata.modified())
                    .ok()
                    .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
                    .map(|age| age.as_secs() <= cut_off)
                    .unwrap_or(false)
            })
            .collect();

        if expired.is_empty() {
            return;
        }

        expired
            .par_iter()
            .with_min_len(num_cpus::get())
            .for_each(|file| {
                if let Err(why) = fs::remove_file(file) {
                    logging::error_console(format!(
                        "couldn't remove the file({}). because {:?}",
                        file.display(),
                        why
                    ));
                }
            });
    }

    fn siblings(file_path: &str) -> Result<Vec<PathBuf>, io::Error> {
        let parent = Path::new(file_path)
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Parent directory not found"))?;
        let mut files = Vec::new();
        for entry in fs::read_dir(parent)? {
            let path = entry?.path();
            if path.is_file() && path.extension().map(|ext| ext == "log").unwrap_or(false) {
                files.push(path);
            }
        }

        Ok(files)
    }
}

impl Drop for Rotate {
    fn drop(&mut self) {
        self.flush();
    }
}
