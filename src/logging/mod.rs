use std::{env, thread};

use chrono::{format::DelayedFormat, DateTime, Local};
use concat_string::concat_string;
use once_cell::sync::Lazy;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

pub mod rotate;

use rotate::Rotate;

/// 日誌目錄
const LOG_DIR: &str = "QUOTE_SYNC_LOG_DIR";
/// 日誌保留天數
const LOG_MAX_AGE_DAYS: &str = "QUOTE_SYNC_LOG_MAX_AGE_DAYS";
/// 設為 1 時同步輸出到 console
const LOG_CONSOLE: &str = "QUOTE_SYNC_LOG_CONSOLE";

static LOGGER: Lazy<Logger> = Lazy::new(|| Logger::new("quote_sync"));

#[derive(Debug, Copy, Clone, PartialEq, Eq, strum::Display)]
pub enum Level {
    Info,
    Warn,
    Error,
    Debug,
}

pub struct LogMessage {
    pub level: Level,
    pub msg: String,
    pub created_at: DateTime<Local>,
}

impl LogMessage {
    pub fn new(level: Level, msg: String) -> Self {
        LogMessage {
            level,
            msg,
            created_at: Local::now(),
        }
    }
}

pub struct Logger {
    writer: UnboundedSender<LogMessage>,
    echo: bool,
}

impl Logger {
    pub fn new(log_name: &str) -> Self {
        let dir = env::var(LOG_DIR).unwrap_or_else(|_| "log".to_string());
        let max_age_days = env::var(LOG_MAX_AGE_DAYS)
            .ok()
            .and_then(|days| days.parse::<i64>().ok())
            .unwrap_or(7);
        let echo = env::var(LOG_CONSOLE).map(|v| v == "1").unwrap_or(false);
        let pattern = format!("{}/%Y-%m-%d-{}.log", dir.trim_end_matches('/'), log_name);
        let (tx, mut rx) = unbounded_channel::<LogMessage>();

        // 寫檔交給獨立線程，呼叫端不會被 I/O 卡住
        thread::spawn(move || {
            let mut rotate = Rotate::with_options(pattern, rotate::DEFAULT_MAX_SIZE, max_age_days);
            let mut together = String::with_capacity(4096);
            let mut last_at = Local::now();

            while let Some(received) = rx.blocking_recv() {
                last_at = received.created_at;
                together.push_str(&concat_string!(
                    received.created_at.format("%F %X%.6f").to_string(),
                    " ",
                    received.level.to_string(),
                    " ",
                    received.msg,
                    "\r\n"
                ));

                if rx.is_empty() || together.len() >= 4096 {
                    if let Err(why) = rotate.write_msg(last_at, together.as_bytes()) {
                        error_console(format!("Failed to write log because {:?}", why));
                        info_console(together.clone());
                    }
                    rotate.flush();
                    together.clear();
                }
            }

            if !together.is_empty() {
                let _ = rotate.write_msg(last_at, together.as_bytes());
            }
        });

        Logger { writer: tx, echo }
    }

    pub fn info<S: Into<String>>(&self, log: S) {
        self.send(Level::Info, log.into());
    }

    pub fn warn<S: Into<String>>(&self, log: S) {
        self.send(Level::Warn, log.into());
    }

    pub fn error<S: Into<String>>(&self, log: S) {
        self.send(Level::Error, log.into());
    }

    pub fn debug<S: Into<String>>(&self, log: S) {
        self.send(Level::Debug, log.into());
    }

    fn send(&self, level: Level, msg: String) {
        if self.echo {
            println!(
                "{} {} {}",
                Local::now().format("%Y-%m-%d %H:%M:%S.%3f"),
                level,
                msg
            );
        }

        if let Err(why) = self.writer.send(LogMessage::new(level, msg)) {
            error_console(why.to_string());
        }
    }
}

pub fn info_file_async<S: Into<String>>(log: S) {
    LOGGER.info(log);
}

pub fn warn_file_async<S: Into<String>>(log: S) {
    LOGGER.warn(log);
}

pub fn error_file_async<S: Into<String>>(log: S) {
    LOGGER.error(log);
}

pub fn debug_file_async<S: Into<String>>(log: S) {
    LOGGER.debug(log);
}

pub fn info_console(log: String) {
    println!(
        "{} Info {}",
        Local::now().format("%Y-%m-%d %H:%M:%S.%3f"),
        log
    );
}

pub fn error_console(log: String) {
    println!(
        "{} Error {}",
        DelayedFormat::to_string(&Local::now().format("%Y-%m-%d %H:%M:%S.%3f")),
        log
    );
}
