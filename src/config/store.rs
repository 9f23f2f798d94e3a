use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{Context, Result};
use tokio::sync::watch;

use crate::{
    config::{read_text_file, watch_list::Settings},
    logging,
};

/// Where the user's settings live.
///
/// The engine reads one [`Settings`] value at the start of every cycle and
/// listens to [`ConfigStore::subscribe`] for cadence changes. Writes go
/// through [`ConfigStore::update`] so every subscriber sees the same value.
/// `update` is atomic: concurrent changes are applied one after the other,
/// each on top of the previous result.
pub trait ConfigStore: Send + Sync {
    fn load(&self) -> Settings;

    fn update(&self, change: &mut dyn FnMut(&mut Settings)) -> Result<Settings>;

    fn subscribe(&self) -> watch::Receiver<Settings>;
}

/// 記憶體內的設定，測試與嵌入式使用
pub struct MemoryConfigStore {
    sender: watch::Sender<Settings>,
}

impl MemoryConfigStore {
    pub fn new(settings: Settings) -> Self {
        let (sender, _) = watch::channel(settings);
        MemoryConfigStore { sender }
    }

    fn publish(&self, settings: Settings) {
        // send_replace 不會因為沒有訂閱者而失敗
        self.sender.send_replace(settings);
    }
}

impl Default for MemoryConfigStore {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> Settings {
        self.sender.borrow().clone()
    }

    fn update(&self, change: &mut dyn FnMut(&mut Settings)) -> Result<Settings> {
        let mut updated = None;
        self.sender.send_modify(|settings| {
            change(settings);
            updated = Some(settings.clone());
        });
        Ok(updated.unwrap_or_else(|| self.load()))
    }

    fn subscribe(&self) -> watch::Receiver<Settings> {
        self.sender.subscribe()
    }
}

/// Settings persisted as pretty printed JSON.
pub struct JsonFileConfigStore {
    path: PathBuf,
    memory: MemoryConfigStore,
    /// update 與 reload 的讀改寫要一次做完
    writer: Mutex<()>,
}

impl JsonFileConfigStore {
    /// A missing file starts from defaults; an unreadable one is logged and
    /// also starts from defaults.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let settings = Self::read(&path).unwrap_or_else(|why| {
            logging::error_file_async(format!(
                "Failed to read settings from {} because {:?}",
                path.display(),
                why
            ));
            Settings::default()
        });

        JsonFileConfigStore {
            path,
            memory: MemoryConfigStore::new(settings),
            writer: Mutex::new(()),
        }
    }

    fn lock_writer(&self) -> std::sync::MutexGuard<'_, ()> {
        match self.writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn read(path: &Path) -> Result<Settings> {
        if !path.exists() {
            return Ok(Settings::default());
        }

        let text = read_text_file(path.to_path_buf())?;
        if text.trim().is_empty() {
            return Ok(Settings::default());
        }

        serde_json::from_str::<Settings>(&text)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    fn write(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let text = serde_json::to_string_pretty(settings)?;
        fs::write(&self.path, text)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }

    /// Picks up edits made to the file by someone else. Subscribers are only
    /// notified when the content actually changed.
    pub fn reload(&self) -> Result<bool> {
        let _writer = self.lock_writer();
        let settings = Self::read(&self.path)?;
        if settings == self.memory.load() {
            return Ok(false);
        }

        self.memory.publish(settings);
        Ok(true)
    }
}

impl ConfigStore for JsonFileConfigStore {
    fn load(&self) -> Settings {
        self.memory.load()
    }

    fn update(&self, change: &mut dyn FnMut(&mut Settings)) -> Result<Settings> {
        let _writer = self.lock_writer();
        let mut settings = self.memory.load();
        change(&mut settings);
        self.write(&settings)?;
        self.memory.publish(settings.clone());
        Ok(settings)
    }

    fn subscribe(&self) -> watch::Receiver<Settings> {
        self.memory.subscribe()
    }
}
