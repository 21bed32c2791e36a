// BRIGHTNESSD SETTINGS PERSISTENCE
// FOUR KEYED INTEGERS BEHIND A PLUGGABLE STORE. EVERY SAVE IS
// BEST-EFFORT: A FAILED WRITE IS LOGGED AND SERVICE STATE MOVES ON.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::levels::{Config, Mode};
use crate::log_warn;

pub const KEY_MODE: &str = "persist.brightness.mode";
pub const KEY_TARGET_LEVEL: &str = "persist.brightness.target";
pub const KEY_USER_LUX: &str = "persist.brightness.user_lux";
pub const KEY_USER_TARGET: &str = "persist.brightness.user_target";

pub trait PropertyStore: Send {
    fn get_i32(&self, key: &str, default: i32) -> i32;
    fn set_i32(&mut self, key: &str, value: i32) -> io::Result<()>;
}

// --- FILE-BACKED STORE ---
// ONE key=value PER LINE. REWRITTEN ON EVERY SET; THE DATA SET IS FOUR
// INTEGERS, NOT A DATABASE.

pub struct FileStore {
    path: PathBuf,
    values: HashMap<String, i32>,
}

impl FileStore {
    pub fn open(path: &Path) -> io::Result<FileStore> {
        let mut values = HashMap::new();
        match fs::read_to_string(path) {
            Ok(raw) => {
                for line in raw.lines() {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if let Some((key, value)) = line.split_once('=') {
                        if let Ok(value) = value.trim().parse::<i32>() {
                            values.insert(key.trim().to_string(), value);
                        }
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        Ok(FileStore {
            path: path.to_path_buf(),
            values,
        })
    }

    fn flush(&self) -> io::Result<()> {
        let mut lines: Vec<String> = self
            .values
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        lines.sort();
        fs::write(&self.path, lines.join("\n") + "\n")
    }
}

impl PropertyStore for FileStore {
    fn get_i32(&self, key: &str, default: i32) -> i32 {
        self.values.get(key).copied().unwrap_or(default)
    }

    fn set_i32(&mut self, key: &str, value: i32) -> io::Result<()> {
        self.values.insert(key.to_string(), value);
        self.flush()
    }
}

// --- SHIM ---

pub struct RestoredSettings {
    pub mode: Mode,
    pub target: i32,
    pub user_lux: i32,
    pub user_target: i32,
}

pub struct Persist {
    store: Option<Box<dyn PropertyStore>>,
}

impl Persist {
    pub fn new(store: Option<Box<dyn PropertyStore>>) -> Persist {
        Persist { store }
    }

    pub fn enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn save_mode(&mut self, mode: i32) {
        self.save(KEY_MODE, mode);
    }

    pub fn save_level(&mut self, level: i32) {
        self.save(KEY_TARGET_LEVEL, level);
    }

    pub fn save_user_point(&mut self, lux: i32, target: i32) {
        self.save(KEY_USER_LUX, lux);
        self.save(KEY_USER_TARGET, target);
    }

    pub fn save_all(&mut self, mode: i32, target: i32, user_lux: i32, user_target: i32) {
        self.save_mode(mode);
        self.save_level(target);
        self.save_user_point(user_lux, user_target);
    }

    /// Reads the saved settings, filling first-boot defaults for missing
    /// keys. None when no store is bound.
    pub fn restore_all(&self, cfg: &Config) -> Option<RestoredSettings> {
        let store = self.store.as_ref()?;
        let mode = Mode::from_i32(store.get_i32(KEY_MODE, Mode::DEFAULT as i32))
            .unwrap_or(Mode::DEFAULT);
        Some(RestoredSettings {
            mode,
            target: store.get_i32(KEY_TARGET_LEVEL, (cfg.level_min + cfg.level_max) / 2),
            user_lux: store.get_i32(KEY_USER_LUX, 1),
            user_target: store.get_i32(KEY_USER_TARGET, 1),
        })
    }

    fn save(&mut self, key: &str, value: i32) {
        if let Some(store) = self.store.as_mut() {
            if let Err(e) = store.set_i32(key, value) {
                log_warn!("failed to persist {}: {}", key, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings");

        let mut store = FileStore::open(&path).unwrap();
        assert_eq!(store.get_i32(KEY_MODE, 7), 7);

        store.set_i32(KEY_MODE, 1).unwrap();
        store.set_i32(KEY_TARGET_LEVEL, 137).unwrap();

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get_i32(KEY_MODE, 0), 1);
        assert_eq!(reopened.get_i32(KEY_TARGET_LEVEL, 0), 137);
    }

    #[test]
    fn file_store_skips_garbage_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings");
        std::fs::write(&path, "persist.brightness.mode=1\nnot a line\nx=notanint\n").unwrap();

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get_i32(KEY_MODE, 0), 1);
        assert_eq!(store.get_i32("x", -3), -3);
    }

    #[test]
    fn restore_defaults_on_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(&dir.path().join("settings")).unwrap();
        let persist = Persist::new(Some(Box::new(store)));

        let cfg = Config::default();
        let restored = persist.restore_all(&cfg).unwrap();
        assert_eq!(restored.mode, Mode::Auto);
        assert_eq!(restored.target, (cfg.level_min + cfg.level_max) / 2);
        assert_eq!(restored.user_lux, 1);
        assert_eq!(restored.user_target, 1);
    }

    #[test]
    fn disabled_persist_is_silent() {
        let mut persist = Persist::new(None);
        assert!(!persist.enabled());
        persist.save_all(0, 100, 1, 1);
        assert!(persist.restore_all(&Config::default()).is_none());
    }
}
