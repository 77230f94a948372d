//! Preset, Mapping, Playlist and Session Persistence
//!
//! Typed records stored as JSON blobs in a key/value store. Absent or
//! malformed blobs load as empty collections; loading never fails.
//!
//! # Storage Locations ([`FileStore::default_location`])
//! - Linux: `~/.config/eq10/<key>.json`
//! - Windows: `%APPDATA%\eq10\eq10\config\<key>.json`
//! - macOS: `~/Library/Application Support/com.eq10.eq10/<key>.json`

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use eq10_dsp::{EqSnapshot, FilterShape, BAND_COUNT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{CoreError, CoreResult};
use crate::midi::MidiMappingTable;
use crate::params::{EqualizerPreset, ParameterStore};
use crate::playlist::{Playlist, PlaylistItem};

pub const PRESETS_KEY: &str = "user_presets";
pub const MAPPINGS_KEY: &str = "midi_mappings";
pub const PLAYLIST_KEY: &str = "playlist";
pub const SESSION_KEY: &str = "session";

/// Opaque blob storage
pub trait KeyValueStore {
    fn get(&self, key: &str) -> CoreResult<Option<Vec<u8>>>;
    fn set(&mut self, key: &str, value: &[u8]) -> CoreResult<()>;
}

/// One JSON file per key under a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Platform config directory
    pub fn default_location() -> Option<Self> {
        ProjectDirs::from("com", "eq10", "eq10").map(|proj| Self::new(proj.config_dir()))
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> CoreResult<Option<Vec<u8>>> {
        let path = self.path(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &[u8]) -> CoreResult<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path(key), value)?;
        Ok(())
    }
}

/// In-memory store for tests and headless runs
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    blobs: HashMap<String, Vec<u8>>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> CoreResult<Option<Vec<u8>>> {
        Ok(self.blobs.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &[u8]) -> CoreResult<()> {
        self.blobs.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetRecord {
    pub name: String,
    pub gains: Vec<f32>,
    #[serde(default)]
    pub shapes: Option<Vec<FilterShape>>,
    #[serde(default = "Utc::now")]
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRecord {
    pub name: String,
    pub cc: i16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistRecord {
    pub reference: PathBuf,
    pub title: String,
    pub duration: f64,
}

/// Last band settings, restored at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub gains: [f32; BAND_COUNT],
    pub shapes: [FilterShape; BAND_COUNT],
    #[serde(default)]
    pub bypass: [bool; BAND_COUNT],
    #[serde(default = "default_master_gain")]
    pub master_gain: f32,
    #[serde(default)]
    pub active_preset: Option<String>,
}

fn default_master_gain() -> f32 {
    1.0
}

impl Default for SessionRecord {
    fn default() -> Self {
        Self::from_snapshot(&EqSnapshot::default(), None)
    }
}

impl SessionRecord {
    pub fn from_snapshot(snapshot: &EqSnapshot, active_preset: Option<String>) -> Self {
        Self {
            gains: snapshot.gains(),
            shapes: core::array::from_fn(|i| snapshot.bands[i].shape),
            bypass: core::array::from_fn(|i| snapshot.bands[i].bypass),
            master_gain: snapshot.master_gain,
            active_preset,
        }
    }

    pub fn capture(store: &ParameterStore) -> Self {
        Self::from_snapshot(
            &store.snapshot(),
            store.active_preset().map(str::to_string),
        )
    }

    pub fn apply(&self, store: &mut ParameterStore) {
        store.restore_bands(&self.gains, &self.shapes, &self.bypass);
        store.set_master_gain(self.master_gain);
        store.set_active_preset(self.active_preset.clone());
    }
}

/// Typed encode/decode over a [`KeyValueStore`]
pub struct Persistence<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> Persistence<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn decode<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = match self.store.get(key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!("No stored value for '{}'", key);
                return None;
            }
            Err(e) => {
                warn!("Failed to read '{}': {}", key, e);
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring malformed '{}': {}", key, e);
                None
            }
        }
    }

    fn encode<T: Serialize>(&mut self, key: &str, value: &T) -> CoreResult<()> {
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| CoreError::ConfigError(format!("encode '{}': {}", key, e)))?;
        self.store.set(key, &bytes)?;
        debug!("Stored '{}' ({} bytes)", key, bytes.len());
        Ok(())
    }

    pub fn load_presets(&self) -> Vec<EqualizerPreset> {
        let records: Vec<PresetRecord> = self.decode(PRESETS_KEY).unwrap_or_default();
        records
            .into_iter()
            .filter_map(|r| {
                EqualizerPreset::from_parts(r.name.as_str(), &r.gains, r.shapes.as_deref())
                    .map_err(|e| warn!("Skipping stored preset '{}': {}", r.name, e))
                    .ok()
            })
            .collect()
    }

    pub fn save_presets(&mut self, presets: &[EqualizerPreset]) -> CoreResult<()> {
        let records: Vec<PresetRecord> = presets
            .iter()
            .map(|p| PresetRecord {
                name: p.name().to_string(),
                gains: p.gains().to_vec(),
                shapes: p.shapes().map(|s| s.to_vec()),
                saved_at: Utc::now(),
            })
            .collect();
        self.encode(PRESETS_KEY, &records)
    }

    /// Stored (parameter label, CC) pairs
    pub fn load_mappings(&self) -> Vec<MappingRecord> {
        self.decode(MAPPINGS_KEY).unwrap_or_default()
    }

    pub fn save_mappings(&mut self, table: &MidiMappingTable) -> CoreResult<()> {
        let records: Vec<MappingRecord> = table
            .mappings()
            .iter()
            .map(|m| MappingRecord {
                name: m.parameter.label().to_string(),
                cc: m.cc,
            })
            .collect();
        self.encode(MAPPINGS_KEY, &records)
    }

    pub fn load_playlist(&self) -> Playlist {
        let records: Vec<PlaylistRecord> = self.decode(PLAYLIST_KEY).unwrap_or_default();
        Playlist::from_items(
            records
                .into_iter()
                .map(|r| PlaylistItem::new(r.reference, r.title, r.duration))
                .collect(),
        )
    }

    pub fn save_playlist(&mut self, playlist: &Playlist) -> CoreResult<()> {
        let records: Vec<PlaylistRecord> = playlist
            .iter()
            .map(|item| PlaylistRecord {
                reference: item.reference().clone(),
                title: item.title().to_string(),
                duration: item.duration_secs(),
            })
            .collect();
        self.encode(PLAYLIST_KEY, &records)
    }

    pub fn load_session(&self) -> Option<SessionRecord> {
        self.decode(SESSION_KEY)
    }

    pub fn save_session(&mut self, store: &ParameterStore) -> CoreResult<()> {
        self.encode(SESSION_KEY, &SessionRecord::capture(store))
    }

    /// Restore everything into freshly created state
    pub fn restore_all(&self, params: &mut ParameterStore, mappings: &mut MidiMappingTable) -> Playlist {
        params.replace_user_presets(self.load_presets());
        if let Some(session) = self.load_session() {
            session.apply(params);
        }
        mappings.restore(self.load_mappings().into_iter().map(|r| (r.name, r.cc)));
        let playlist = self.load_playlist();
        info!(
            "Restored {} presets, {} playlist items",
            params.user_presets().len(),
            playlist.len()
        );
        playlist
    }
}
