//! Playlist

use std::path::PathBuf;

use uuid::Uuid;

use crate::source::SourceInfo;

/// One playable entry. Duration is computed once at ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistItem {
    id: Uuid,
    reference: PathBuf,
    title: String,
    duration_secs: f64,
}

impl PlaylistItem {
    pub fn new(reference: PathBuf, title: impl Into<String>, duration_secs: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            reference,
            title: title.into(),
            duration_secs,
        }
    }

    pub fn from_source(info: &SourceInfo) -> Self {
        Self::new(info.path.clone(), info.title(), info.duration_secs())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn reference(&self) -> &PathBuf {
        &self.reference
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }
}

/// Ordered list of items
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Playlist {
    items: Vec<PlaylistItem>,
}

impl Playlist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: Vec<PlaylistItem>) -> Self {
        Self { items }
    }

    pub fn push(&mut self, item: PlaylistItem) -> Uuid {
        let id = item.id();
        self.items.push(item);
        id
    }

    pub fn remove(&mut self, id: Uuid) -> Option<PlaylistItem> {
        let index = self.items.iter().position(|i| i.id() == id)?;
        Some(self.items.remove(index))
    }

    pub fn get(&self, id: Uuid) -> Option<&PlaylistItem> {
        self.items.iter().find(|i| i.id() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlaylistItem> {
        self.items.iter()
    }

    pub fn items(&self) -> &[PlaylistItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
