//! Playlist catalog, loaded once at startup and immutable thereafter.

pub mod tables;

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// One playlist from the static catalog.
///
/// `syb_id` is the opaque platform identifier used when assigning the
/// playlist to a sound zone; playlists without one can be recommended but
/// never scheduled remotely.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub categories: HashSet<String>,
    #[serde(default)]
    pub syb_id: Option<String>,
}

impl Playlist {
    /// Lowercased searchable text the matcher scores against.
    pub fn search_text(&self) -> String {
        format!("{} {}", self.name, self.description).to_lowercase()
    }
}

/// The immutable playlist catalog. Iteration order is file order, which the
/// matcher uses as its tie-break.
#[derive(Debug, Clone)]
pub struct Catalog {
    playlists: Vec<Playlist>,
}

impl Catalog {
    /// Load the catalog from a JSON file (`[{...}, ...]` or `{"playlists": [...]}`).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| CatalogError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum CatalogFile {
            Bare(Vec<Playlist>),
            Wrapped { playlists: Vec<Playlist> },
        }

        let playlists = match serde_json::from_str::<CatalogFile>(&raw)? {
            CatalogFile::Bare(p) => p,
            CatalogFile::Wrapped { playlists } => playlists,
        };

        Self::from_playlists(playlists)
    }

    /// Build a catalog from in-memory playlists (tests, embedded fixtures).
    pub fn from_playlists(playlists: Vec<Playlist>) -> Result<Self, CatalogError> {
        if playlists.is_empty() {
            return Err(CatalogError::Empty);
        }
        Ok(Self { playlists })
    }

    pub fn playlists(&self) -> &[Playlist] {
        &self.playlists
    }

    pub fn len(&self) -> usize {
        self.playlists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.playlists.is_empty()
    }

    /// Find by internal id or (exact, case-insensitive) name.
    pub fn find(&self, id_or_name: &str) -> Option<&Playlist> {
        let lower = id_or_name.to_lowercase();
        self.playlists
            .iter()
            .find(|p| p.id == id_or_name || p.name.to_lowercase() == lower)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playlist(id: &str, name: &str) -> Playlist {
        Playlist {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            categories: HashSet::new(),
            syb_id: None,
        }
    }

    #[test]
    fn empty_catalog_is_rejected() {
        assert!(matches!(
            Catalog::from_playlists(vec![]),
            Err(CatalogError::Empty)
        ));
    }

    #[test]
    fn find_by_id_and_name() {
        let cat = Catalog::from_playlists(vec![
            playlist("pl-1", "Smooth Jazz Evenings"),
            playlist("pl-2", "Tropical Beach Bar"),
        ])
        .unwrap();

        assert_eq!(cat.find("pl-2").unwrap().name, "Tropical Beach Bar");
        assert_eq!(cat.find("smooth jazz evenings").unwrap().id, "pl-1");
        assert!(cat.find("nonexistent").is_none());
    }

    #[test]
    fn load_accepts_both_file_shapes() {
        let dir = tempfile::tempdir().unwrap();
        let bare = dir.path().join("bare.json");
        std::fs::write(
            &bare,
            r#"[{"id":"a","name":"A","categories":["bar"]}]"#,
        )
        .unwrap();
        let wrapped = dir.path().join("wrapped.json");
        std::fs::write(
            &wrapped,
            r#"{"playlists":[{"id":"b","name":"B","sybId":"syb-b"}]}"#,
        )
        .unwrap();

        assert_eq!(Catalog::load(&bare).unwrap().len(), 1);
        let cat = Catalog::load(&wrapped).unwrap();
        assert_eq!(cat.playlists()[0].syb_id.as_deref(), Some("syb-b"));
    }
}
