//! Brief domain types shared by the daypart generator, the matcher, and the
//! designer-brief synthesizer.

pub mod dayparts;
pub mod designer;
pub mod matcher;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub use dayparts::{generate_dayparts, Daypart};
pub use designer::{synthesize_designer_brief, DesignerBrief};
pub use matcher::{build_bundle, recommend, MatchOutcome, Recommendation, RecommendationBundle};

/// Structured inputs accumulated during a consultation, as the matcher and
/// designer consume them. Zone overrides are merged atop this base.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BriefInput {
    pub venue_type: String,
    pub vibes: Vec<String>,
    pub energy: u8,
    pub hours: String,
    pub vocals: String,
    pub avoid_list: String,
    pub genre_hints: Vec<String>,
}

impl BriefInput {
    /// Apply a zone's overrides on top of this base brief.
    pub fn with_zone_overrides(&self, zone: &ZoneSpec) -> Self {
        let mut merged = self.clone();
        if let Some(ref hours) = zone.hours {
            merged.hours = hours.clone();
        }
        if let Some(energy) = zone.energy {
            merged.energy = energy;
        }
        if let Some(ref vibes) = zone.vibes {
            if !vibes.is_empty() {
                merged.vibes = vibes.clone();
            }
        }
        if let Some(ref hints) = zone.genre_hints {
            if !hints.is_empty() {
                merged.genre_hints = hints.clone();
            }
        }
        merged
    }
}

/// Per-zone overrides for multi-zone venues.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ZoneSpec {
    pub name: String,
    pub hours: Option<String>,
    pub energy: Option<u8>,
    pub vibes: Option<Vec<String>>,
    pub genre_hints: Option<Vec<String>>,
}

/// Dayparts come in two shapes on the wire: a flat list for single-zone
/// venues and a zone-name → list map for multi-zone ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Dayparts {
    Single(Vec<Daypart>),
    Multi(HashMap<String, Vec<Daypart>>),
}

impl Dayparts {
    /// Iterate `(zone, dayparts)` pairs uniformly over either shape.
    /// Single-zone yields one pair with `None` as the zone.
    pub fn zones(&self) -> Vec<(Option<&str>, &[Daypart])> {
        match self {
            Dayparts::Single(list) => vec![(None, list.as_slice())],
            Dayparts::Multi(map) => map
                .iter()
                .map(|(zone, list)| (Some(zone.as_str()), list.as_slice()))
                .collect(),
        }
    }

    /// Dayparts for one zone; for the single shape any zone name matches.
    pub fn for_zone(&self, zone: Option<&str>) -> Option<&[Daypart]> {
        match self {
            Dayparts::Single(list) => Some(list.as_slice()),
            Dayparts::Multi(map) => zone.and_then(|z| map.get(z)).map(|l| l.as_slice()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_overrides_replace_only_given_fields() {
        let base = BriefInput {
            venue_type: "hotel".into(),
            vibes: vec!["zen".into()],
            energy: 5,
            hours: "08:00-22:00".into(),
            vocals: "mix".into(),
            avoid_list: String::new(),
            genre_hints: vec!["jazz".into()],
        };
        let zone = ZoneSpec {
            name: "Pool".into(),
            hours: Some("09:00-19:00".into()),
            energy: Some(7),
            vibes: Some(vec!["tropical".into()]),
            genre_hints: None,
        };

        let merged = base.with_zone_overrides(&zone);
        assert_eq!(merged.hours, "09:00-19:00");
        assert_eq!(merged.energy, 7);
        assert_eq!(merged.vibes, vec!["tropical".to_string()]);
        assert_eq!(merged.genre_hints, vec!["jazz".to_string()]);
        assert_eq!(merged.venue_type, "hotel");
    }

    #[test]
    fn dayparts_shapes_iterate_uniformly() {
        let dp = dayparts::generate_dayparts("09:00-15:00", 5);
        let single = Dayparts::Single(dp.clone());
        assert_eq!(single.zones().len(), 1);
        assert!(single.for_zone(Some("anything")).is_some());

        let mut map = HashMap::new();
        map.insert("Lobby".to_string(), dp.clone());
        map.insert("Pool".to_string(), dp);
        let multi = Dayparts::Multi(map);
        assert_eq!(multi.zones().len(), 2);
        assert!(multi.for_zone(Some("Lobby")).is_some());
        assert!(multi.for_zone(Some("Gym")).is_none());
    }

    #[test]
    fn schedule_shapes_roundtrip_through_json() {
        let dp = dayparts::generate_dayparts("10:00-14:00", 4);
        let single = Dayparts::Single(dp);
        let json = serde_json::to_string(&single).unwrap();
        let back: Dayparts = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, Dayparts::Single(_)));
    }
}
