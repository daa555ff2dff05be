//! Deterministic playlist matcher: scores every catalog playlist against a
//! brief and returns ranked per-daypart picks with normalized match scores.

use std::collections::HashSet;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::brief::{dayparts::Daypart, generate_dayparts, BriefInput, Dayparts, ZoneSpec};
use crate::catalog::{tables, Catalog, Playlist};

/// One recommended playlist for one daypart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub playlist_id: String,
    pub playlist_name: String,
    /// Daypart key the pick belongs to.
    pub daypart: String,
    pub reason: String,
    /// Normalized score in [55, 95].
    pub match_score: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    /// `weekend` on weekend-variant picks, absent otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_type: Option<String>,
}

/// Result of one matcher run.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub recommendations: Vec<Recommendation>,
    pub designer_notes: String,
}

/// Base score for one playlist, before the per-daypart boost.
struct ScoredPlaylist<'a> {
    playlist: &'a Playlist,
    /// Catalog position, the tie-break.
    index: usize,
    base: f64,
    venue_matched: bool,
    matched_vibes: Vec<String>,
}

/// Tokenize an avoid list: split on `,`/`;` and the words `and`/`or`, strip
/// filler tokens, normalize hyphens to spaces.
fn avoid_terms(avoid: &str) -> Vec<String> {
    if avoid.trim().is_empty() {
        return Vec::new();
    }
    let lower = avoid.to_lowercase().replace('-', " ");
    let sep = Regex::new(r"[,;]|\band\b|\bor\b").expect("static regex");
    sep.split(&lower)
        .filter_map(|raw| {
            let words: Vec<&str> = raw
                .split_whitespace()
                .filter(|w| !matches!(*w, "no" | "hits" | "mainstream"))
                .collect();
            if words.is_empty() {
                None
            } else {
                Some(words.join(" "))
            }
        })
        .collect()
}

fn vocals_boost(vocals: &str, text: &str) -> f64 {
    let (pattern, boost) = match vocals {
        "instrumental" => (r"instrumental|piano|ambient|nature", 1.5),
        "mostly-instrumental" => (r"instrumental|piano|acoustic", 0.8),
        _ => return 0.0,
    };
    let re = Regex::new(pattern).expect("static regex");
    if re.is_match(text) {
        boost
    } else {
        0.0
    }
}

fn score_playlist<'a>(
    playlist: &'a Playlist,
    index: usize,
    brief: &BriefInput,
    avoid: &[String],
) -> ScoredPlaylist<'a> {
    let text = playlist.search_text();
    let normalized_text = text.replace('-', " ");
    let mut base = 0.0;

    // Venue category fit: the playlist serves this kind of room.
    let target: HashSet<&str> = tables::venue_categories(&brief.venue_type)
        .iter()
        .copied()
        .collect();
    let overlap = playlist
        .categories
        .iter()
        .filter(|c| target.contains(c.as_str()))
        .count();
    let venue_matched = overlap > 0;
    if venue_matched {
        base += 2.0 + overlap as f64;
    }

    // Vibe keywords.
    let mut matched_vibes = Vec::new();
    for vibe in &brief.vibes {
        let mut hit = false;
        for kw in tables::vibe_keywords(vibe) {
            if text.contains(kw) {
                base += 0.5;
                hit = true;
            }
        }
        if hit {
            matched_vibes.push(vibe.clone());
        }
    }

    // Genre hints are the strongest positive signal.
    for hint in &brief.genre_hints {
        if text.contains(&hint.to_lowercase()) {
            base += 2.0;
        }
    }

    // Avoid terms are effectively exclusions.
    for term in avoid {
        if normalized_text.contains(term.as_str()) {
            base -= 10.0;
        }
    }

    base += vocals_boost(&brief.vocals, &text);

    ScoredPlaylist {
        playlist,
        index,
        base,
        venue_matched,
        matched_vibes,
    }
}

fn author_reason(scored: &ScoredPlaylist<'_>, brief: &BriefInput) -> String {
    let vibe_text = if !scored.matched_vibes.is_empty() {
        scored.matched_vibes.join(", ")
    } else if let Some(first) = brief.vibes.first() {
        first.clone()
    } else {
        "signature".to_string()
    };
    let desc = &scored.playlist.description;
    if scored.venue_matched {
        format!(
            "{} — fits your {} {}",
            desc,
            vibe_text,
            tables::humanize_venue_type(&brief.venue_type)
        )
    } else {
        format!("{} — complements the {} atmosphere", desc, vibe_text)
    }
}

fn designer_notes(brief: &BriefInput, parts: &[Daypart]) -> String {
    let vibe_text = if brief.vibes.is_empty() {
        "signature".to_string()
    } else {
        brief.vibes.join(", ")
    };
    format!(
        "Curated for a {} with a {} feel: {} dayparts build from energy {} toward {}, \
         keeping transitions gradual so the room never jumps.",
        tables::humanize_venue_type(&brief.venue_type),
        vibe_text,
        parts.len(),
        parts.first().map(|p| p.energy).unwrap_or(brief.energy),
        parts.iter().map(|p| p.energy).max().unwrap_or(brief.energy),
    )
}

/// Run the matcher for one zone: per-daypart ranked picks with normalized
/// scores. A playlist is picked at most once across the zone's dayparts.
pub fn recommend(
    catalog: &Catalog,
    brief: &BriefInput,
    parts: &[Daypart],
    zone: Option<&str>,
    schedule_type: Option<&str>,
) -> MatchOutcome {
    let avoid = avoid_terms(&brief.avoid_list);
    let scored: Vec<ScoredPlaylist<'_>> = catalog
        .playlists()
        .iter()
        .enumerate()
        .map(|(i, p)| score_playlist(p, i, brief, &avoid))
        .collect();

    let per_daypart = if parts.is_empty() {
        0
    } else {
        12usize.div_ceil(parts.len())
    };

    let mut picked: HashSet<&str> = HashSet::new();
    // (scored index, daypart key, daypart score)
    let mut picks: Vec<(usize, String, f64)> = Vec::new();

    for part in parts {
        let dp_cats: HashSet<&str> = tables::energy_categories(part.energy)
            .iter()
            .copied()
            .collect();

        let mut ranked: Vec<(usize, f64)> = scored
            .iter()
            .enumerate()
            .filter(|(_, s)| !picked.contains(s.playlist.id.as_str()))
            .map(|(i, s)| {
                let boost = if s
                    .playlist
                    .categories
                    .iter()
                    .any(|c| dp_cats.contains(c.as_str()))
                {
                    1.0
                } else {
                    0.0
                };
                (i, s.base + boost)
            })
            .filter(|(_, dp_score)| *dp_score > 0.0)
            .collect();

        // Descending by score; catalog order breaks ties (sort is stable and
        // the input is already in catalog order).
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        for (i, dp_score) in ranked.into_iter().take(per_daypart) {
            picked.insert(scored[i].playlist.id.as_str());
            picks.push((i, part.key.clone(), dp_score));
        }
    }

    let max_score = picks
        .iter()
        .map(|(_, _, s)| *s)
        .fold(f64::MIN, f64::max)
        .max(1e-9);

    let recommendations = picks
        .into_iter()
        .map(|(i, daypart, dp_score)| {
            let s = &scored[i];
            let normalized = (55.0 + dp_score / max_score * 40.0).round();
            Recommendation {
                playlist_id: s.playlist.id.clone(),
                playlist_name: s.playlist.name.clone(),
                daypart,
                reason: author_reason(s, brief),
                match_score: normalized.clamp(55.0, 95.0) as u8,
                zone: zone.map(String::from),
                schedule_type: schedule_type.map(String::from),
            }
        })
        .collect();

    MatchOutcome {
        recommendations,
        designer_notes: designer_notes(brief, parts),
    }
}

/// Full recommendation payload for a venue: single- or multi-zone, with an
/// optional weekend variant. This is what the chat tool and the recommend
/// endpoint both emit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationBundle {
    pub recommendations: Vec<Recommendation>,
    pub dayparts: Dayparts,
    pub designer_notes: String,
    pub multi_zone: bool,
    pub zone_names: Vec<String>,
    pub weekend_dayparts: Option<Dayparts>,
    pub weekend_recommendations: Option<Vec<Recommendation>>,
}

/// Run the matcher across all zones (and the weekend variant when present).
pub fn build_bundle(
    catalog: &Catalog,
    base: &BriefInput,
    zones: &[ZoneSpec],
    weekend: Option<&ZoneSpec>,
) -> RecommendationBundle {
    if zones.is_empty() {
        let parts = generate_dayparts(&base.hours, base.energy);
        let outcome = recommend(catalog, base, &parts, None, None);
        let weekend_result = weekend.map(|w| {
            let wk_brief = base.with_zone_overrides(w);
            let wk_parts = generate_dayparts(&wk_brief.hours, wk_brief.energy);
            let wk = recommend(catalog, &wk_brief, &wk_parts, None, Some("weekend"));
            (Dayparts::Single(wk_parts), wk.recommendations)
        });
        let (weekend_dayparts, weekend_recommendations) = match weekend_result {
            Some((d, r)) => (Some(d), Some(r)),
            None => (None, None),
        };
        return RecommendationBundle {
            recommendations: outcome.recommendations,
            dayparts: Dayparts::Single(parts),
            designer_notes: outcome.designer_notes,
            multi_zone: false,
            zone_names: Vec::new(),
            weekend_dayparts,
            weekend_recommendations,
        };
    }

    let mut all_recs = Vec::new();
    let mut daypart_map = std::collections::HashMap::new();
    let mut notes = String::new();
    let mut wk_recs = Vec::new();
    let mut wk_parts_map = std::collections::HashMap::new();

    for zone in zones {
        let merged = base.with_zone_overrides(zone);
        let parts = generate_dayparts(&merged.hours, merged.energy);
        let outcome = recommend(catalog, &merged, &parts, Some(&zone.name), None);
        if notes.is_empty() {
            notes = outcome.designer_notes;
        }
        all_recs.extend(outcome.recommendations);
        daypart_map.insert(zone.name.clone(), parts);

        if let Some(w) = weekend {
            let wk_brief = merged.with_zone_overrides(w);
            let parts = generate_dayparts(&wk_brief.hours, wk_brief.energy);
            let outcome =
                recommend(catalog, &wk_brief, &parts, Some(&zone.name), Some("weekend"));
            wk_recs.extend(outcome.recommendations);
            wk_parts_map.insert(zone.name.clone(), parts);
        }
    }

    RecommendationBundle {
        recommendations: all_recs,
        dayparts: Dayparts::Multi(daypart_map),
        designer_notes: notes,
        multi_zone: true,
        zone_names: zones.iter().map(|z| z.name.clone()).collect(),
        weekend_dayparts: if weekend.is_some() {
            Some(Dayparts::Multi(wk_parts_map))
        } else {
            None
        },
        weekend_recommendations: if weekend.is_some() { Some(wk_recs) } else { None },
    }
}
