//! Designer-brief synthesizer: condenses the structured brief into the top
//! genres, BPM bands, and per-daypart genre lists used in the production
//! email and persisted alongside the raw brief.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::brief::dayparts::Daypart;
use crate::brief::BriefInput;
use crate::catalog::tables;

/// Condensed brief for the design team.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignerBrief {
    /// Top 8 genres by vibe/venue score, best first.
    pub top_genres: Vec<String>,
    /// BPM bands of the selected vibes, in selection order.
    pub bpm_ranges: Vec<String>,
    /// Daypart key → genre shortlist for that part of the day.
    pub daypart_genres: HashMap<String, Vec<String>>,
    /// Daypart keys in presentation order.
    pub daypart_order: Vec<String>,
}

/// Build the designer brief from the structured inputs and the (base-zone)
/// daypart list.
pub fn synthesize_designer_brief(brief: &BriefInput, parts: &[Daypart]) -> DesignerBrief {
    // Genre scores: +1.0 per selected vibe listing the genre, +0.5 per venue
    // booster genre. First-seen order breaks ties.
    let mut scores: Vec<(String, f64)> = Vec::new();
    let mut bump = |genre: &str, amount: f64, scores: &mut Vec<(String, f64)>| {
        if let Some(entry) = scores.iter_mut().find(|(g, _)| g == genre) {
            entry.1 += amount;
        } else {
            scores.push((genre.to_string(), amount));
        }
    };

    for vibe in &brief.vibes {
        if let Some(profile) = tables::vibe_profile(vibe) {
            for genre in profile.genres {
                bump(genre, 1.0, &mut scores);
            }
        }
    }
    for genre in tables::venue_genres(&brief.venue_type) {
        bump(genre, 0.5, &mut scores);
    }

    let mut indexed: Vec<(usize, &(String, f64))> = scores.iter().enumerate().collect();
    indexed.sort_by(|(ia, (_, sa)), (ib, (_, sb))| {
        sb.partial_cmp(sa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(ia.cmp(ib))
    });
    let top_genres: Vec<String> = indexed
        .into_iter()
        .take(8)
        .map(|(_, (g, _))| g.clone())
        .collect();

    let mut bpm_ranges: Vec<String> = Vec::new();
    for vibe in &brief.vibes {
        if let Some(profile) = tables::vibe_profile(vibe) {
            if !bpm_ranges.iter().any(|b| b == profile.bpm) {
                bpm_ranges.push(profile.bpm.to_string());
            }
        }
    }

    let mut daypart_genres = HashMap::new();
    let mut daypart_order = Vec::new();
    for part in parts {
        let take = if part.energy >= brief.energy { 6 } else { 5 };
        daypart_genres.insert(
            part.key.clone(),
            top_genres.iter().take(take).cloned().collect(),
        );
        daypart_order.push(part.key.clone());
    }

    DesignerBrief {
        top_genres,
        bpm_ranges,
        daypart_genres,
        daypart_order,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brief::generate_dayparts;

    fn brief() -> BriefInput {
        BriefInput {
            venue_type: "bar-lounge".into(),
            vibes: vec!["sophisticated".into(), "trendy".into()],
            energy: 7,
            hours: "17:00-02:00".into(),
            vocals: "mix".into(),
            avoid_list: String::new(),
            genre_hints: vec![],
        }
    }

    #[test]
    fn top_genres_are_capped_at_eight_and_ranked() {
        let b = brief();
        let parts = generate_dayparts(&b.hours, b.energy);
        let designer = synthesize_designer_brief(&b, &parts);

        assert!(designer.top_genres.len() <= 8);
        // deep house: sophisticated (1.0) + trendy (1.0) + bar-lounge booster
        // (0.5) = 2.5, the highest score.
        assert_eq!(designer.top_genres[0], "deep house");
    }

    #[test]
    fn bpm_ranges_follow_vibe_selection_order() {
        let b = brief();
        let designer = synthesize_designer_brief(&b, &generate_dayparts(&b.hours, b.energy));
        assert_eq!(designer.bpm_ranges, vec!["100-118 BPM", "110-122 BPM"]);
    }

    #[test]
    fn high_energy_dayparts_get_a_sixth_genre() {
        let b = brief();
        let parts = generate_dayparts(&b.hours, b.energy);
        let designer = synthesize_designer_brief(&b, &parts);

        // energies are [5, 7, 8] against base 7: only the last two reach it.
        assert_eq!(designer.daypart_genres["opening"].len(), 5);
        assert_eq!(designer.daypart_genres["peak-hours"].len(), 6);
        assert_eq!(designer.daypart_genres["wind-down"].len(), 6);
        assert_eq!(
            designer.daypart_order,
            vec!["opening", "peak-hours", "wind-down"]
        );
    }

    #[test]
    fn unknown_vibes_contribute_nothing() {
        let b = BriefInput {
            vibes: vec!["mysterious-unknown".into()],
            venue_type: "cafe".into(),
            ..Default::default()
        };
        let designer = synthesize_designer_brief(&b, &[]);
        // Only the cafe booster genres remain.
        assert_eq!(designer.top_genres.len(), 3);
        assert!(designer.bpm_ranges.is_empty());
    }
}
