//! Fixed vibe and venue lookup tables used by the matcher and the designer
//! brief. These mirror the production design team's mapping sheets and never
//! change at runtime.

/// Genres and a BPM band associated with one selectable vibe.
pub struct VibeProfile {
    pub genres: &'static [&'static str],
    pub bpm: &'static str,
}

/// Vibe → genre profile. Each selected vibe adds +1.0 to every genre listed.
pub const VIBE_GENRES: &[(&str, VibeProfile)] = &[
    (
        "sophisticated",
        VibeProfile {
            genres: &["jazz", "deep house", "nu-disco", "soul", "lounge"],
            bpm: "100-118 BPM",
        },
    ),
    (
        "trendy",
        VibeProfile {
            genres: &["nu-disco", "indie dance", "deep house", "future funk"],
            bpm: "110-122 BPM",
        },
    ),
    (
        "relaxed",
        VibeProfile {
            genres: &["acoustic", "chillout", "soft pop", "bossa nova"],
            bpm: "70-95 BPM",
        },
    ),
    (
        "warm",
        VibeProfile {
            genres: &["soul", "acoustic", "folk", "neo-soul"],
            bpm: "75-100 BPM",
        },
    ),
    (
        "energetic",
        VibeProfile {
            genres: &["funk", "disco", "house", "pop"],
            bpm: "118-128 BPM",
        },
    ),
    (
        "zen",
        VibeProfile {
            genres: &["ambient", "new age", "downtempo", "nature"],
            bpm: "60-80 BPM",
        },
    ),
    (
        "tropical",
        VibeProfile {
            genres: &["tropical house", "reggae", "latin", "balearic"],
            bpm: "100-118 BPM",
        },
    ),
    (
        "romantic",
        VibeProfile {
            genres: &["jazz ballads", "soul", "french pop", "bossa nova"],
            bpm: "65-90 BPM",
        },
    ),
    (
        "upscale",
        VibeProfile {
            genres: &["jazz", "classical crossover", "lounge", "deep house"],
            bpm: "90-112 BPM",
        },
    ),
    (
        "playful",
        VibeProfile {
            genres: &["indie pop", "funk", "motown", "disco"],
            bpm: "105-125 BPM",
        },
    ),
    (
        "moody",
        VibeProfile {
            genres: &["trip-hop", "downtempo", "deep house", "electronica"],
            bpm: "85-105 BPM",
        },
    ),
    (
        "fresh",
        VibeProfile {
            genres: &["indie pop", "tropical house", "soft pop", "acoustic"],
            bpm: "95-115 BPM",
        },
    ),
];

/// Vibe → keywords the matcher looks for in playlist name + description.
/// Each hit adds +0.5 to the playlist's base score.
pub const VIBE_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "sophisticated",
        &["sophisticated", "elegant", "classy", "jazz", "refined", "cocktail"],
    ),
    ("trendy", &["trendy", "modern", "fresh", "indie", "disco", "current"]),
    ("relaxed", &["relaxed", "chill", "mellow", "easy", "laidback", "calm"]),
    ("warm", &["warm", "cozy", "soulful", "acoustic", "intimate", "organic"]),
    (
        "energetic",
        &["energetic", "upbeat", "party", "dance", "vibrant", "groove"],
    ),
    ("zen", &["zen", "ambient", "meditation", "peaceful", "spa", "serene"]),
    (
        "tropical",
        &["tropical", "beach", "island", "summer", "pool", "sunshine"],
    ),
    ("romantic", &["romantic", "intimate", "candlelight", "ballad", "love"]),
    ("upscale", &["upscale", "luxury", "premium", "five-star", "elegant"]),
    ("playful", &["playful", "fun", "feel-good", "happy", "bright"]),
    ("moody", &["moody", "dark", "late night", "atmospheric", "deep"]),
    ("fresh", &["fresh", "morning", "light", "breezy", "sunny"]),
];

/// Venue type → playlist categories considered a direct fit.
/// An intersecting playlist gets `2 + |intersection|` added to its score.
pub const VENUE_CATEGORIES: &[(&str, &[&str])] = &[
    ("hotel-lobby", &["hotel", "lounge"]),
    ("hotel", &["hotel", "lounge", "spa"]),
    ("bar-lounge", &["bar", "lounge"]),
    ("rooftop-bar", &["bar", "lounge"]),
    ("pool-club", &["bar", "lounge"]),
    ("cafe", &["cafe"]),
    ("restaurant", &["restaurant", "lounge"]),
    ("fine-dining", &["restaurant", "lounge"]),
    ("spa", &["spa"]),
    ("retail", &["store"]),
];

/// Venue type → booster genres, +0.5 each in the designer brief.
pub const VENUE_GENRES: &[(&str, &[&str])] = &[
    ("hotel-lobby", &["jazz", "lounge", "classical crossover"]),
    ("hotel", &["jazz", "lounge", "chillout"]),
    ("bar-lounge", &["deep house", "nu-disco", "funk"]),
    ("rooftop-bar", &["deep house", "tropical house", "nu-disco"]),
    ("pool-club", &["tropical house", "house", "balearic"]),
    ("cafe", &["acoustic", "indie pop", "soft pop"]),
    ("restaurant", &["jazz", "bossa nova", "soul"]),
    ("fine-dining", &["jazz ballads", "classical crossover", "lounge"]),
    ("spa", &["ambient", "new age", "nature"]),
    ("retail", &["pop", "indie pop", "funk"]),
];

/// Categories a daypart's energy level maps onto for the per-daypart boost.
pub fn energy_categories(energy: u8) -> &'static [&'static str] {
    match energy {
        0..=3 => &["spa", "lounge"],
        4..=6 => &["cafe", "restaurant", "hotel", "lounge"],
        _ => &["bar", "store", "lounge"],
    }
}

/// Look up a vibe's genre profile.
pub fn vibe_profile(vibe: &str) -> Option<&'static VibeProfile> {
    VIBE_GENRES
        .iter()
        .find(|(v, _)| *v == vibe)
        .map(|(_, p)| p)
}

/// Look up a vibe's matcher keywords.
pub fn vibe_keywords(vibe: &str) -> &'static [&'static str] {
    VIBE_KEYWORDS
        .iter()
        .find(|(v, _)| *v == vibe)
        .map(|(_, kws)| *kws)
        .unwrap_or(&[])
}

/// Look up the direct-fit categories for a venue type.
pub fn venue_categories(venue_type: &str) -> &'static [&'static str] {
    VENUE_CATEGORIES
        .iter()
        .find(|(v, _)| *v == venue_type)
        .map(|(_, cats)| *cats)
        .unwrap_or(&[])
}

/// Look up the booster genres for a venue type.
pub fn venue_genres(venue_type: &str) -> &'static [&'static str] {
    VENUE_GENRES
        .iter()
        .find(|(v, _)| *v == venue_type)
        .map(|(_, genres)| *genres)
        .unwrap_or(&[])
}

/// Humanize a venue-type slug for recommendation copy: `bar-lounge` → `bar lounge`.
pub fn humanize_venue_type(venue_type: &str) -> String {
    venue_type.replace('-', " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_vibe_has_keywords() {
        for (vibe, _) in VIBE_GENRES {
            assert!(
                !vibe_keywords(vibe).is_empty(),
                "vibe {vibe} has no keywords"
            );
        }
    }

    #[test]
    fn energy_category_bands() {
        assert_eq!(energy_categories(1), &["spa", "lounge"]);
        assert_eq!(energy_categories(3), &["spa", "lounge"]);
        assert_eq!(energy_categories(4), &["cafe", "restaurant", "hotel", "lounge"]);
        assert_eq!(energy_categories(6), &["cafe", "restaurant", "hotel", "lounge"]);
        assert_eq!(energy_categories(7), &["bar", "store", "lounge"]);
        assert_eq!(energy_categories(10), &["bar", "store", "lounge"]);
    }

    #[test]
    fn unknown_venue_type_maps_to_empty() {
        assert!(venue_categories("bowling-alley").is_empty());
        assert!(venue_genres("bowling-alley").is_empty());
    }

    #[test]
    fn humanize_replaces_hyphens() {
        assert_eq!(humanize_venue_type("hotel-lobby"), "hotel lobby");
    }
}
