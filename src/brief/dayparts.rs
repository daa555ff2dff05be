//! Daypart generator: segments a venue's operating hours into 2–4 labeled,
//! time-bounded parts with per-part energy targets.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// A contiguous block of the operating day with a target energy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Daypart {
    /// Stable slug, e.g. `peak-hours`.
    pub key: String,
    /// Human label with the local time range embedded, e.g. `Peak Hours (20:00-23:00)`.
    pub label: String,
    /// `HH:MM-HH:MM` local wall clock.
    pub time_range: String,
    /// One of `sunrise|sun|sunset|moon|stars`.
    pub icon: String,
    /// Target energy, 1–10.
    pub energy: u8,
}

impl Daypart {
    /// Start minutes-since-midnight parsed back out of `time_range`.
    pub fn start_minutes(&self) -> Option<u32> {
        let start = self.time_range.split('-').next()?;
        let (h, m) = start.split_once(':')?;
        Some(h.parse::<u32>().ok()? * 60 + m.parse::<u32>().ok()?)
    }

    /// `(start, end)` minutes-since-midnight; end may be numerically below
    /// start when the part wraps past midnight.
    pub fn minute_bounds(&self) -> Option<(u32, u32)> {
        let (start, end) = self.time_range.split_once('-')?;
        let parse = |s: &str| -> Option<u32> {
            let (h, m) = s.split_once(':')?;
            Some(h.parse::<u32>().ok()? * 60 + m.parse::<u32>().ok()?)
        };
        Some((parse(start)?, parse(end)?))
    }
}

/// Labels per segment count.
fn segment_labels(count: usize) -> &'static [&'static str] {
    match count {
        2 => &["Opening", "Peak"],
        3 => &["Opening", "Peak Hours", "Wind Down"],
        _ => &["Opening", "Build Up", "Peak Hours", "Wind Down"],
    }
}

/// Energy offsets per segment count, applied to the base energy.
fn energy_offsets(count: usize) -> &'static [i8] {
    match count {
        2 => &[-1, 1],
        3 => &[-2, 0, 1],
        _ => &[-2, -1, 1, 0],
    }
}

/// Icon for a segment that starts at the given local hour.
fn icon_for_hour(hour: u32) -> &'static str {
    match hour {
        5..=10 => "sunrise",
        11..=15 => "sun",
        16..=18 => "sunset",
        19..=23 => "moon",
        _ => "stars",
    }
}

fn slugify(label: &str) -> String {
    label.to_lowercase().replace(' ', "-")
}

fn fmt_clock(minutes: u32) -> String {
    let m = minutes % 1440;
    format!("{:02}:{:02}", m / 60, m % 60)
}

/// Parse the first two clock tokens out of a free-text hours string.
/// Accepts `HH`, `HH:MM`, `HHMM` with an optional `am`/`pm` suffix.
/// Returns `(open, close)` as minutes-since-midnight.
fn parse_hours(text: &str) -> Option<(u32, u32)> {
    let re = Regex::new(r"(?i)(\d{1,2})(?::?(\d{2}))?\s*(am|pm)?").ok()?;
    let mut tokens = Vec::new();

    for cap in re.captures_iter(text) {
        let hour: u32 = cap.get(1)?.as_str().parse().ok()?;
        let minute: u32 = cap
            .get(2)
            .map(|m| m.as_str().parse().unwrap_or(0))
            .unwrap_or(0);
        if hour > 24 || minute > 59 {
            continue;
        }
        let hour = match cap.get(3).map(|s| s.as_str().to_lowercase()) {
            Some(ref ampm) if ampm == "pm" && hour < 12 => hour + 12,
            Some(ref ampm) if ampm == "am" && hour == 12 => 0,
            _ => hour,
        };
        tokens.push((hour * 60 + minute) % 1440);
        if tokens.len() == 2 {
            break;
        }
    }

    match tokens.as_slice() {
        [open, close] => Some((*open, *close)),
        _ => None,
    }
}

/// The fixed fallback when the hours text is empty or unparseable.
fn fallback_dayparts(base_energy: u8) -> Vec<Daypart> {
    let fixed: [(&str, &str, &str, &str, i8); 3] = [
        ("morning", "Morning", "06:00-12:00", "sunrise", -2),
        ("afternoon", "Afternoon", "12:00-18:00", "sun", 0),
        ("evening", "Evening", "18:00-23:00", "moon", 1),
    ];
    fixed
        .iter()
        .map(|(key, label, range, icon, offset)| Daypart {
            key: key.to_string(),
            label: format!("{label} ({range})"),
            time_range: range.to_string(),
            icon: icon.to_string(),
            energy: clamp_energy(base_energy as i16 + *offset as i16),
        })
        .collect()
}

fn clamp_energy(e: i16) -> u8 {
    e.clamp(1, 10) as u8
}

/// Segment the operating hours into 2–4 dayparts.
///
/// Close at or before open wraps past midnight. Window ≤ 6 h yields 2 parts,
/// ≤ 12 h yields 3, anything longer 4. Parts tile the window exactly; the
/// returned order is the presentation order downstream.
pub fn generate_dayparts(hours: &str, base_energy: u8) -> Vec<Daypart> {
    let (open, close) = match parse_hours(hours) {
        Some(parsed) => parsed,
        None => return fallback_dayparts(base_energy),
    };

    let total = if close > open {
        close - open
    } else {
        1440 - open + close
    };

    let count: usize = if total <= 360 {
        2
    } else if total <= 720 {
        3
    } else {
        4
    };

    let seg_len = total / count as u32;
    let labels = segment_labels(count);
    let offsets = energy_offsets(count);

    (0..count)
        .map(|i| {
            let start = (open + i as u32 * seg_len) % 1440;
            let end = if i == count - 1 {
                close % 1440
            } else {
                (open + (i as u32 + 1) * seg_len) % 1440
            };
            let range = format!("{}-{}", fmt_clock(start), fmt_clock(end));
            Daypart {
                key: slugify(labels[i]),
                label: format!("{} ({})", labels[i], range),
                time_range: range,
                icon: icon_for_hour(start / 60).to_string(),
                energy: clamp_energy(base_energy as i16 + offsets[i] as i16),
            }
        })
        .collect()
}
