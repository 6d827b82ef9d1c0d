//! Song-structure display data
//!
//! Chord progressions and section lists arrive as JSON-encoded timed
//! segments alongside the stem map. They are display-only; malformed input
//! is logged and treated as "no structure data" rather than failing the
//! player.

use log::warn;
use serde::Deserialize;

/// One chord change at a point in the song
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChordChange {
    pub chord: String,
    pub time: f64,
}

/// One labeled song section (verse, chorus, ...)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Section {
    pub label: String,
    pub start: f64,
    pub end: f64,
}

/// Parse a chord-progression JSON list, empty on any failure
pub fn parse_chords(json: &str) -> Vec<ChordChange> {
    match serde_json::from_str(json) {
        Ok(chords) => chords,
        Err(e) => {
            warn!("Ignoring malformed chord progression: {}", e);
            Vec::new()
        }
    }
}

/// Parse a song-structure JSON list, empty on any failure
pub fn parse_sections(json: &str) -> Vec<Section> {
    match serde_json::from_str(json) {
        Ok(sections) => sections,
        Err(e) => {
            warn!("Ignoring malformed song structure: {}", e);
            Vec::new()
        }
    }
}

/// The chord sounding at the given time, if any
pub fn chord_at(chords: &[ChordChange], seconds: f64) -> Option<&ChordChange> {
    chords.iter().rev().find(|c| c.time <= seconds)
}

/// The section containing the given time, if any
pub fn section_at(sections: &[Section], seconds: f64) -> Option<&Section> {
    sections
        .iter()
        .find(|s| s.start <= seconds && seconds < s.end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chords() {
        let chords = parse_chords(r#"[{"chord":"Am","time":0.0},{"chord":"F","time":4.2}]"#);
        assert_eq!(chords.len(), 2);
        assert_eq!(chords[1].chord, "F");

        assert_eq!(chord_at(&chords, 2.0).map(|c| c.chord.as_str()), Some("Am"));
        assert_eq!(chord_at(&chords, 5.0).map(|c| c.chord.as_str()), Some("F"));
        assert_eq!(chord_at(&chords, -1.0), None);
    }

    #[test]
    fn test_parse_sections() {
        let sections =
            parse_sections(r#"[{"label":"verse","start":0.0,"end":30.0},{"label":"chorus","start":30.0,"end":55.0}]"#);
        assert_eq!(sections.len(), 2);
        assert_eq!(section_at(&sections, 30.0).map(|s| s.label.as_str()), Some("chorus"));
        assert_eq!(section_at(&sections, 60.0), None);
    }

    #[test]
    fn test_malformed_input_yields_empty() {
        assert!(parse_chords("not json").is_empty());
        assert!(parse_chords(r#"{"chord":"Am"}"#).is_empty());
        assert!(parse_sections("").is_empty());
        assert!(parse_sections("[{\"label\":5}]").is_empty());
    }
}
