// ============================================================================
// CHATLOG PARSER: pasted roleplay transcript -> caption line records
// ============================================================================

use crate::layer::Rgb;

/// `/me` style actions: lines starting with `*`.
pub const ACTION_COLOR: Rgb = Rgb::new(0xC2, 0xA2, 0xDA);
/// Spoken lines (`says:`, `shouts:`, `whispers:`) and everything unclassified.
pub const SPEECH_COLOR: Rgb = Rgb::WHITE;
/// Out-of-character chatter wrapped in `(( ... ))`.
pub const OOC_COLOR: Rgb = Rgb::new(0xA9, 0xC4, 0xE4);

pub const DEFAULT_START_Y: f32 = 50.0;
/// Fixed vertical pitch between consecutive records. Not a measured layout.
pub const LINE_PITCH: f32 = 24.0;

/// One caption line ready to become a text layer.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatLine {
    pub content: String,
    pub color: Rgb,
    pub y: f32,
}

/// Parse a pasted chatlog into caption records, one per non-blank line.
pub fn parse_chatlog(input: &str, start_y: f32) -> Vec<ChatLine> {
    input
        .lines()
        .map(|line| strip_timestamp(line.trim()).trim())
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(i, content)| ChatLine {
            content: content.to_string(),
            color: classify(content),
            y: start_y + i as f32 * LINE_PITCH,
        })
        .collect()
}

/// Remove a leading `[HH:MM:SS]` stamp. Anything not matching that exact
/// shape is returned untouched.
pub fn strip_timestamp(line: &str) -> &str {
    let b = line.as_bytes();
    if b.len() < 10 || b[0] != b'[' || b[3] != b':' || b[6] != b':' || b[9] != b']' {
        return line;
    }
    if [1, 2, 4, 5, 7, 8].iter().all(|&i| b[i].is_ascii_digit()) {
        &line[10..]
    } else {
        line
    }
}

/// Pick the caption colour for an already stripped line. First match wins.
pub fn classify(line: &str) -> Rgb {
    let lower = line.to_lowercase();
    if lower.starts_with('*') {
        ACTION_COLOR
    } else if lower.contains("says:") || lower.contains("shouts:") || lower.contains("whispers:") {
        SPEECH_COLOR
    } else if lower.starts_with("((") || lower.ends_with("))") {
        OOC_COLOR
    } else {
        SPEECH_COLOR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_and_spaces_lines() {
        let out = parse_chatlog("* waves\nStranger says: hi\n(( ooc ))", DEFAULT_START_Y);
        assert_eq!(out.len(), 3);
        let colors: Vec<String> = out.iter().map(|l| l.color.to_hex()).collect();
        assert_eq!(colors, ["#C2A2DA", "#FFFFFF", "#A9C4E4"]);
        let ys: Vec<f32> = out.iter().map(|l| l.y).collect();
        assert_eq!(ys, [50.0, 74.0, 98.0]);
    }

    #[test]
    fn strips_leading_timestamp() {
        let out = parse_chatlog("[12:00:00] Stranger says: hi", DEFAULT_START_Y);
        assert_eq!(out[0].content, "Stranger says: hi");
        assert_eq!(out[0].color, SPEECH_COLOR);
    }

    #[test]
    fn timestamp_must_be_exact() {
        assert_eq!(strip_timestamp("[1:00:00] hi"), "[1:00:00] hi");
        assert_eq!(strip_timestamp("[ab:cd:ef] hi"), "[ab:cd:ef] hi");
        assert_eq!(strip_timestamp("hi [12:00:00]"), "hi [12:00:00]");
        assert_eq!(strip_timestamp("[23:59:59]x"), "x");
    }

    #[test]
    fn blank_lines_are_dropped_anywhere() {
        let out = parse_chatlog("\n   \nfirst\n\n\t\nsecond\n  ", 10.0);
        let contents: Vec<&str> = out.iter().map(|l| l.content.as_str()).collect();
        assert_eq!(contents, ["first", "second"]);
        assert_eq!(out[1].y, 10.0 + LINE_PITCH);
    }

    #[test]
    fn classification_is_case_insensitive_and_ordered() {
        assert_eq!(classify("Bob SHOUTS: run"), SPEECH_COLOR);
        assert_eq!(classify("Bob Whispers: psst"), SPEECH_COLOR);
        // action wins over everything that follows it
        assert_eq!(classify("* Bob says: hi ))"), ACTION_COLOR);
        // speech wins over the OOC suffix
        assert_eq!(classify("Bob says: (( brb ))"), SPEECH_COLOR);
        assert_eq!(classify("((brb"), OOC_COLOR);
        assert_eq!(classify("brb))"), OOC_COLOR);
        assert_eq!(classify("Welcome to the server"), SPEECH_COLOR);
    }

    #[test]
    fn parsing_is_deterministic() {
        let input = "[01:02:03] * nods\nAlice says: ok";
        assert_eq!(parse_chatlog(input, 5.0), parse_chatlog(input, 5.0));
    }
}
