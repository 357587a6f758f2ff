use crate::corpus::{DialogueEntry, NarrativeLine};

/// Full-width colon that separates a speaker label from the spoken text.
pub const SPEAKER_SEPARATOR: char = '：';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Dialogue(DialogueEntry),
    Narrative(NarrativeLine),
}

/// Classify one paragraph of a page titled `title`.
///
/// Returns `None` for paragraphs that are empty after trimming. Only the first
/// separator splits; anything after it stays in the text. A separator at the
/// very start or end still produces a dialogue entry with an empty side.
pub fn classify(paragraph: &str, title: &str) -> Option<Line> {
    let paragraph = paragraph.trim();
    if paragraph.is_empty() {
        return None;
    }

    let line = match paragraph.split_once(SPEAKER_SEPARATOR) {
        Some((speaker, text)) => Line::Dialogue(DialogueEntry {
            source_title: title.to_string(),
            speaker: speaker.trim().to_string(),
            text: text.trim().to_string(),
        }),
        None => Line::Narrative(NarrativeLine {
            source_title: title.to_string(),
            text: paragraph.to_string(),
        }),
    };
    Some(line)
}
