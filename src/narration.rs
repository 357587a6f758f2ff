use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::info;

use crate::corpus::{self, DialogueEntry};

/// `[source_title] speaker : text`, ASCII colon with whitespace on both sides.
static NARRATION_DIALOGUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[(.*?)\]\s+(.+?)\s+:\s+(.+)$").unwrap());

/// Second pass over the narrative artifact: recover dialogue lines that use
/// the ASCII `speaker : text` convention. Anything else is skipped.
pub fn reextract(narration: &str) -> Vec<DialogueEntry> {
    narration
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter_map(|line| {
            let caps = NARRATION_DIALOGUE_RE.captures(line)?;
            Some(DialogueEntry {
                source_title: caps[1].to_string(),
                speaker: caps[2].to_string(),
                text: caps[3].to_string(),
            })
        })
        .collect()
}

pub fn reextract_file(path: &Path) -> Result<Vec<DialogueEntry>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read narrative file {:?}", path))?;
    let entries = reextract(&raw);
    info!("Recovered {} dialogue lines from {:?}", entries.len(), path);
    Ok(entries)
}

/// Re-extract `input` and save the recovered lines as a corpus batch at
/// `output`. Returns how many lines were recovered.
pub fn reextract_into(input: &Path, output: &Path) -> Result<usize> {
    let entries = reextract_file(input)?;
    corpus::save(output, &entries)?;
    Ok(entries.len())
}
