pub mod classify;
pub mod detect;

use scraper::Html;
use tracing::debug;

use crate::config::Layout;
use crate::corpus::{DialogueEntry, NarrativeLine};
use classify::Line;
use detect::{Detection, Detector, FoldModules, InteractiveDialogue, LayoutError};

/// Dialogue and narrative lines pulled from one page, in paragraph order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PageExtraction {
    pub dialogues: Vec<DialogueEntry>,
    pub narratives: Vec<NarrativeLine>,
}

impl PageExtraction {
    pub fn push(&mut self, line: Line) {
        match line {
            Line::Dialogue(d) => self.dialogues.push(d),
            Line::Narrative(n) => self.narratives.push(n),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.dialogues.is_empty() && self.narratives.is_empty()
    }

    /// False when no layout produced anything; the caller records the page as failed.
    pub fn ok(&self) -> bool {
        !self.is_empty()
    }
}

/// Tries each layout in priority order and keeps the first that matches.
/// Results from different layouts are never combined.
pub struct PageExtractor {
    detectors: Vec<Box<dyn Detector>>,
}

impl PageExtractor {
    /// Fold modules first, interactive dialogue as the fallback.
    pub fn new(layout: &Layout) -> Result<Self, LayoutError> {
        Ok(PageExtractor {
            detectors: vec![
                Box::new(FoldModules::new(layout)?),
                Box::new(InteractiveDialogue::new(layout)?),
            ],
        })
    }

    pub fn extract(&self, raw_html: &str, title: &str) -> PageExtraction {
        let doc = Html::parse_document(raw_html);
        for detector in &self.detectors {
            match detector.detect(&doc, title) {
                Detection::Matched(extraction) => {
                    debug!(
                        detector = detector.name(),
                        dialogues = extraction.dialogues.len(),
                        narratives = extraction.narratives.len(),
                        "layout matched for {}",
                        title
                    );
                    return extraction;
                }
                Detection::NotMatched => {
                    debug!(detector = detector.name(), "no match for {}", title);
                }
            }
        }
        PageExtraction::default()
    }
}

// ── Tests ──
