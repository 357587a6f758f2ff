use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::classify::classify;
use super::PageExtraction;
use crate::config::Layout;

/// Heading text that marks a fold module as the story dialogue section.
pub const DIALOGUE_SECTION_MARKER: &str = "剧情对话";

#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("invalid selector {selector:?}: {message}")]
    InvalidSelector { selector: String, message: String },
}

#[derive(Debug)]
pub enum Detection {
    Matched(PageExtraction),
    NotMatched,
}

impl From<PageExtraction> for Detection {
    fn from(extraction: PageExtraction) -> Self {
        if extraction.is_empty() {
            Detection::NotMatched
        } else {
            Detection::Matched(extraction)
        }
    }
}

/// One page layout. A detector that finds nothing reports `NotMatched`,
/// which is the normal "not this layout" signal.
pub trait Detector {
    fn name(&self) -> &'static str;
    fn detect(&self, doc: &Html, title: &str) -> Detection;
}

/// Layout B: collapsible `obc-tmpl-fold` modules, only the one headed as
/// story dialogue counts.
pub struct FoldModules {
    module: Selector,
    title: Selector,
    title_fallback: Selector,
    paragraph: Selector,
}

impl FoldModules {
    pub fn new(layout: &Layout) -> Result<Self, LayoutError> {
        Ok(FoldModules {
            module: compile(&layout.fold_module)?,
            title: compile(&layout.fold_title)?,
            title_fallback: compile(&layout.fold_title_fallback)?,
            paragraph: compile(&layout.paragraph)?,
        })
    }

    fn is_dialogue_section(&self, module: ElementRef) -> bool {
        // The fallback label is only consulted when the module has no title element.
        let heading = module
            .select(&self.title)
            .next()
            .or_else(|| module.select(&self.title_fallback).next());

        match heading {
            Some(h) => {
                let text = stripped_text(h);
                debug!(heading = %text, "fold module");
                text.contains(DIALOGUE_SECTION_MARKER)
            }
            None => false,
        }
    }
}

impl Detector for FoldModules {
    fn name(&self) -> &'static str {
        "fold-modules"
    }

    fn detect(&self, doc: &Html, title: &str) -> Detection {
        let mut out = PageExtraction::default();
        for module in doc.select(&self.module) {
            if !self.is_dialogue_section(module) {
                continue;
            }
            for p in module.select(&self.paragraph) {
                if let Some(line) = classify(&stripped_text(p), title) {
                    out.push(line);
                }
            }
        }
        out.into()
    }
}

/// Layout A: an interactive dialogue container holding content nodes.
/// Containment alone decides relevance.
pub struct InteractiveDialogue {
    container: Selector,
    node: Selector,
    paragraph: Selector,
}

impl InteractiveDialogue {
    pub fn new(layout: &Layout) -> Result<Self, LayoutError> {
        Ok(InteractiveDialogue {
            container: compile(&layout.interactive_container)?,
            node: compile(&layout.content_node)?,
            paragraph: compile(&layout.paragraph)?,
        })
    }
}

impl Detector for InteractiveDialogue {
    fn name(&self) -> &'static str {
        "interactive-dialogue"
    }

    fn detect(&self, doc: &Html, title: &str) -> Detection {
        let mut out = PageExtraction::default();
        for container in doc.select(&self.container) {
            for node in container.select(&self.node) {
                for p in node.select(&self.paragraph) {
                    if let Some(line) = classify(&stripped_text(p), title) {
                        out.push(line);
                    }
                }
            }
        }
        out.into()
    }
}

fn compile(selector: &str) -> Result<Selector, LayoutError> {
    Selector::parse(selector).map_err(|e| LayoutError::InvalidSelector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

/// Text of every descendant text node, each trimmed, empty ones dropped,
/// joined without a separator.
pub fn stripped_text(el: ElementRef) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect()
}
