use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

/// One page to visit.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PageRef {
    pub title: String,
    pub url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to open manifest {path:?}: {source}")]
    Open { path: PathBuf, source: std::io::Error },
    #[error("manifest row {row}: {source}")]
    Row { row: usize, source: csv::Error },
    #[error("manifest row {row}: empty {column}")]
    Empty { row: usize, column: &'static str },
}

/// Load the `title,url` manifest written by the link collector. Column order
/// does not matter and extra columns are ignored. A row without a title or
/// url fails the whole load.
pub fn load(path: &Path) -> Result<Vec<PageRef>, ManifestError> {
    let file = std::fs::File::open(path).map_err(|source| ManifestError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let pages = parse(file)?;
    info!("Loaded {} pages from {:?}", pages.len(), path);
    Ok(pages)
}

pub fn parse<R: Read>(reader: R) -> Result<Vec<PageRef>, ManifestError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut pages = Vec::new();

    for (i, record) in rdr.deserialize::<PageRef>().enumerate() {
        // Header is line 1, so the first data row is row 2.
        let row = i + 2;
        let page = record.map_err(|source| ManifestError::Row { row, source })?;
        if page.url.is_empty() {
            return Err(ManifestError::Empty { row, column: "url" });
        }
        if page.title.is_empty() {
            return Err(ManifestError::Empty { row, column: "title" });
        }
        pages.push(page);
    }

    Ok(pages)
}
