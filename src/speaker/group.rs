use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{info, warn};

use super::probe::ProbeChain;
use super::Roster;
use crate::corpus::{to_pretty_json, write_replace};

const BUCKET_INDENT: &[u8] = b"  ";

/// Target of one bucket file: `<out>/<bucket>/<source>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketKey {
    pub bucket: String,
    pub source: String,
}

pub type Buckets = BTreeMap<BucketKey, Vec<Value>>;

#[derive(Debug, Default)]
pub struct GroupReport {
    pub files_read: usize,
    pub files_skipped: usize,
    pub files_written: usize,
    pub write_failures: usize,
    /// Entries per bucket across all source files.
    pub counts: BTreeMap<String, usize>,
    /// Set when the input could not be listed or the output directory could
    /// not be created.
    pub error: Option<String>,
}

impl GroupReport {
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn print(&self) {
        println!("Grouping done:");
        for (bucket, n) in &self.counts {
            println!("  {}: {}", bucket, n);
        }
        println!("  total: {}", self.total());
        println!(
            "Read {} files ({} skipped), wrote {} bucket files ({} failed).",
            self.files_read, self.files_skipped, self.files_written, self.write_failures
        );
        if let Some(e) = &self.error {
            println!("Grouping incomplete: {}", e);
        }
    }
}

/// Splits corpus files into per-speaker buckets. Every run rebuilds bucket
/// contents from scratch so an unchanged corpus yields identical files.
pub struct Grouper {
    roster: Roster,
    probes: ProbeChain,
}

impl Grouper {
    pub fn new(roster: Roster) -> Self {
        Grouper {
            roster,
            probes: ProbeChain::default(),
        }
    }

    pub fn bucket_of(&self, record: &Value) -> String {
        self.roster.bucket_for(self.probes.find(record))
    }

    /// Read every file and buffer its entries by bucket. Files that cannot be
    /// read or parsed are skipped.
    pub fn group(&self, files: &[PathBuf], report: &mut GroupReport) -> Buckets {
        let mut buckets = Buckets::new();

        for path in files {
            let data = match read_json(path) {
                Ok(v) => v,
                Err(e) => {
                    warn!("Skipping {:?}: {:#}", path, e);
                    report.files_skipped += 1;
                    continue;
                }
            };
            report.files_read += 1;

            let source = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            for item in entries_of(data) {
                let bucket = self.bucket_of(&item);
                *report.counts.entry(bucket.clone()).or_default() += 1;
                buckets
                    .entry(BucketKey {
                        bucket,
                        source: source.clone(),
                    })
                    .or_default()
                    .push(item);
            }
        }

        buckets
    }

    /// Write each bucket as the complete content of its file. A failed write
    /// is logged and the remaining buckets are still written.
    pub fn write(&self, buckets: &Buckets, out_dir: &Path, report: &mut GroupReport) {
        for (key, items) in buckets {
            let path = out_dir.join(&key.bucket).join(&key.source);
            let result = to_pretty_json(items, BUCKET_INDENT)
                .map_err(anyhow::Error::from)
                .and_then(|bytes| write_replace(&path, &bytes).map_err(anyhow::Error::from));
            match result {
                Ok(()) => report.files_written += 1,
                Err(e) => {
                    warn!("Failed to write {:?}: {:#}", path, e);
                    report.write_failures += 1;
                }
            }
        }
    }

    /// Group every `*.json` file in `dialogue_dir` into `out_dir`. Failures
    /// end up in the report so the summary can always be printed.
    pub fn run(&self, dialogue_dir: &Path, out_dir: &Path) -> GroupReport {
        let mut report = GroupReport::default();

        if !dialogue_dir.is_dir() {
            warn!("Dialogue directory {:?} does not exist", dialogue_dir);
            return report;
        }

        let files = match corpus_files(dialogue_dir) {
            Ok(files) => files,
            Err(e) => {
                warn!("{:#}", e);
                report.error = Some(format!("{:#}", e));
                return report;
            }
        };
        if files.is_empty() {
            warn!("No .json files in {:?}", dialogue_dir);
            return report;
        }
        info!("Grouping {} corpus files against {} roster names", files.len(), self.roster.len());

        let buckets = self.group(&files, &mut report);
        if let Err(e) = fs::create_dir_all(out_dir) {
            warn!("Failed to create {:?}: {}", out_dir, e);
            report.error = Some(format!("failed to create {:?}: {}", out_dir, e));
            report.write_failures = buckets.len();
            return report;
        }
        self.write(&buckets, out_dir, &mut report);
        report
    }
}

/// Sorted `*.json` files directly inside `dir`.
pub fn corpus_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to list {:?}", dir))? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|e| e == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Entries of a corpus document: an array as-is, an object's first
/// array-valued field, or the object itself as a single record.
pub fn entries_of(data: Value) -> Vec<Value> {
    match data {
        Value::Array(items) => items,
        Value::Object(map) => {
            if map.values().any(Value::is_array) {
                map.into_iter()
                    .find_map(|(_, v)| match v {
                        Value::Array(items) => Some(items),
                        _ => None,
                    })
                    .unwrap_or_default()
            } else {
                vec![Value::Object(map)]
            }
        }
        _ => Vec::new(),
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let raw = fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {:?}", path))
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speaker::OTHER_BUCKET;
    use serde_json::json;
    use tempfile::TempDir;

    fn grouper() -> Grouper {
        Grouper::new(Roster::new(["旅行者", "派蒙"]))
    }

    fn snapshot(dir: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
        let mut out = BTreeMap::new();
        for bucket in fs::read_dir(dir).unwrap() {
            let bucket = bucket.unwrap().path();
            for f in fs::read_dir(&bucket).unwrap() {
                let f = f.unwrap().path();
                out.insert(f.strip_prefix(dir).unwrap().to_path_buf(), fs::read(&f).unwrap());
            }
        }
        out
    }

    #[test]
    fn entries_of_shapes() {
        assert_eq!(entries_of(json!([1, 2])), vec![json!(1), json!(2)]);
        assert_eq!(
            entries_of(json!({"version": 1, "lines": [{"speaker": "派蒙"}], "more": [3]})),
            vec![json!({"speaker": "派蒙"})]
        );
        assert_eq!(
            entries_of(json!({"speaker": "派蒙", "text": "嗯"})),
            vec![json!({"speaker": "派蒙", "text": "嗯"})]
        );
        assert!(entries_of(json!("scalar")).is_empty());
    }

    #[test]
    fn single_roster_speaker_end_to_end() {
        let tmp = TempDir::new().unwrap();
        let dialogue = tmp.path().join("dialogue");
        let out = tmp.path().join("speaker");
        fs::create_dir_all(&dialogue).unwrap();
        fs::write(
            dialogue.join("a.json"),
            r#"[{"source_title":"T","speaker":"旅行者","text":"你好"}]"#,
        )
        .unwrap();

        let report = grouper().run(&dialogue, &out);
        assert_eq!(report.total(), 1);
        assert_eq!(report.counts.get("旅行者"), Some(&1));

        let written: Value =
            serde_json::from_str(&fs::read_to_string(out.join("旅行者/a.json")).unwrap()).unwrap();
        assert_eq!(
            written,
            json!([{"source_title":"T","speaker":"旅行者","text":"你好"}])
        );
        assert!(!out.join(OTHER_BUCKET).exists());
    }

    #[test]
    fn buckets_per_source_file_keep_order() {
        let tmp = TempDir::new().unwrap();
        let dialogue = tmp.path().join("dialogue");
        let out = tmp.path().join("speaker");
        fs::create_dir_all(&dialogue).unwrap();
        fs::write(
            dialogue.join("a.json"),
            r#"[{"speaker":"派蒙","text":"1"},{"speaker":"路人","text":"2"},{"speaker":"'派蒙'","text":"3"}]"#,
        )
        .unwrap();
        fs::write(dialogue.join("b.json"), r#"{"lines":[{"actor":"旅行者","text":"4"}]}"#).unwrap();
        fs::write(dialogue.join("notes.txt"), "ignored").unwrap();

        let report = grouper().run(&dialogue, &out);
        assert_eq!(report.files_read, 2);
        assert_eq!(report.total(), 4);

        let paimon: Vec<Value> =
            serde_json::from_str(&fs::read_to_string(out.join("派蒙/a.json")).unwrap()).unwrap();
        let texts: Vec<&str> = paimon.iter().map(|v| v["text"].as_str().unwrap()).collect();
        assert_eq!(texts, vec!["1", "3"]);
        // entries are copied verbatim, label decoration included
        assert_eq!(paimon[1]["speaker"], "'派蒙'");

        assert!(out.join("other/a.json").exists());
        assert!(out.join("旅行者/b.json").exists());
        assert!(!out.join("派蒙/b.json").exists());
    }

    #[test]
    fn rerun_is_byte_identical_and_never_appends() {
        let tmp = TempDir::new().unwrap();
        let dialogue = tmp.path().join("dialogue");
        let out = tmp.path().join("speaker");
        fs::create_dir_all(&dialogue).unwrap();
        fs::write(
            dialogue.join("world.json"),
            r#"[{"speaker":"派蒙","text":"一"},{"speaker":"凯亚","text":"二"},{"meta":{"speaker":"旅行者"}}]"#,
        )
        .unwrap();

        grouper().run(&dialogue, &out);
        let first = snapshot(&out);
        let report = grouper().run(&dialogue, &out);
        let second = snapshot(&out);

        assert_eq!(first, second);
        assert_eq!(report.total(), 3);
        let paimon: Vec<Value> =
            serde_json::from_str(&fs::read_to_string(out.join("派蒙/world.json")).unwrap()).unwrap();
        assert_eq!(paimon.len(), 1);
    }

    #[test]
    fn unreadable_file_skipped() {
        let tmp = TempDir::new().unwrap();
        let dialogue = tmp.path().join("dialogue");
        let out = tmp.path().join("speaker");
        fs::create_dir_all(&dialogue).unwrap();
        fs::write(dialogue.join("a.json"), "[{broken").unwrap();
        fs::write(dialogue.join("b.json"), r#"[{"speaker":"派蒙"}]"#).unwrap();

        let report = grouper().run(&dialogue, &out);
        assert_eq!(report.files_skipped, 1);
        assert_eq!(report.files_read, 1);
        assert_eq!(report.total(), 1);
        assert!(out.join("派蒙/b.json").exists());
    }

    #[test]
    fn failed_bucket_write_does_not_stop_others() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("speaker");
        fs::create_dir_all(&out).unwrap();
        // a plain file where the `other` bucket directory should go
        fs::write(out.join(OTHER_BUCKET), "").unwrap();

        let mut buckets = Buckets::new();
        buckets.insert(
            BucketKey { bucket: OTHER_BUCKET.into(), source: "a.json".into() },
            vec![json!({"speaker": "路人"})],
        );
        buckets.insert(
            BucketKey { bucket: "派蒙".into(), source: "a.json".into() },
            vec![json!({"speaker": "派蒙"})],
        );

        let mut report = GroupReport::default();
        grouper().write(&buckets, &out, &mut report);
        assert_eq!(report.write_failures, 1);
        assert_eq!(report.files_written, 1);
        assert!(out.join("派蒙/a.json").exists());
    }

    #[test]
    fn unusable_out_dir_still_yields_report() {
        let tmp = TempDir::new().unwrap();
        let dialogue = tmp.path().join("dialogue");
        fs::create_dir_all(&dialogue).unwrap();
        fs::write(dialogue.join("a.json"), r#"[{"speaker":"派蒙"},{"speaker":"路人"}]"#).unwrap();
        // a plain file where the output directory should go
        let out = tmp.path().join("speaker");
        fs::write(&out, "").unwrap();

        let report = grouper().run(&dialogue, &out);
        assert!(report.error.is_some());
        assert_eq!(report.files_read, 1);
        assert_eq!(report.total(), 2);
        assert_eq!(report.files_written, 0);
        assert_eq!(report.write_failures, 2);
    }

    #[test]
    fn missing_dialogue_dir_reported_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let report = grouper()
            .run(&tmp.path().join("absent"), &tmp.path().join("speaker"));
        assert_eq!(report.total(), 0);
        assert_eq!(report.files_read, 0);
    }
}
