use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "questline.toml";
const ENV_PREFIX: &str = "QUESTLINE";

/// Playable characters plus the traveller and companion. Labels outside this
/// set are grouped under `other`.
const DEFAULT_ROSTER: &[&str] = &[
    "旅行者", "派蒙", "纳西妲", "安柏", "砂糖", "芭芭拉", "凯亚", "丽莎", "罗莎莉亚", "诺艾尔",
    "菲谢尔", "班尼特", "迪卢克", "琴", "温迪", "可莉", "钟离", "刻晴", "凝光", "七七",
    "迪奥娜", "莫娜", "行秋", "重云", "雷泽", "早柚", "八重神子", "神里绫华", "神里绫人", "久岐忍",
    "鹿野院平藏", "宵宫", "烟绯", "云堇", "夜兰", "荒泷一斗", "五郎", "珊瑚宫心海", "多莉", "提纳里",
    "柯莱", "赛诺", "坎蒂丝", "莱依拉", "辛焱", "托马", "米卡", "卡维", "绮良良", "瑶瑶",
    "阿贝多", "菲米尼", "夏洛蒂", "优菈", "林尼", "枫原万叶", "卡齐娜", "胡桃", "那维莱特", "迪希雅",
    "艾尔海森", "达达利亚", "魈", "甘雨", "白术", "克洛琳德", "阿蕾奇诺", "梦见月瑞希", "蓝砚", "莱欧斯利",
    "希格雯", "嘉明", "夏沃蕾", "瓦雷莎", "北斗", "闲云", "妮露", "希诺宁", "奈芙尔", "娜维娅",
    "爱诺", "爱可菲", "九条裟罗", "琳妮特", "千织", "珐露珊", "雷电将军", "基尼奇", "菲林斯", "芙宁娜",
    "塔利雅", "申鹤", "丝柯克", "香菱", "伊安珊", "艾梅莉埃", "玛薇卡", "赛索斯", "茜特菈莉", "伊涅芙",
    "伊法", "欧洛伦", "菈乌玛", "玛拉妮", "恰斯卡", "流浪者", "埃洛伊",
];

/// Static run configuration. Built once in `main` and handed to each stage;
/// nothing reads process-wide state after that.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub roster: Vec<String>,
    pub paths: Paths,
    pub fetch: FetchSettings,
    pub layout: Layout,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Paths {
    /// CSV with `title` and `url` columns.
    pub manifest: PathBuf,
    /// Directory holding every corpus file fed to grouping.
    pub dialogue_dir: PathBuf,
    /// Canonical corpus that batches are merged into.
    pub corpus_file: PathBuf,
    /// Dialogue batch written by a scrape, waiting to be merged.
    pub extracted_file: PathBuf,
    /// Dialogue recovered from the narrative artifact. Kept apart from
    /// `extracted_file` so a re-extraction never clobbers an unmerged scrape.
    pub reextracted_file: PathBuf,
    pub narrative_file: PathBuf,
    pub error_manifest: PathBuf,
    pub speaker_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub timeout_secs: u64,
    pub delay_min_ms: u64,
    pub delay_max_ms: u64,
    pub user_agent: String,
}

/// CSS selectors for the two page layouts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Layout {
    pub fold_module: String,
    pub fold_title: String,
    pub fold_title_fallback: String,
    pub interactive_container: String,
    pub content_node: String,
    pub paragraph: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            roster: DEFAULT_ROSTER.iter().map(|s| s.to_string()).collect(),
            paths: Paths::default(),
            fetch: FetchSettings::default(),
            layout: Layout::default(),
        }
    }
}

impl Default for Paths {
    fn default() -> Self {
        Paths {
            manifest: PathBuf::from("urls/dialogue_urls_world.csv"),
            dialogue_dir: PathBuf::from("dialogue"),
            corpus_file: PathBuf::from("dialogue/dialogue_data_world.json"),
            extracted_file: PathBuf::from("extraction/extracted_world.json"),
            reextracted_file: PathBuf::from("extraction/extracted_from_world.json"),
            narrative_file: PathBuf::from("narration/narrative_data_world.txt"),
            error_manifest: PathBuf::from("url_error.txt"),
            speaker_dir: PathBuf::from("speaker"),
        }
    }
}

impl Default for FetchSettings {
    fn default() -> Self {
        FetchSettings {
            timeout_secs: 10,
            delay_min_ms: 200,
            delay_max_ms: 500,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36"
                .to_string(),
        }
    }
}

impl Default for Layout {
    fn default() -> Self {
        Layout {
            fold_module: "div.obc-tmpl-fold".into(),
            fold_title: "div.obc-tmpl-fold__title".into(),
            fold_title_fallback: "span".into(),
            interactive_container: "div.obc-tmpl-interactiveDialogue".into(),
            content_node: "div.content-box".into(),
            paragraph: "p".into(),
        }
    }
}

impl Settings {
    /// Layer `QUESTLINE_*` environment variables over an optional TOML file.
    /// Nested keys use `__`, e.g. `QUESTLINE_PATHS__SPEAKER_DIR`; the roster
    /// takes a comma-separated list. A missing file is fine; a malformed one
    /// is not.
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    fn load_with_prefix(path: &Path, env_prefix: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("roster"),
            )
            .build()
            .with_context(|| format!("Failed to load settings from {:?}", path))?;

        settings
            .try_deserialize()
            .with_context(|| format!("Invalid settings in {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let s = Settings::default();
        assert!(s.roster.iter().any(|r| r == "旅行者"));
        assert!(s.roster.iter().any(|r| r == "派蒙"));
        assert!(s.fetch.delay_min_ms <= s.fetch.delay_max_ms);
        assert_eq!(s.layout.paragraph, "p");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let s = Settings::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(s.paths.speaker_dir, PathBuf::from("speaker"));
        assert_eq!(s.fetch.timeout_secs, 10);
    }

    #[test]
    fn file_overrides_selected_fields() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("questline.toml");
        std::fs::write(
            &path,
            "roster = [\"甲\", \"乙\"]\n\n[paths]\nspeaker_dir = \"out/speakers\"\n\n[fetch]\ntimeout_secs = 3\n",
        )
        .unwrap();

        let s = Settings::load(&path).unwrap();
        assert_eq!(s.roster, vec!["甲".to_string(), "乙".to_string()]);
        assert_eq!(s.paths.speaker_dir, PathBuf::from("out/speakers"));
        assert_eq!(s.paths.dialogue_dir, PathBuf::from("dialogue"));
        assert_eq!(s.fetch.timeout_secs, 3);
        assert_eq!(s.fetch.delay_max_ms, 500);
    }

    #[test]
    fn env_overrides_file() {
        // Own prefix so the variables cannot leak into the other tests.
        const PREFIX: &str = "QLENVTEST";
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("questline.toml");
        std::fs::write(
            &path,
            "roster = [\"丙\"]\n\n[paths]\nspeaker_dir = \"from-file\"\ndialogue_dir = \"kept\"\n",
        )
        .unwrap();

        std::env::set_var("QLENVTEST_ROSTER", "甲,乙");
        std::env::set_var("QLENVTEST_PATHS__SPEAKER_DIR", "envdir");
        let loaded = Settings::load_with_prefix(&path, PREFIX);
        std::env::remove_var("QLENVTEST_ROSTER");
        std::env::remove_var("QLENVTEST_PATHS__SPEAKER_DIR");

        let s = loaded.unwrap();
        assert_eq!(s.roster, vec!["甲".to_string(), "乙".to_string()]);
        assert_eq!(s.paths.speaker_dir, PathBuf::from("envdir"));
        assert_eq!(s.paths.dialogue_dir, PathBuf::from("kept"));
    }

    #[test]
    fn scrape_and_reextract_outputs_differ() {
        let p = Paths::default();
        assert_ne!(p.extracted_file, p.reextracted_file);
    }
}
