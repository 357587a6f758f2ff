use serde_json::{Map, Value};

/// Field names that may carry the speaker, most specific first.
pub const SPEAKER_KEYS: &[&str] = &["speaker", "角色", "actor", "speaker_id", "sid", "role", "speakerId"];

/// Keys checked inside nested objects when no top-level key matched.
pub const NESTED_SPEAKER_KEYS: &[&str] = &["speaker", "actor"];

/// One way of locating the speaker field in a record.
pub trait SpeakerProbe {
    fn probe<'a>(&self, record: &'a Map<String, Value>) -> Option<&'a Value>;
}

/// First key in the list that is present on the record itself.
pub struct TopLevelKeys(pub &'static [&'static str]);

impl SpeakerProbe for TopLevelKeys {
    fn probe<'a>(&self, record: &'a Map<String, Value>) -> Option<&'a Value> {
        self.0.iter().find_map(|key| record.get(*key))
    }
}

/// Look one level down: the first object-valued field holding one of the keys.
pub struct NestedKeys(pub &'static [&'static str]);

impl SpeakerProbe for NestedKeys {
    fn probe<'a>(&self, record: &'a Map<String, Value>) -> Option<&'a Value> {
        record
            .values()
            .filter_map(Value::as_object)
            .find_map(|inner| self.0.iter().find_map(|key| inner.get(*key)))
    }
}

/// Ordered probes; the first hit wins.
pub struct ProbeChain {
    probes: Vec<Box<dyn SpeakerProbe>>,
}

impl Default for ProbeChain {
    fn default() -> Self {
        ProbeChain::new(vec![
            Box::new(TopLevelKeys(SPEAKER_KEYS)),
            Box::new(NestedKeys(NESTED_SPEAKER_KEYS)),
        ])
    }
}

impl ProbeChain {
    pub fn new(probes: Vec<Box<dyn SpeakerProbe>>) -> Self {
        ProbeChain { probes }
    }

    /// Non-object records never have a speaker.
    pub fn find<'a>(&self, record: &'a Value) -> Option<&'a Value> {
        let obj = record.as_object()?;
        self.probes.iter().find_map(|p| p.probe(obj))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn top_level_priority_follows_key_order() {
        let chain = ProbeChain::default();
        let rec = json!({"role": "路人", "actor": "派蒙", "text": "…"});
        assert_eq!(chain.find(&rec), Some(&json!("派蒙")));

        let rec = json!({"sid": 7, "角色": "凯亚"});
        assert_eq!(chain.find(&rec), Some(&json!("凯亚")));
    }

    #[test]
    fn nested_only_when_top_level_misses() {
        let chain = ProbeChain::default();
        let rec = json!({"meta": {"speaker": "内层"}, "speaker": "外层"});
        assert_eq!(chain.find(&rec), Some(&json!("外层")));

        let rec = json!({"line": "你好", "meta": {"actor": "琴"}});
        assert_eq!(chain.find(&rec), Some(&json!("琴")));
    }

    #[test]
    fn nested_role_is_not_probed() {
        let chain = ProbeChain::default();
        let rec = json!({"meta": {"role": "琴"}});
        assert_eq!(chain.find(&rec), None);
    }

    #[test]
    fn only_one_level_deep() {
        let chain = ProbeChain::default();
        let rec = json!({"a": {"b": {"speaker": "太深"}}});
        assert_eq!(chain.find(&rec), None);
    }

    #[test]
    fn present_null_still_counts_as_hit() {
        let chain = ProbeChain::default();
        let rec = json!({"speaker": null, "actor": "派蒙"});
        assert_eq!(chain.find(&rec), Some(&Value::Null));
    }

    #[test]
    fn non_objects_have_no_speaker() {
        let chain = ProbeChain::default();
        assert_eq!(chain.find(&json!("派蒙：你好")), None);
        assert_eq!(chain.find(&json!([{"speaker": "派蒙"}])), None);
    }

    #[test]
    fn custom_chain() {
        let chain = ProbeChain::new(vec![Box::new(TopLevelKeys(&["who"]))]);
        assert_eq!(chain.find(&json!({"who": "温迪", "speaker": "x"})), Some(&json!("温迪")));
    }
}
