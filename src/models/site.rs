//! Persisted per-site configuration and usage counters.
//!
//! The `sites` storage entry is a JSON object keyed by site id (a base URL
//! such as `https://example.com`). Key order is insertion order and is
//! significant: pattern matching walks sites in that order.

use std::fmt;

use serde::{
    de::{MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteRecord {
    /// Regular expression matching every URL of the site. Older records
    /// may lack it; see [`generate_pattern`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, alias = "time")]
    pub daily_limit_seconds: u64,
    #[serde(default)]
    pub accumulated_seconds: u64,
    /// Start of the running timing session. Zero is treated as unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_start_epoch_ms: Option<i64>,
    /// When the most recent session ended or the site was last blocked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_session_epoch_ms: Option<i64>,
    #[serde(default)]
    pub blocked: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub total_visits: u64,
    #[serde(default)]
    pub total_visits_when_blocked: u64,
    #[serde(default)]
    pub unlocks: u64,
    #[serde(default)]
    pub unlock_msgs: Vec<String>,
}

impl SiteRecord {
    pub fn new(site_id: &str, message: impl Into<String>, daily_limit_seconds: u64) -> Self {
        Self {
            pattern: Some(generate_pattern(site_id)),
            daily_limit_seconds,
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn session_start(&self) -> Option<i64> {
        self.session_start_epoch_ms.filter(|ms| *ms > 0)
    }

    /// Latest timestamp tying the record to a calendar day, used for the
    /// daily rollover.
    pub fn day_anchor(&self) -> Option<i64> {
        let last = self.last_session_epoch_ms.filter(|ms| *ms > 0);
        match (self.session_start(), last) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn remaining_seconds(&self) -> i64 {
        self.daily_limit_seconds as i64 - self.accumulated_seconds as i64
    }
}

/// Anchored pattern matching any URL that starts with `site_id`.
pub fn generate_pattern(site_id: &str) -> String {
    format!("^{}.*$", regex::escape(site_id))
}

/// Payload the blocked page reads (and clears) to explain the redirect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedNotice {
    pub url: String,
    pub message: String,
}

/// Site records in stored order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteMap {
    entries: Vec<(String, SiteRecord)>,
}

impl SiteMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, site_id: &str) -> Option<&SiteRecord> {
        self.entries
            .iter()
            .find(|(id, _)| id == site_id)
            .map(|(_, record)| record)
    }

    pub fn get_mut(&mut self, site_id: &str) -> Option<&mut SiteRecord> {
        self.entries
            .iter_mut()
            .find(|(id, _)| id == site_id)
            .map(|(_, record)| record)
    }

    /// Replaces an existing record in place, otherwise appends.
    pub fn insert(&mut self, site_id: impl Into<String>, record: SiteRecord) {
        let site_id = site_id.into();
        match self.get_mut(&site_id) {
            Some(existing) => *existing = record,
            None => self.entries.push((site_id, record)),
        }
    }

    pub fn remove(&mut self, site_id: &str) -> Option<SiteRecord> {
        let index = self.entries.iter().position(|(id, _)| id == site_id)?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SiteRecord)> {
        self.entries.iter().map(|(id, record)| (id.as_str(), record))
    }
}

impl Serialize for SiteMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (id, record) in &self.entries {
            map.serialize_entry(id, record)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SiteMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SiteMapVisitor;

        impl<'de> Visitor<'de> for SiteMapVisitor {
            type Value = SiteMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of site ids to site records")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<SiteMap, A::Error> {
                let mut sites = SiteMap::new();
                while let Some((id, record)) = access.next_entry::<String, SiteRecord>()? {
                    sites.insert(id, record);
                }
                Ok(sites)
            }
        }

        deserializer.deserialize_map(SiteMapVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;
    use serde_json::json;

    #[test]
    fn generated_pattern_escapes_and_anchors() {
        let pattern = generate_pattern("https://example.com");
        assert_eq!(pattern, r"^https://example\.com.*$");

        let re = Regex::new(&pattern).unwrap();
        assert!(re.is_match("https://example.com/foo?x=1"));
        assert!(!re.is_match("https://notexample.com"));
        assert!(!re.is_match("https://exampleXcom"));
    }

    #[test]
    fn legacy_record_fields_are_accepted() {
        let record: SiteRecord = serde_json::from_value(json!({
            "message": "go outside",
            "time": 1800,
            "blocked": false,
            "unlocks": 2,
            "totalVisits": 7
        }))
        .unwrap();

        assert_eq!(record.daily_limit_seconds, 1800);
        assert_eq!(record.unlocks, 2);
        assert_eq!(record.total_visits, 7);
        assert!(record.pattern.is_none());
        assert!(record.unlock_msgs.is_empty());
    }

    #[test]
    fn zero_session_start_counts_as_unset() {
        let record = SiteRecord {
            session_start_epoch_ms: Some(0),
            ..SiteRecord::default()
        };
        assert_eq!(record.session_start(), None);
        assert_eq!(record.day_anchor(), None);
    }

    #[test]
    fn day_anchor_prefers_latest_timestamp() {
        let record = SiteRecord {
            session_start_epoch_ms: Some(5_000),
            last_session_epoch_ms: Some(9_000),
            ..SiteRecord::default()
        };
        assert_eq!(record.day_anchor(), Some(9_000));
    }

    #[test]
    fn site_map_keeps_stored_order() {
        let raw = r#"{"https://zeta.io":{"time":60},"https://alpha.io":{"time":30}}"#;
        let sites: SiteMap = serde_json::from_str(raw).unwrap();

        let ids: Vec<&str> = sites.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["https://zeta.io", "https://alpha.io"]);

        let value = serde_json::to_value(&sites).unwrap();
        let back: SiteMap = serde_json::from_value(value).unwrap();
        assert_eq!(back, sites);
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut sites = SiteMap::new();
        sites.insert("a", SiteRecord::new("a", "", 10));
        sites.insert("b", SiteRecord::new("b", "", 20));
        sites.insert("a", SiteRecord::new("a", "", 99));

        let ids: Vec<&str> = sites.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(sites.get("a").unwrap().daily_limit_seconds, 99);

        assert!(sites.remove("a").is_some());
        assert!(sites.remove("a").is_none());
        assert_eq!(sites.len(), 1);
    }
}
