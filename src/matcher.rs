use std::collections::HashMap;

use regex::Regex;

use crate::models::{generate_pattern, SiteMap};

const ENABLE_LOGS: bool = true;

use crate::log_warn;

/// Result of matching a URL against the registered sites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteMatch {
    pub site_id: String,
    /// Set when the record had no stored pattern and one was generated for
    /// this lookup; callers may persist it.
    pub generated_pattern: Option<String>,
}

/// Finds which monitored site a URL belongs to.
///
/// Compiled patterns are cached by their source text. Sites are tried in
/// stored order and the first hit wins, so overlapping patterns resolve by
/// insertion order.
#[derive(Debug, Default)]
pub struct PatternMatcher {
    // `None` marks a pattern that failed to compile.
    compiled: HashMap<String, Option<Regex>>,
}

impl PatternMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_matching_site(&mut self, sites: &SiteMap, url: &str) -> Option<SiteMatch> {
        if sites.is_empty() {
            return None;
        }

        for (site_id, record) in sites.iter() {
            let (pattern, generated) = match &record.pattern {
                Some(pattern) => (pattern.clone(), false),
                None => (generate_pattern(site_id), true),
            };

            let matched = match self.regex_for(&pattern) {
                Some(re) => re.is_match(url),
                None => {
                    let fallback = generate_pattern(site_id);
                    self.regex_for(&fallback)
                        .map(|re| re.is_match(url))
                        .unwrap_or(false)
                }
            };

            if matched {
                return Some(SiteMatch {
                    site_id: site_id.to_string(),
                    generated_pattern: generated.then_some(pattern),
                });
            }
        }

        None
    }

    fn regex_for(&mut self, pattern: &str) -> Option<&Regex> {
        self.compiled
            .entry(pattern.to_string())
            .or_insert_with(|| match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(err) => {
                    log_warn!("stored pattern {pattern:?} does not compile, using site prefix: {err}");
                    None
                }
            })
            .as_ref()
    }
}
