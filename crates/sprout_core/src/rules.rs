//! Production rules: single-symbol-to-string substitution.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sentence::Sentence;

/// What `next_generation` does with a symbol that has no production.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum UnmappedPolicy {
    /// Copy the symbol into the next generation unchanged.
    #[default]
    PassThrough,
    /// Leave the symbol out of the next generation.
    Drop,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleParseError {
    #[error("rule {index} is missing '->': {text:?}")]
    MissingArrow { index: usize, text: String },
    #[error("rule {index} must rewrite exactly one symbol, found {found:?}")]
    InvalidPredecessor { index: usize, found: String },
    #[error("duplicate rule for symbol {0:?}")]
    DuplicateRule(char),
}

/// Stores `symbol -> replacement` relationships and uses them to evolve sentences.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleSet {
    #[serde(default = "default_fertile")]
    pub fertile: bool,
    #[serde(default)]
    pub rules: BTreeMap<char, String>,
    #[serde(default)]
    pub unmapped: UnmappedPolicy,
}

fn default_fertile() -> bool {
    true
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            fertile: true,
            rules: BTreeMap::new(),
            unmapped: UnmappedPolicy::default(),
        }
    }
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, symbol: char, replacement: &str) -> Self {
        self.rules.insert(symbol, replacement.to_string());
        self
    }

    pub fn with_policy(mut self, policy: UnmappedPolicy) -> Self {
        self.unmapped = policy;
        self
    }

    pub fn insert(&mut self, symbol: char, replacement: &str) -> Option<String> {
        self.rules.insert(symbol, replacement.to_string())
    }

    pub fn get(&self, symbol: char) -> Option<&str> {
        self.rules.get(&symbol).map(String::as_str)
    }

    /// Rewrites every symbol of `before` (the whole buffer, not just the
    /// unread tail). An infertile table always yields an empty sentence.
    pub fn next_generation(&self, before: &Sentence) -> Sentence {
        if !self.fertile {
            return Sentence::empty();
        }

        let mut after = String::with_capacity(before.len() * 2);
        for c in before.chars() {
            match self.rules.get(&c) {
                Some(replacement) => after.push_str(replacement),
                None => {
                    if self.unmapped == UnmappedPolicy::PassThrough {
                        after.push(c);
                    }
                }
            }
        }
        Sentence::new(&after)
    }

    /// Parses rules written as `F -> F[+F]F`, one per line or separated by `;`.
    /// Blank entries and `#` comments are skipped. The replacement may be empty.
    pub fn parse(input: &str) -> Result<RuleSet, RuleParseError> {
        let mut set = RuleSet::new();
        let entries = input
            .split(|c| c == '\n' || c == ';')
            .map(str::trim)
            .filter(|entry| !entry.is_empty() && !entry.starts_with('#'));

        for (index, entry) in entries.enumerate() {
            let (lhs, rhs) = entry
                .split_once("->")
                .ok_or_else(|| RuleParseError::MissingArrow {
                    index,
                    text: entry.to_string(),
                })?;

            let lhs = lhs.trim();
            let mut symbols = lhs.chars();
            let symbol = match (symbols.next(), symbols.next()) {
                (Some(symbol), None) => symbol,
                _ => {
                    return Err(RuleParseError::InvalidPredecessor {
                        index,
                        found: lhs.to_string(),
                    })
                }
            };

            let replacement: String = rhs.chars().filter(|c| !c.is_whitespace()).collect();
            if set.rules.insert(symbol, replacement).is_some() {
                return Err(RuleParseError::DuplicateRule(symbol));
            }
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_generation_substitutes_and_passes_through() {
        let rules = RuleSet::new().with_rule('A', "AB");
        let next = rules.next_generation(&Sentence::new("ACA"));
        assert_eq!(next.to_string(), "ABCAB");
        assert_eq!(next.position(), -1);
    }

    #[test]
    fn drop_policy_removes_unmapped_symbols() {
        let rules = RuleSet::new()
            .with_rule('A', "AB")
            .with_policy(UnmappedPolicy::Drop);
        let next = rules.next_generation(&Sentence::new("ACA"));
        assert_eq!(next.to_string(), "ABAB");
    }

    #[test]
    fn infertile_rules_yield_empty_sentence() {
        let mut rules = RuleSet::new().with_rule('A', "AB");
        rules.fertile = false;
        for input in ["", "A", "XYZ", "A[B]A"] {
            assert!(rules.next_generation(&Sentence::new(input)).is_empty());
        }
    }

    #[test]
    fn next_generation_is_deterministic() {
        let rules = RuleSet::new().with_rule('F', "F[+F]F").with_rule('+', "-");
        let seed = Sentence::new("F+F");
        let first = rules.next_generation(&rules.next_generation(&seed));
        let second = rules.next_generation(&rules.next_generation(&seed));
        assert_eq!(first.to_string(), second.to_string());
    }

    #[test]
    fn next_generation_does_not_mutate_table() {
        let rules = RuleSet::new().with_rule('A', "AB");
        let snapshot = rules.clone();
        let _ = rules.next_generation(&Sentence::new("AAA"));
        assert_eq!(rules, snapshot);
    }

    #[test]
    fn parse_reads_lines_and_separators() {
        let rules = RuleSet::parse("F -> F[+F]F\n# comment\nX -> ; Y->XY").expect("valid rules");
        assert_eq!(rules.get('F'), Some("F[+F]F"));
        assert_eq!(rules.get('X'), Some(""));
        assert_eq!(rules.get('Y'), Some("XY"));
        assert!(rules.fertile);
    }

    #[test]
    fn parse_reports_malformed_rules() {
        assert!(matches!(
            RuleSet::parse("F = FF"),
            Err(RuleParseError::MissingArrow { index: 0, .. })
        ));
        assert!(matches!(
            RuleSet::parse("FF -> F"),
            Err(RuleParseError::InvalidPredecessor { .. })
        ));
        assert_eq!(
            RuleSet::parse("F -> A; F -> B"),
            Err(RuleParseError::DuplicateRule('F'))
        );
    }
}
