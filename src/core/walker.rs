//! Label by label traversal bookkeeping.
//!
//! Tracks the labels left to resolve, the zone to resolve them in, and the
//! remaining delegation budget. Performs no I/O.

use std::collections::HashMap;
use std::str::FromStr;

use crate::common::{BoxSelector, ZoneKey};
use crate::error::LookupError;

/// Label resolved when a zone itself, rather than a name inside it, is looked up.
pub const APEX_LABEL: &str = "@";
pub const MAX_LABEL_LENGTH: usize = 63;
pub const MAX_NAME_LENGTH: usize = 253;

#[derive(Debug, Clone, PartialEq)]
/// The next label to resolve and where.
pub struct Step {
    pub zone: ZoneKey,
    pub label: String,
    /// No labels remain after this one.
    pub is_final: bool,
    pub selector: Option<BoxSelector>,
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Recursion budget exhausted")]
pub struct BudgetExhausted;

#[derive(Debug, Clone)]
pub struct Walker {
    /// Labels still to resolve, leftmost first; resolution pops from the end.
    labels: Vec<String>,
    zone: ZoneKey,
    /// Delegations that may still be followed.
    budget: u32,
    /// `_service._protocol` labels consumed as a box selector.
    selector: Option<(BoxSelector, [String; 2])>,
}

/// Split a dotted name into lowercase labels, leftmost first.
pub fn split_name(name: &str) -> Result<Vec<String>, LookupError> {
    let name = name.strip_suffix('.').unwrap_or(name);

    if name.is_empty() {
        return Err(LookupError::EmptyName);
    }

    if name.len() > MAX_NAME_LENGTH {
        return Err(LookupError::NameTooLong);
    }

    name.split('.')
        .map(|label| {
            if label.is_empty() {
                Err(LookupError::EmptyLabel(name.to_string()))
            } else if label.len() > MAX_LABEL_LENGTH {
                Err(LookupError::LabelTooLong(label.to_string()))
            } else {
                Ok(label.to_lowercase())
            }
        })
        .collect()
}

impl Walker {
    pub fn new(zone: ZoneKey, labels: Vec<String>, budget: u32) -> Self {
        Walker {
            labels,
            zone,
            budget,
            selector: None,
        }
    }

    // === Getters ===

    pub fn zone(&self) -> &ZoneKey {
        &self.zone
    }

    pub fn budget(&self) -> u32 {
        self.budget
    }

    /// Labels left to resolve, leftmost first.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    // === Public Methods ===

    /// Replace the zone if the top level label is one of the configured `suffixes`.
    ///
    /// A configured suffix is an alias for a local zone, so it costs no budget.
    pub fn substitute_suffix(&mut self, suffixes: &HashMap<String, ZoneKey>) -> bool {
        let Some(zone) = self.labels.last().and_then(|tld| suffixes.get(tld)) else {
            return false;
        };

        self.zone = *zone;
        self.labels.pop();

        true
    }

    /// Pop the top level label if it is a zone key.
    pub fn take_zone_key_tld(&mut self) -> Option<ZoneKey> {
        let zone = self
            .labels
            .last()
            .and_then(|tld| ZoneKey::from_str(tld).ok())?;

        self.labels.pop();

        Some(zone)
    }

    /// Produce the next label to resolve, the rightmost remaining one.
    ///
    /// Once no labels remain, the apex of the current zone is resolved.
    pub fn next_step(&mut self) -> Step {
        let label = self
            .labels
            .pop()
            .unwrap_or_else(|| APEX_LABEL.to_string());

        self.consume_selector();

        Step {
            zone: self.zone,
            label,
            is_final: self.labels.is_empty(),
            selector: self.selector.as_ref().map(|(selector, _)| *selector),
        }
    }

    /// Continue in `zone`, spending one unit of budget.
    pub fn delegate(&mut self, zone: ZoneKey) -> Result<(), BudgetExhausted> {
        self.budget = self.budget.checked_sub(1).ok_or(BudgetExhausted)?;
        self.zone = zone;

        Ok(())
    }

    /// Name to ask a legacy DNS authority for: the labels left of the delegation,
    /// followed by the authority's own name.
    pub fn dns_name(&self, authority: &str) -> String {
        self.selector
            .iter()
            .flat_map(|(_, labels)| labels.iter())
            .chain(self.labels.iter())
            .map(String::as_str)
            .chain(std::iter::once(authority))
            .collect::<Vec<_>>()
            .join(".")
    }

    // === Private Methods ===

    /// Exactly two `_` prefixed labels left select BOX records instead of being resolved.
    fn consume_selector(&mut self) {
        if self.selector.is_some() || self.labels.len() != 2 {
            return;
        }

        if let Some(selector) = BoxSelector::from_labels(&self.labels[0], &self.labels[1]) {
            let protocol = self.labels.pop().unwrap_or_default();
            let service = self.labels.pop().unwrap_or_default();

            self.selector = Some((selector, [service, protocol]));
        }
    }
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::SigningKey;

    use super::*;

    fn zone(seed: u8) -> ZoneKey {
        (&SigningKey::from_bytes(&[seed; 32])).into()
    }

    fn walker(name: &str, budget: u32) -> Walker {
        Walker::new(zone(1), split_name(name).unwrap(), budget)
    }

    #[test]
    fn split_validates_labels() {
        assert_eq!(
            split_name("WWW.Example.").unwrap(),
            vec!["www".to_string(), "example".to_string()]
        );
        assert_eq!(split_name(""), Err(LookupError::EmptyName));
        assert_eq!(split_name("."), Err(LookupError::EmptyName));
        assert!(matches!(
            split_name("a..b"),
            Err(LookupError::EmptyLabel(_))
        ));
        assert!(matches!(
            split_name(&"a".repeat(64)),
            Err(LookupError::LabelTooLong(_))
        ));
        assert_eq!(
            split_name(&["abc"; 64].join(".")),
            Err(LookupError::NameTooLong)
        );
    }

    #[test]
    fn labels_resolve_right_to_left() {
        let mut walker = walker("a.b.c", 0);

        let steps: Vec<_> = (0..3).map(|_| walker.next_step()).collect();

        assert_eq!(
            steps.iter().map(|s| s.label.as_str()).collect::<Vec<_>>(),
            vec!["c", "b", "a"]
        );
        assert_eq!(
            steps.iter().map(|s| s.is_final).collect::<Vec<_>>(),
            vec![false, false, true]
        );
    }

    #[test]
    fn apex_after_last_label() {
        let mut walker = walker("www", 1);

        assert_eq!(walker.next_step().label, "www");

        walker.delegate(zone(2)).unwrap();
        let step = walker.next_step();

        assert_eq!(step.label, APEX_LABEL);
        assert_eq!(step.zone, zone(2));
        assert!(step.is_final);
    }

    #[test]
    fn budget_bounds_delegations() {
        let mut walker = walker("a.b", 2);

        assert!(walker.delegate(zone(2)).is_ok());
        assert!(walker.delegate(zone(2)).is_ok());
        assert_eq!(walker.delegate(zone(3)), Err(BudgetExhausted));
        assert_eq!(walker.budget(), 0);
        assert_eq!(walker.zone(), &zone(2));
    }

    #[test]
    fn zone_key_tld() {
        let target = zone(9);
        let mut walker = walker(&format!("dummy.{}", target), 1);

        assert_eq!(walker.take_zone_key_tld(), Some(target));
        assert_eq!(walker.labels(), &["dummy".to_string()]);
        assert_eq!(walker.take_zone_key_tld(), None);
    }

    #[test]
    fn configured_suffix_costs_nothing() {
        let mut suffixes = HashMap::new();
        suffixes.insert("gnu".to_string(), zone(4));

        let mut walker = walker("www.gnu", 0);

        assert!(walker.substitute_suffix(&suffixes));
        assert_eq!(walker.zone(), &zone(4));
        assert_eq!(walker.budget(), 0);
        assert_eq!(walker.next_step().label, "www");
    }

    #[test]
    fn box_selector_labels_are_consumed() {
        let mut walker = walker("_443._tcp.www", 0);

        let step = walker.next_step();

        assert_eq!(step.label, "www");
        assert!(step.is_final);
        assert_eq!(
            step.selector,
            Some(BoxSelector {
                service: 443,
                protocol: 6
            })
        );
        assert_eq!(walker.dns_name("example.com"), "_443._tcp.example.com");
    }

    #[test]
    fn dns_name_keeps_remaining_labels() {
        let mut walker = walker("www.sub.zone", 0);

        walker.next_step();

        assert_eq!(walker.dns_name("example.com"), "www.sub.example.com");
    }
}
