//! Selection of the usable records of one label.
//!
//! Pure function of the raw record set, the requested type and the evaluation time.

use crate::common::{BoxSelector, BoxedRecord, Record, RecordType, Timestamp};
use crate::registry::RecordTypes;

#[derive(Debug, Clone, Default, PartialEq)]
/// Records of one label, sorted by the role they play in the resolution.
pub struct Classified {
    /// Records answering the requested type.
    pub answers: Vec<Record>,
    /// Zone delegations, surfaced whatever type was requested.
    pub delegations: Vec<Record>,
    /// Legacy DNS delegations, surfaced whatever type was requested.
    pub dns_bridges: Vec<Record>,
}

/// Classify `raw` records of a single label.
///
/// 1. Records expiring at or before `now` are dropped.
/// 2. For every record type of interest, unflagged records win; shadow records of that
///    type are only used when no unflagged record of the same type survived.
/// 3. With a `selector`, answers come from the BOX records it selects, unwrapped and
///    classified again against the same requested type.
/// 4. Delegation records are always returned, regardless of `requested`.
pub fn classify(
    raw: &[Record],
    requested: RecordType,
    now: Timestamp,
    types: &dyn RecordTypes,
    selector: Option<&BoxSelector>,
) -> Classified {
    let live: Vec<&Record> = raw.iter().filter(|record| !record.is_expired(now)).collect();

    let answers = match selector {
        Some(selector) => {
            let unwrapped: Vec<Record> = select(&live, |t| types.is_box(t))
                .into_iter()
                .filter_map(|outer| {
                    let boxed = BoxedRecord::decode(&outer.data).ok()?;
                    boxed
                        .selected_by(selector)
                        .then(|| boxed.unwrap_into(&outer))
                })
                .collect();

            classify(&unwrapped, requested, now, types, None).answers
        }
        None => select(&live, |t| requested.matches(t)),
    };

    Classified {
        answers,
        delegations: select(&live, |t| types.is_delegation(t)),
        dns_bridges: select(&live, |t| types.is_dns_bridge(t)),
    }
}

/// Apply the shadow fallback to every type accepted by `wanted`, keeping record order.
fn select(records: &[&Record], wanted: impl Fn(RecordType) -> bool) -> Vec<Record> {
    let mut selected_types = Vec::new();

    for record in records {
        if wanted(record.record_type) && !selected_types.contains(&record.record_type) {
            selected_types.push(record.record_type);
        }
    }

    let mut selected = Vec::new();

    for record_type in selected_types {
        let has_active = records
            .iter()
            .any(|r| r.record_type == record_type && !r.is_shadow());

        selected.extend(
            records
                .iter()
                .filter(|r| r.record_type == record_type && r.is_shadow() != has_active)
                .map(|r| (*r).clone()),
        );
    }

    selected
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use crate::common::RecordFlags;
    use crate::registry::StandardRecordTypes;

    use super::*;

    const NOW: Timestamp = Timestamp::from_micros(1_000_000);
    const LATER: Timestamp = Timestamp::from_micros(2_000_000);

    fn txt(data: &'static str, expiration: Timestamp) -> Record {
        Record::new(RecordType::TXT, Bytes::from_static(data.as_bytes()), expiration)
    }

    fn run(raw: &[Record], requested: RecordType) -> Classified {
        classify(raw, requested, NOW, &StandardRecordTypes, None)
    }

    #[test]
    fn lone_shadow_record_is_used() {
        let shadow = txt("fallback", LATER).with_flags(RecordFlags::SHADOW);

        let classified = run(&[shadow.clone()], RecordType::TXT);

        assert_eq!(classified.answers, vec![shadow]);
    }

    #[test]
    fn active_record_hides_shadow() {
        let shadow = txt("fallback", LATER).with_flags(RecordFlags::SHADOW);
        let active = txt("current", LATER);

        let classified = run(&[shadow, active.clone()], RecordType::TXT);

        assert_eq!(classified.answers, vec![active]);
    }

    #[test]
    fn expired_active_record_reveals_shadow() {
        let shadow = txt("fallback", LATER).with_flags(RecordFlags::SHADOW);
        let expired = txt("current", NOW);

        let classified = run(&[expired, shadow.clone()], RecordType::TXT);

        assert_eq!(classified.answers, vec![shadow]);
    }

    #[test]
    fn shadow_fallback_is_per_type() {
        let shadow_txt = txt("fallback", LATER).with_flags(RecordFlags::SHADOW);
        let active_a = Record::new(RecordType::A, vec![192, 0, 2, 1], LATER);

        let classified = run(&[shadow_txt.clone(), active_a.clone()], RecordType::ANY);

        assert_eq!(classified.answers, vec![shadow_txt, active_a]);
    }

    #[test]
    fn expiration_at_now_is_excluded() {
        let classified = run(
            &[
                txt("past", Timestamp::from_micros(999_999)),
                txt("boundary", NOW),
                txt("future", Timestamp::from_micros(1_000_001)),
            ],
            RecordType::TXT,
        );

        assert_eq!(
            classified.answers,
            vec![txt("future", Timestamp::from_micros(1_000_001))]
        );
    }

    #[test]
    fn delegations_surface_for_any_requested_type() {
        let delegation = Record::new(RecordType::PKEY, vec![0; 32], LATER);
        let bridge = Record::new(RecordType::GNS2DNS, &b"example.com\0ns1\0"[..], LATER);

        let classified = run(&[delegation.clone(), bridge.clone()], RecordType::A);

        assert!(classified.answers.is_empty());
        assert_eq!(classified.delegations, vec![delegation]);
        assert_eq!(classified.dns_bridges, vec![bridge]);
    }

    #[test]
    fn selector_unwraps_matching_boxes() {
        let https = BoxedRecord {
            protocol: 6,
            service: 443,
            record_type: RecordType::TLSA,
            data: Bytes::from_static(b"cert"),
        };
        let smtp = BoxedRecord {
            protocol: 6,
            service: 25,
            record_type: RecordType::TLSA,
            data: Bytes::from_static(b"other"),
        };
        let plain_tlsa = Record::new(RecordType::TLSA, &b"unboxed"[..], LATER);

        let raw = [
            https.into_record(LATER).with_flags(RecordFlags::SHADOW),
            smtp.into_record(LATER),
            plain_tlsa,
        ];
        let selector = BoxSelector {
            service: 443,
            protocol: 6,
        };

        let classified = classify(
            &raw,
            RecordType::TLSA,
            NOW,
            &StandardRecordTypes,
            Some(&selector),
        );

        assert_eq!(
            classified.answers,
            vec![Record::new(RecordType::TLSA, &b"cert"[..], LATER).with_flags(RecordFlags::SHADOW)]
        );
    }

    #[test]
    fn boxes_are_plain_records_without_selector() {
        let boxed = BoxedRecord {
            protocol: 17,
            service: 53,
            record_type: RecordType::TXT,
            data: Bytes::from_static(b"inner"),
        }
        .into_record(LATER);

        assert!(run(&[boxed.clone()], RecordType::TXT).answers.is_empty());
        assert_eq!(run(&[boxed.clone()], RecordType::BOX).answers, vec![boxed]);
    }
}
