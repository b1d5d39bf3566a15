//! Typed records and their flags.
use std::fmt::{self, Debug, Formatter};
use std::ops::BitOr;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::common::{Timestamp, ZoneKey};
use crate::error::ParseError;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
/// Integer tag selecting how a record's data is interpreted.
pub struct RecordType(pub u32);

impl RecordType {
    /// Wildcard used in lookups, never stored.
    pub const ANY: RecordType = RecordType(0);
    pub const A: RecordType = RecordType(1);
    pub const NS: RecordType = RecordType(2);
    pub const CNAME: RecordType = RecordType(5);
    pub const SOA: RecordType = RecordType(6);
    pub const PTR: RecordType = RecordType(12);
    pub const MX: RecordType = RecordType(15);
    pub const TXT: RecordType = RecordType(16);
    pub const AAAA: RecordType = RecordType(28);
    pub const SRV: RecordType = RecordType(33);
    pub const TLSA: RecordType = RecordType(52);

    /// Delegation to another zone by public key.
    pub const PKEY: RecordType = RecordType(65536);
    pub const NICK: RecordType = RecordType(65537);
    pub const LEHO: RecordType = RecordType(65538);
    /// Delegation to a legacy DNS authority.
    pub const GNS2DNS: RecordType = RecordType(65540);
    /// A record wrapped together with a service and protocol number.
    pub const BOX: RecordType = RecordType(65541);

    pub fn is_any(&self) -> bool {
        *self == RecordType::ANY
    }

    /// Returns `true` if a record of `other` type satisfies a lookup for this type.
    pub fn matches(&self, other: RecordType) -> bool {
        self.is_any() || *self == other
    }
}

const NAMED_TYPES: [(RecordType, &str); 16] = [
    (RecordType::ANY, "ANY"),
    (RecordType::A, "A"),
    (RecordType::NS, "NS"),
    (RecordType::CNAME, "CNAME"),
    (RecordType::SOA, "SOA"),
    (RecordType::PTR, "PTR"),
    (RecordType::MX, "MX"),
    (RecordType::TXT, "TXT"),
    (RecordType::AAAA, "AAAA"),
    (RecordType::SRV, "SRV"),
    (RecordType::TLSA, "TLSA"),
    (RecordType::PKEY, "PKEY"),
    (RecordType::NICK, "NICK"),
    (RecordType::LEHO, "LEHO"),
    (RecordType::GNS2DNS, "GNS2DNS"),
    (RecordType::BOX, "BOX"),
];

impl Debug for RecordType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match NAMED_TYPES.iter().find(|(record_type, _)| record_type == self) {
            Some((_, name)) => f.write_str(name),
            None => write!(f, "RecordType({})", self.0),
        }
    }
}

impl FromStr for RecordType {
    type Err = ParseError;

    /// Parse a mnemonic like `TXT` (case insensitive) or a numeric type.
    fn from_str(s: &str) -> Result<Self, ParseError> {
        if let Ok(number) = s.parse() {
            return Ok(RecordType(number));
        }

        NAMED_TYPES
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(s))
            .map(|(record_type, _)| *record_type)
            .ok_or_else(|| ParseError::UnknownRecordType(s.to_string()))
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
/// Record flag bits.
pub struct RecordFlags(u32);

impl RecordFlags {
    pub const NONE: RecordFlags = RecordFlags(0);
    /// Only used when no unflagged record of the same type is alive.
    pub const SHADOW: RecordFlags = RecordFlags(1 << 3);

    pub fn contains(&self, other: RecordFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl BitOr for RecordFlags {
    type Output = RecordFlags;

    fn bitor(self, rhs: RecordFlags) -> RecordFlags {
        RecordFlags(self.0 | rhs.0)
    }
}

impl Debug for RecordFlags {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "RecordFlags({:#x})", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
/// A single typed record under some label.
pub struct Record {
    pub record_type: RecordType,
    pub expiration: Timestamp,
    pub flags: RecordFlags,
    pub data: Bytes,
}

impl Record {
    pub fn new(record_type: RecordType, data: impl Into<Bytes>, expiration: Timestamp) -> Self {
        Record {
            record_type,
            expiration,
            flags: RecordFlags::NONE,
            data: data.into(),
        }
    }

    /// A PKEY delegation to `zone`.
    pub fn delegation(zone: &ZoneKey, expiration: Timestamp) -> Self {
        Record::new(
            RecordType::PKEY,
            Bytes::copy_from_slice(zone.as_bytes()),
            expiration,
        )
    }

    pub fn with_flags(mut self, flags: RecordFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn is_shadow(&self) -> bool {
        self.flags.contains(RecordFlags::SHADOW)
    }

    /// A record expiring at or before `now` is dead.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expiration <= now
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn expiration_boundary_is_exclusive() {
        let record = Record::new(RecordType::TXT, &b"x"[..], Timestamp::from_micros(100));

        assert!(!record.is_expired(Timestamp::from_micros(99)));
        assert!(record.is_expired(Timestamp::from_micros(100)));
        assert!(record.is_expired(Timestamp::from_micros(101)));
    }

    #[test]
    fn any_matches_every_type() {
        assert!(RecordType::ANY.matches(RecordType::TXT));
        assert!(RecordType::TXT.matches(RecordType::TXT));
        assert!(!RecordType::A.matches(RecordType::TXT));
    }

    #[test]
    fn record_type_mnemonics() {
        assert_eq!("txt".parse::<RecordType>().unwrap(), RecordType::TXT);
        assert_eq!("GNS2DNS".parse::<RecordType>().unwrap(), RecordType::GNS2DNS);
        assert_eq!("65536".parse::<RecordType>().unwrap(), RecordType::PKEY);
        assert!("bogus".parse::<RecordType>().is_err());

        assert_eq!(format!("{:?}", RecordType::BOX), "BOX");
        assert_eq!(format!("{:?}", RecordType(99)), "RecordType(99)");
    }
}
