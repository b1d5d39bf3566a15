//! Payload formats of the record types the resolver itself has to understand.
use std::str::FromStr;

use bytes::{BufMut, Bytes, BytesMut};

use crate::common::{Record, RecordType, Timestamp, ZoneKey};
use crate::error::ParseError;

/// Size of the fixed BOX header: protocol, service and inner record type.
const BOX_HEADER_SIZE: usize = 8;

impl Record {
    /// Interpret a PKEY record's data as the delegated zone.
    pub fn zone_key(&self) -> Result<ZoneKey, ParseError> {
        ZoneKey::from_bytes(&self.data)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// Legacy DNS authority named by one or more GNS2DNS records.
pub struct DnsAuthority {
    /// DNS name appended to the remaining labels of the query.
    pub name: String,
    /// Name servers (host names or IP addresses) for [DnsAuthority::name].
    pub servers: Vec<String>,
}

impl DnsAuthority {
    /// Parse the `name NUL server NUL` payload of one GNS2DNS record.
    pub fn parse(data: &[u8]) -> Result<(String, String), ParseError> {
        let mut parts = data.split(|byte| *byte == 0);

        let name = parts.next().filter(|part| !part.is_empty());
        let server = parts.next().filter(|part| !part.is_empty());

        match (name, server) {
            (Some(name), Some(server)) => Ok((
                std::str::from_utf8(name)
                    .map_err(|_| ParseError::InvalidGns2Dns)?
                    .to_owned(),
                std::str::from_utf8(server)
                    .map_err(|_| ParseError::InvalidGns2Dns)?
                    .to_owned(),
            )),
            _ => Err(ParseError::InvalidGns2Dns),
        }
    }

    /// Merge a set of GNS2DNS records into a single authority.
    ///
    /// Servers of records naming a different DNS name than the first valid record are
    /// ignored. Returns `None` if no record parses.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a Record>) -> Option<Self> {
        let mut authority: Option<DnsAuthority> = None;

        for record in records {
            let Ok((name, server)) = DnsAuthority::parse(&record.data) else {
                continue;
            };

            match &mut authority {
                None => {
                    authority = Some(DnsAuthority {
                        name,
                        servers: vec![server],
                    })
                }
                Some(existing) if existing.name == name => {
                    if !existing.servers.contains(&server) {
                        existing.servers.push(server)
                    }
                }
                Some(_) => {}
            }
        }

        authority
    }

    /// Encode a GNS2DNS record payload.
    pub fn encode(name: &str, server: &str) -> Bytes {
        let mut data = BytesMut::with_capacity(name.len() + server.len() + 2);
        data.put_slice(name.as_bytes());
        data.put_u8(0);
        data.put_slice(server.as_bytes());
        data.put_u8(0);

        data.freeze()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Selects BOX records by the `_service._protocol` labels of a name.
pub struct BoxSelector {
    pub service: u16,
    pub protocol: u16,
}

impl BoxSelector {
    /// Parse a `(_service, _protocol)` label pair, e.g. `("_443", "_tcp")`.
    pub fn from_labels(service: &str, protocol: &str) -> Option<Self> {
        let service = service.strip_prefix('_')?.parse().ok()?;

        let protocol = match protocol.strip_prefix('_')? {
            "tcp" => 6,
            "udp" => 17,
            "sctp" => 132,
            number => number.parse().ok()?,
        };

        Some(BoxSelector { service, protocol })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// Record wrapped in a BOX together with the service and protocol it applies to.
pub struct BoxedRecord {
    pub protocol: u16,
    pub service: u16,
    pub record_type: RecordType,
    pub data: Bytes,
}

impl BoxedRecord {
    pub fn encode(&self) -> Bytes {
        let mut data = BytesMut::with_capacity(BOX_HEADER_SIZE + self.data.len());
        data.put_u16(self.protocol);
        data.put_u16(self.service);
        data.put_u32(self.record_type.0);
        data.put_slice(&self.data);

        data.freeze()
    }

    pub fn decode(data: &Bytes) -> Result<Self, ParseError> {
        if data.len() < BOX_HEADER_SIZE {
            return Err(ParseError::InvalidBox(data.len()));
        }

        Ok(BoxedRecord {
            protocol: u16::from_be_bytes([data[0], data[1]]),
            service: u16::from_be_bytes([data[2], data[3]]),
            record_type: RecordType(u32::from_be_bytes([data[4], data[5], data[6], data[7]])),
            data: data.slice(BOX_HEADER_SIZE..),
        })
    }

    pub fn selected_by(&self, selector: &BoxSelector) -> bool {
        self.service == selector.service && self.protocol == selector.protocol
    }

    /// Wrap this boxed record in a BOX record.
    pub fn into_record(self, expiration: Timestamp) -> Record {
        Record::new(RecordType::BOX, self.encode(), expiration)
    }

    /// Unwrap into a plain record inheriting the outer record's expiration and flags.
    pub fn unwrap_into(self, outer: &Record) -> Record {
        Record {
            record_type: self.record_type,
            expiration: outer.expiration,
            flags: outer.flags,
            data: self.data,
        }
    }
}

impl FromStr for BoxSelector {
    type Err = ParseError;

    /// Parse `_service._protocol`.
    fn from_str(s: &str) -> Result<Self, ParseError> {
        let (service, protocol) = s.split_once('.').ok_or(ParseError::InvalidBoxSelector)?;

        BoxSelector::from_labels(service, protocol).ok_or(ParseError::InvalidBoxSelector)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn gns2dns_payload() {
        let data = DnsAuthority::encode("example.com", "192.0.2.53");

        assert_eq!(
            DnsAuthority::parse(&data).unwrap(),
            ("example.com".to_string(), "192.0.2.53".to_string())
        );
        assert!(DnsAuthority::parse(b"example.com").is_err());
        assert!(DnsAuthority::parse(b"\0server\0").is_err());
    }

    #[test]
    fn authority_merges_servers_of_same_name() {
        let expiration = Timestamp::from_micros(u64::MAX);
        let records = [
            Record::new(
                RecordType::GNS2DNS,
                DnsAuthority::encode("example.com", "ns1"),
                expiration,
            ),
            Record::new(RecordType::GNS2DNS, &b"garbage"[..], expiration),
            Record::new(
                RecordType::GNS2DNS,
                DnsAuthority::encode("example.com", "ns2"),
                expiration,
            ),
            Record::new(
                RecordType::GNS2DNS,
                DnsAuthority::encode("example.org", "ns3"),
                expiration,
            ),
        ];

        let authority = DnsAuthority::from_records(&records).unwrap();

        assert_eq!(authority.name, "example.com");
        assert_eq!(authority.servers, vec!["ns1".to_string(), "ns2".to_string()]);
    }

    #[test]
    fn box_selector_labels() {
        assert_eq!(
            BoxSelector::from_labels("_443", "_tcp"),
            Some(BoxSelector {
                service: 443,
                protocol: 6
            })
        );
        assert_eq!(
            "_53._17".parse::<BoxSelector>().unwrap(),
            BoxSelector {
                service: 53,
                protocol: 17
            }
        );
        assert_eq!(BoxSelector::from_labels("443", "_tcp"), None);
        assert_eq!(BoxSelector::from_labels("_https", "_tcp"), None);
    }

    #[test]
    fn truncated_box_is_rejected() {
        assert!(BoxedRecord::decode(&Bytes::from_static(&[0, 6, 1, 187])).is_err());
    }
}
