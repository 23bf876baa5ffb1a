//! Leaf certificate profiles
//!
//! A [`LeafProfile`] is everything the Leaf Issuer needs to know about an
//! identity besides the CA that signs it. The two identities every bootstrap
//! issues are available as [`LeafProfile::client`] and [`LeafProfile::server`].

use std::collections::BTreeSet;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use chrono::{DateTime, Days, Months, Utc};

pub const CLIENT_LEAF_NAME: &str = "client";
pub const SERVER_LEAF_NAME: &str = "server";

/// Serial number of the CA certificate. One CA per run, so a constant is enough.
pub const CA_SERIAL_NUMBER: u32 = 2021;
pub const SERVER_SERIAL_NUMBER: u32 = 2022;
pub const CLIENT_SERIAL_NUMBER: u32 = 2023;
/// First serial handed to keystore role certificates; role `i` gets `base + i`.
pub const KEYSTORE_SERIAL_BASE: u32 = 2024;

/// Extended key usage purposes a leaf can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExtendedKeyUsage {
    ClientAuth,
    ServerAuth,
}

impl fmt::Display for ExtendedKeyUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtendedKeyUsage::ClientAuth => f.write_str("clientAuth"),
            ExtendedKeyUsage::ServerAuth => f.write_str("serverAuth"),
        }
    }
}

/// Certificate lifetime measured from the moment of issuance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidityPeriod {
    Days(u32),
    /// Calendar months, so "6 months" from Jan 31 ends on Jul 31.
    Months(u32),
}

impl ValidityPeriod {
    pub const fn years(years: u32) -> Self {
        ValidityPeriod::Months(years * 12)
    }

    /// End of the validity window starting at `from`, or `None` on overflow.
    pub fn not_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match *self {
            ValidityPeriod::Days(days) => from.checked_add_days(Days::new(u64::from(days))),
            ValidityPeriod::Months(months) => from.checked_add_months(Months::new(months)),
        }
    }
}

impl fmt::Display for ValidityPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidityPeriod::Days(days) => write!(f, "{} days", days),
            ValidityPeriod::Months(months) if months % 12 == 0 => {
                write!(f, "{} years", months / 12)
            }
            ValidityPeriod::Months(months) => write!(f, "{} months", months),
        }
    }
}

/// Identity, SANs, usage and lifetime of a leaf certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafProfile {
    pub common_name: String,
    pub organization: String,
    /// DNS subject alternative names, in the order they are encoded.
    pub dns_sans: Vec<String>,
    /// IP subject alternative names, in the order they are encoded.
    pub ip_sans: Vec<IpAddr>,
    pub extended_key_usage: BTreeSet<ExtendedKeyUsage>,
    pub validity: ValidityPeriod,
    /// Must be unique among the certificates issued by the same CA.
    pub serial_number: u32,
}

impl LeafProfile {
    /// Client identity: clientAuth only, valid for 6 months.
    pub fn client() -> Self {
        Self {
            common_name: "localhost".to_string(),
            organization: "SolteDev.".to_string(),
            dns_sans: vec!["client.localhost".to_string(), "localhost".to_string()],
            ip_sans: vec![IpAddr::V4(Ipv4Addr::LOCALHOST)],
            extended_key_usage: BTreeSet::from([ExtendedKeyUsage::ClientAuth]),
            validity: ValidityPeriod::Months(6),
            serial_number: CLIENT_SERIAL_NUMBER,
        }
    }

    /// Server identity: serverAuth only, valid for 10 years.
    ///
    /// This outlives the 6-month CA on purpose; the bootstrap warns about it
    /// instead of silently shortening it.
    pub fn server() -> Self {
        Self {
            common_name: "localhost".to_string(),
            organization: "Solte Dev.".to_string(),
            dns_sans: vec!["server.localhost".to_string(), "localhost".to_string()],
            ip_sans: vec![IpAddr::V4(Ipv4Addr::LOCALHOST)],
            extended_key_usage: BTreeSet::from([ExtendedKeyUsage::ServerAuth]),
            validity: ValidityPeriod::years(10),
            serial_number: SERVER_SERIAL_NUMBER,
        }
    }
}
