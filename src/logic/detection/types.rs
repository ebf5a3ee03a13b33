//! Detection Types
//!
//! Wire-level data structures for one classified network flow.
//! No stream logic here - only data and decoding rules.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DecodeError;

// ============================================================================
// CATEGORY
// ============================================================================

/// Prediction label of the backend model
///
/// The twelve attack families the model was trained on plus `Benign`.
/// Labels outside the table are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    DdosHoic,
    DdosLoicUdp,
    DdosLoicHttp,
    DosGoldenEye,
    DosHulk,
    DosSlowHttpTest,
    DosSlowloris,
    BruteForceWeb,
    BruteForceXss,
    FtpBruteForce,
    SqlInjection,
    SshBruteforce,
    Benign,
    Other(String),
}

impl Category {
    /// Every known attack family, in model output order
    pub const ATTACKS: [Category; 12] = [
        Category::DdosHoic,
        Category::DdosLoicUdp,
        Category::DdosLoicHttp,
        Category::DosGoldenEye,
        Category::DosHulk,
        Category::DosSlowHttpTest,
        Category::DosSlowloris,
        Category::BruteForceWeb,
        Category::BruteForceXss,
        Category::FtpBruteForce,
        Category::SqlInjection,
        Category::SshBruteforce,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Category::DdosHoic => "DDOS attack-HOIC",
            Category::DdosLoicUdp => "DDOS attack-LOIC-UDP",
            Category::DdosLoicHttp => "DDoS attacks-LOIC-HTTP",
            Category::DosGoldenEye => "DoS attacks-GoldenEye",
            Category::DosHulk => "DoS attacks-Hulk",
            Category::DosSlowHttpTest => "DoS attacks-SlowHTTPTest",
            Category::DosSlowloris => "DoS attacks-Slowloris",
            Category::BruteForceWeb => "Brute Force -Web",
            Category::BruteForceXss => "Brute Force -XSS",
            Category::FtpBruteForce => "FTP-BruteForce",
            Category::SqlInjection => "SQL Injection",
            Category::SshBruteforce => "SSH-Bruteforce",
            Category::Benign => "Benign",
            Category::Other(label) => label.as_str(),
        }
    }

    pub fn is_benign(&self) -> bool {
        matches!(self, Category::Benign)
    }

    /// Chart color used by the dashboard
    pub fn color(&self) -> &'static str {
        match self {
            Category::DdosHoic => "#ff4444",
            Category::DdosLoicUdp => "#ff6b6b",
            Category::DdosLoicHttp | Category::SqlInjection => "#ee5a6f",
            Category::DosGoldenEye | Category::SshBruteforce => "#c44569",
            Category::DosHulk => "#f8b500",
            Category::DosSlowHttpTest => "#ffa502",
            Category::DosSlowloris | Category::BruteForceXss => "#ff6348",
            Category::BruteForceWeb | Category::FtpBruteForce => "#ff4757",
            Category::Benign => "#4caf50",
            Category::Other(_) => "#9e9e9e",
        }
    }
}

impl From<&str> for Category {
    fn from(label: &str) -> Self {
        Category::ATTACKS
            .into_iter()
            .chain(std::iter::once(Category::Benign))
            .find(|c| c.as_str() == label)
            .unwrap_or_else(|| Category::Other(label.to_string()))
    }
}

impl From<String> for Category {
    fn from(label: String) -> Self {
        match Category::from(label.as_str()) {
            Category::Other(_) => Category::Other(label),
            known => known,
        }
    }
}

impl From<Category> for String {
    fn from(category: Category) -> Self {
        match category {
            Category::Other(label) => label,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// DETECTION EVENT
// ============================================================================

/// One backend-classified network flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    /// Unique per flow; integers on the wire are kept as their decimal text
    #[serde(deserialize_with = "de_loose_string")]
    pub flow_id: String,
    #[serde(deserialize_with = "de_timestamp", serialize_with = "ser_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub src_ip: String,
    pub src_port: u16,
    pub dst_ip: String,
    pub dst_port: u16,
    #[serde(deserialize_with = "de_loose_string")]
    pub protocol: String,
    pub packet_count: u64,
    pub byte_count: u64,
    pub prediction: Category,
    /// Model confidence (0.0 - 1.0)
    pub confidence: f64,
    /// Authoritative as sent, even if it disagrees with `prediction`
    pub is_attack: bool,
    /// Flow duration in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Per-class probabilities from the model
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub probabilities: Vec<f64>,
}

impl DetectionEvent {
    /// Minimal event with `is_attack` derived from the prediction
    pub fn new(
        flow_id: impl Into<String>,
        prediction: Category,
        confidence: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let is_attack = !prediction.is_benign();
        Self {
            flow_id: flow_id.into(),
            timestamp,
            src_ip: "0.0.0.0".to_string(),
            src_port: 0,
            dst_ip: "0.0.0.0".to_string(),
            dst_port: 0,
            protocol: "TCP".to_string(),
            packet_count: 0,
            byte_count: 0,
            prediction,
            confidence,
            is_attack,
            duration: None,
            probabilities: vec![],
        }
    }

    pub fn with_endpoints(mut self, src: (&str, u16), dst: (&str, u16)) -> Self {
        self.src_ip = src.0.to_string();
        self.src_port = src.1;
        self.dst_ip = dst.0.to_string();
        self.dst_port = dst.1;
        self
    }

    /// Check the invariants a decoded event must hold
    pub fn validate(&self) -> Result<(), DecodeError> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(DecodeError::ConfidenceOutOfRange(self.confidence));
        }
        Ok(())
    }

    /// Whether `is_attack` agrees with the prediction label
    pub fn is_consistent(&self) -> bool {
        self.is_attack != self.prediction.is_benign()
    }

    /// "src:port → dst:port"
    pub fn route(&self) -> String {
        format!("{}:{} → {}:{}", self.src_ip, self.src_port, self.dst_ip, self.dst_port)
    }
}

// ============================================================================
// SERDE HELPERS
// ============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum LooseString {
    Text(String),
    Unsigned(u64),
    Signed(i64),
    Float(f64),
}

fn de_loose_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match LooseString::deserialize(d)? {
        LooseString::Text(s) => s,
        LooseString::Unsigned(n) => n.to_string(),
        LooseString::Signed(n) => n.to_string(),
        LooseString::Float(n) => n.to_string(),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Millis(i64),
    Text(String),
}

fn de_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
    use serde::de::Error;

    match RawTimestamp::deserialize(d)? {
        RawTimestamp::Millis(ms) => DateTime::from_timestamp_millis(ms)
            .ok_or_else(|| D::Error::custom(format!("timestamp {} out of range", ms))),
        RawTimestamp::Text(s) => parse_timestamp(&s)
            .ok_or_else(|| D::Error::custom(format!("unrecognized timestamp '{}'", s))),
    }
}

fn ser_timestamp<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// RFC 3339 first, then naive ISO (the backend often omits the offset) read as UTC
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}
