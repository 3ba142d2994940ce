use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// Rejected hexadecimal identifier.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseHexError {
    #[error("missing 0x prefix")]
    MissingPrefix,

    #[error("expected {expected} hex digits, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid hex digit")]
    InvalidDigit,
}

/// Strict `0x`-prefixed, fixed-width hex. Digits are case-insensitive.
fn parse_prefixed<const N: usize>(input: &str) -> Result<[u8; N], ParseHexError> {
    let digits = input
        .strip_prefix("0x")
        .ok_or(ParseHexError::MissingPrefix)?;
    if digits.len() != N * 2 {
        return Err(ParseHexError::InvalidLength {
            expected: N * 2,
            actual: digits.len(),
        });
    }
    let mut out = [0u8; N];
    hex::decode_to_slice(digits, &mut out).map_err(|_| ParseHexError::InvalidDigit)?;
    Ok(out)
}

/// 20-byte ledger account identifier.
///
/// Equality is byte equality, so two textual forms differing only in letter
/// case name the same account.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Takes the trailing 20 bytes of a 32-byte word or hash.
    pub fn from_word(word: &[u8; 32]) -> Self {
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&word[12..]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Mixed-case checksum encoding (EIP-55).
    pub fn to_checksum(&self) -> String {
        let lower = hex::encode(self.0);
        let hash = keccak256(lower.as_bytes());
        let mut out = String::with_capacity(42);
        out.push_str("0x");
        for (i, ch) in lower.chars().enumerate() {
            let nibble = (hash[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
            if ch.is_ascii_alphabetic() && nibble >= 8 {
                out.push(ch.to_ascii_uppercase());
            } else {
                out.push(ch);
            }
        }
        out
    }
}

impl FromStr for Address {
    type Err = ParseHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_prefixed::<20>(s).map(Self)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_checksum())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_checksum())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_checksum())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// 32-byte identifier: document hashes, call ids, proposal ids, transaction hashes.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct H256([u8; 32]);

impl H256 {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl From<[u8; 32]> for H256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl FromStr for H256 {
    type Err = ParseHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_prefixed::<32>(s).map(Self)
    }
}

impl fmt::Display for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "H256({self})")
    }
}

impl Serialize for H256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for H256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Ledger proof that a document hash was stamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StampRecord {
    pub signer: Address,
    pub block_number: u64,
}

/// Call-for-proposals registered in the factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    pub call_id: H256,
    pub creator: Address,
    pub cfp: Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalRecord {
    pub sender: Address,
    pub block_number: u64,
    pub timestamp: u64,
}

/// Lifecycle of a call as seen from the latest ledger block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallState {
    Unknown,
    Created,
    Closed,
}

/// Listing entry joining a call record with its closing time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSummary {
    pub call_id: H256,
    pub cfp: Address,
    pub creator: Address,
    pub closing_time: u64,
}

/// Confirmed inclusion of a gateway-issued write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteReceipt {
    pub transaction_hash: H256,
    pub block_number: u64,
}

/// Stamp write confirmed and re-read from the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StampConfirmation {
    pub transaction_hash: H256,
    pub record: StampRecord,
}

/// Authorization flag change confirmed and re-read from the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorizationChange {
    pub address: Address,
    pub authorized: bool,
    pub transaction_hash: H256,
}

/// Result of a write that passed every precondition.
///
/// `Accepted` means the transaction was broadcast but no receipt arrived
/// before the wait expired; its final state is unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome<T> {
    Confirmed(T),
    Accepted { transaction_hash: H256 },
}

impl<T> WriteOutcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> WriteOutcome<U> {
        match self {
            Self::Confirmed(value) => WriteOutcome::Confirmed(f(value)),
            Self::Accepted { transaction_hash } => WriteOutcome::Accepted { transaction_hash },
        }
    }

    pub fn confirmed(self) -> Option<T> {
        match self {
            Self::Confirmed(value) => Some(value),
            Self::Accepted { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_matches_reference_vector() {
        let address: Address = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed".parse().unwrap();
        assert_eq!(address.to_checksum(), "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed");
    }

    #[test]
    fn address_equality_ignores_letter_case() {
        let lower: Address = "0xfb6916095ca1df60bb79ce92ce3ea74c37c5d359".parse().unwrap();
        let mixed: Address = "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359".parse().unwrap();
        assert_eq!(lower, mixed);
    }

    #[test]
    fn identifiers_require_prefix_and_exact_width() {
        let body = "ab".repeat(32);
        assert!(format!("0x{body}").parse::<H256>().is_ok());
        assert_eq!(body.parse::<H256>(), Err(ParseHexError::MissingPrefix));
        assert!(matches!(
            format!("0x{}", &body[..62]).parse::<H256>(),
            Err(ParseHexError::InvalidLength { expected: 64, actual: 62 })
        ));
        assert_eq!(
            format!("0x{}zz", &body[..62]).parse::<H256>(),
            Err(ParseHexError::InvalidDigit)
        );
        assert!("0x1234".parse::<Address>().is_err());
    }

    #[test]
    fn serde_uses_text_forms() {
        let record = StampRecord {
            signer: "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed".parse().unwrap(),
            block_number: 12,
        };
        let value = serde_json::to_value(record).unwrap();
        assert_eq!(value["signer"], "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed");
        assert_eq!(value["blockNumber"], 12);

        let back: StampRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn outcome_map_preserves_acceptance() {
        let hash = H256::from([7u8; 32]);
        let accepted: WriteOutcome<u64> = WriteOutcome::Accepted {
            transaction_hash: hash,
        };
        assert_eq!(
            accepted.map(|n| n + 1),
            WriteOutcome::Accepted {
                transaction_hash: hash
            }
        );
        assert_eq!(WriteOutcome::Confirmed(1u64).map(|n| n + 1).confirmed(), Some(2));
    }
}
