//! Contract ABI encoding for the value types used by the stamper, factory and
//! call contracts: head/tail layout with 32-byte words.

use crate::error::AbiError;
use crate::types::{keccak256, Address, H256};

const WORD: usize = 32;

/// Selector of the standard `Error(string)` revert payload.
pub const ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    Address,
    Bytes32,
    /// `uint256` restricted to values that fit in 64 bits.
    Uint,
    Bool,
    String,
    Array(Box<ParamType>),
}

impl ParamType {
    pub fn array(inner: ParamType) -> Self {
        Self::Array(Box::new(inner))
    }

    fn is_dynamic(&self) -> bool {
        matches!(self, Self::String | Self::Array(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Address(Address),
    Bytes32(H256),
    Uint(u64),
    Bool(bool),
    String(String),
    Array(Vec<Token>),
}

impl Token {
    fn is_dynamic(&self) -> bool {
        matches!(self, Self::String(_) | Self::Array(_))
    }

    pub fn into_address(self) -> Option<Address> {
        match self {
            Self::Address(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_bytes32(self) -> Option<H256> {
        match self {
            Self::Bytes32(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_uint(self) -> Option<u64> {
        match self {
            Self::Uint(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_bool(self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_string(self) -> Option<String> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<Vec<Token>> {
        match self {
            Self::Array(values) => Some(values),
            _ => None,
        }
    }
}

/// First four bytes of the keccak hash of a canonical function signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

pub fn encode_call(signature: &str, arguments: &[Token]) -> Vec<u8> {
    let mut data = selector(signature).to_vec();
    data.extend(encode(arguments));
    data
}

pub fn encode(tokens: &[Token]) -> Vec<u8> {
    let head_len = tokens.len() * WORD;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in tokens {
        let encoded = encode_token(token);
        if token.is_dynamic() {
            head.extend_from_slice(&uint_word((head_len + tail.len()) as u64));
            tail.extend(encoded);
        } else {
            head.extend(encoded);
        }
    }

    head.extend(tail);
    head
}

fn encode_token(token: &Token) -> Vec<u8> {
    match token {
        Token::Address(address) => {
            let mut word = [0u8; WORD];
            word[12..].copy_from_slice(address.as_bytes());
            word.to_vec()
        }
        Token::Bytes32(value) => value.as_bytes().to_vec(),
        Token::Uint(value) => uint_word(*value).to_vec(),
        Token::Bool(value) => uint_word(u64::from(*value)).to_vec(),
        Token::String(value) => {
            let mut out = uint_word(value.len() as u64).to_vec();
            out.extend_from_slice(value.as_bytes());
            out.resize(out.len() + padding(value.len()), 0);
            out
        }
        Token::Array(items) => {
            let mut out = uint_word(items.len() as u64).to_vec();
            out.extend(encode(items));
            out
        }
    }
}

pub fn decode(types: &[ParamType], data: &[u8]) -> Result<Vec<Token>, AbiError> {
    types
        .iter()
        .enumerate()
        .map(|(index, kind)| decode_param(kind, data, index * WORD))
        .collect()
}

fn decode_param(kind: &ParamType, data: &[u8], head_offset: usize) -> Result<Token, AbiError> {
    let word = read_word(data, head_offset)?;
    if !kind.is_dynamic() {
        return decode_static(kind, &word);
    }

    let offset = word_to_usize(&word)?;
    let len = word_to_usize(&read_word(data, offset)?)?;
    let body_start = offset + WORD;

    match kind {
        ParamType::String => {
            let end = body_start
                .checked_add(len)
                .ok_or(AbiError::Truncated(body_start))?;
            let bytes = data
                .get(body_start..end)
                .ok_or(AbiError::Truncated(body_start))?;
            String::from_utf8(bytes.to_vec())
                .map(Token::String)
                .map_err(|_| AbiError::Invalid("string"))
        }
        ParamType::Array(inner) => {
            let body = data
                .get(body_start..)
                .ok_or(AbiError::Truncated(body_start))?;
            // Every element occupies at least one head word.
            if len > body.len() / WORD {
                return Err(AbiError::Truncated(body_start));
            }
            let kinds = vec![(**inner).clone(); len];
            decode(&kinds, body).map(Token::Array)
        }
        _ => Err(AbiError::UnexpectedShape),
    }
}

fn decode_static(kind: &ParamType, word: &[u8; WORD]) -> Result<Token, AbiError> {
    match kind {
        ParamType::Address => {
            if word[..12].iter().any(|byte| *byte != 0) {
                return Err(AbiError::Invalid("address"));
            }
            Ok(Token::Address(Address::from_word(word)))
        }
        ParamType::Bytes32 => Ok(Token::Bytes32(H256::from(*word))),
        ParamType::Uint => word_to_u64(word).map(Token::Uint),
        ParamType::Bool => match word_to_u64(word)? {
            0 => Ok(Token::Bool(false)),
            1 => Ok(Token::Bool(true)),
            _ => Err(AbiError::Invalid("bool")),
        },
        ParamType::String | ParamType::Array(_) => Err(AbiError::UnexpectedShape),
    }
}

/// ABI payload a contract emits when it reverts with `reason`.
pub fn encode_revert(reason: &str) -> Vec<u8> {
    let mut data = ERROR_SELECTOR.to_vec();
    data.extend(encode(&[Token::String(reason.to_string())]));
    data
}

/// Extract the human-readable reason from `Error(string)` revert data.
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    let payload = data.strip_prefix(&ERROR_SELECTOR)?;
    decode(&[ParamType::String], payload)
        .ok()?
        .pop()?
        .into_string()
}

fn read_word(data: &[u8], offset: usize) -> Result<[u8; WORD], AbiError> {
    let end = offset.checked_add(WORD).ok_or(AbiError::Truncated(offset))?;
    let slice = data.get(offset..end).ok_or(AbiError::Truncated(offset))?;
    let mut word = [0u8; WORD];
    word.copy_from_slice(slice);
    Ok(word)
}

fn word_to_u64(word: &[u8; WORD]) -> Result<u64, AbiError> {
    if word[..24].iter().any(|byte| *byte != 0) {
        return Err(AbiError::Overflow);
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&word[24..]);
    Ok(u64::from_be_bytes(buf))
}

fn word_to_usize(word: &[u8; WORD]) -> Result<usize, AbiError> {
    usize::try_from(word_to_u64(word)?).map_err(|_| AbiError::Overflow)
}

fn uint_word(value: u64) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

fn padding(len: usize) -> usize {
    (WORD - len % WORD) % WORD
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(byte: u8) -> Address {
        Address::from_bytes([byte; 20])
    }

    #[test]
    fn selector_matches_known_function() {
        assert_eq!(hex::encode(selector("transfer(address,uint256)")), "a9059cbb");
        assert_eq!(selector("Error(string)"), ERROR_SELECTOR);
    }

    #[test]
    fn static_arguments_are_packed_in_head() {
        let data = encode(&[
            Token::Bytes32(H256::from([0xaa; 32])),
            Token::Uint(1_700_000_000),
            Token::Address(address(0x11)),
        ]);
        assert_eq!(data.len(), 3 * WORD);
        assert_eq!(&data[..32], &[0xaa; 32]);
        assert_eq!(&data[56..64], &1_700_000_000u64.to_be_bytes());
        assert_eq!(&data[64..76], &[0u8; 12]);
        assert_eq!(&data[76..96], &[0x11; 20]);
    }

    #[test]
    fn dynamic_array_uses_offset_and_length() {
        let data = encode(&[Token::Array(vec![
            Token::Address(address(1)),
            Token::Address(address(2)),
        ])]);
        assert_eq!(data.len(), 4 * WORD);
        assert_eq!(word_to_u64(&read_word(&data, 0).unwrap()).unwrap(), 32);
        assert_eq!(word_to_u64(&read_word(&data, 32).unwrap()).unwrap(), 2);

        let decoded = decode(&[ParamType::array(ParamType::Address)], &data).unwrap();
        assert_eq!(
            decoded,
            vec![Token::Array(vec![
                Token::Address(address(1)),
                Token::Address(address(2)),
            ])]
        );
    }

    #[test]
    fn mixed_static_and_dynamic_results_decode() {
        let tokens = vec![
            Token::Bool(true),
            Token::String("call for proposals".to_string()),
            Token::Uint(42),
        ];
        let data = encode(&tokens);
        let decoded = decode(
            &[ParamType::Bool, ParamType::String, ParamType::Uint],
            &data,
        )
        .unwrap();
        assert_eq!(decoded, tokens);
    }

    #[test]
    fn revert_reason_is_extracted() {
        let data = encode_revert("Hash already stamped");
        assert_eq!(&data[..4], &ERROR_SELECTOR);
        assert_eq!(
            decode_revert_reason(&data).as_deref(),
            Some("Hash already stamped")
        );
        assert_eq!(decode_revert_reason(&[0xde, 0xad, 0xbe, 0xef]), None);
        assert_eq!(decode_revert_reason(&[]), None);
    }

    #[test]
    fn truncated_and_oversized_values_are_rejected() {
        assert_eq!(
            decode(&[ParamType::Uint], &[0u8; 16]),
            Err(AbiError::Truncated(0))
        );

        let mut word = [0u8; WORD];
        word[0] = 1;
        assert_eq!(decode(&[ParamType::Uint], &word), Err(AbiError::Overflow));
        assert_eq!(
            decode(&[ParamType::Address], &word),
            Err(AbiError::Invalid("address"))
        );

        // Claims a million elements with no body behind it.
        let mut data = uint_word(32).to_vec();
        data.extend_from_slice(&uint_word(1_000_000));
        assert!(matches!(
            decode(&[ParamType::array(ParamType::Bytes32)], &data),
            Err(AbiError::Truncated(_))
        ));
    }
}
