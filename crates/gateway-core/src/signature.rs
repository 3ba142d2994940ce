//! Signature authentication: recovers the account that produced a
//! personal-message signature.
//!
//! Messages are hashed with the `"\x19Ethereum Signed Message:\n" || len || message`
//! envelope before recovery. Raw bytes are signed, never their hex spelling.

use crate::error::GatewayError;
use crate::messages;
use crate::types::{keccak256, Address};
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use sha3::{Digest, Keccak256};
use std::fmt;

/// Length of the textual form: `0x` followed by 130 hex digits.
pub const SIGNATURE_TEXT_LEN: usize = 132;

/// 65-byte `r || s || v` signature with `v` in {27, 28}.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub v: u8,
}

impl RecoverableSignature {
    /// Parse the `0x`-prefixed 130-hex-digit form.
    ///
    /// Any other length, a missing prefix, or a non-hex digit is an
    /// `INVALID_SIGNATURE` validation error.
    pub fn parse(input: &str) -> Result<Self, GatewayError> {
        let digits = input
            .strip_prefix("0x")
            .filter(|digits| digits.len() == 130)
            .ok_or_else(invalid_signature)?;
        let mut bytes = [0u8; 65];
        hex::decode_to_slice(digits, &mut bytes).map_err(|_| invalid_signature())?;

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..64]);
        Ok(Self { r, s, v: bytes[64] })
    }

    fn to_bytes(self) -> [u8; 65] {
        let mut bytes = [0u8; 65];
        bytes[..32].copy_from_slice(&self.r);
        bytes[32..64].copy_from_slice(&self.s);
        bytes[64] = self.v;
        bytes
    }
}

impl fmt::Display for RecoverableSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.to_bytes()))
    }
}

impl fmt::Debug for RecoverableSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecoverableSignature({self})")
    }
}

fn invalid_signature() -> GatewayError {
    GatewayError::validation(messages::INVALID_SIGNATURE)
}

/// Personal-message digest of `message`.
pub fn hash_message(message: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(format!("\x19Ethereum Signed Message:\n{}", message.len()).as_bytes());
    hasher.update(message);
    hasher.finalize().into()
}

/// Account derived from a public key: trailing 20 bytes of the keccak hash of
/// the uncompressed point without its tag byte.
pub fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    Address::from_word(&keccak256(&point.as_bytes()[1..]))
}

pub(crate) fn recover_prehash(
    digest: &[u8; 32],
    signature: &Signature,
    recovery_id: RecoveryId,
) -> Option<Address> {
    VerifyingKey::recover_from_prehash(digest, signature, recovery_id)
        .ok()
        .map(|key| address_of(&key))
}

/// Recover the signer of an already hashed message.
pub fn recover_digest(
    digest: &[u8; 32],
    signature: &RecoverableSignature,
) -> Result<Address, GatewayError> {
    let recovery_byte = match signature.v {
        27 | 28 => signature.v - 27,
        _ => return Err(invalid_signature()),
    };
    let recovery_id = RecoveryId::from_byte(recovery_byte).ok_or_else(invalid_signature)?;

    let mut compact = [0u8; 64];
    compact[..32].copy_from_slice(&signature.r);
    compact[32..].copy_from_slice(&signature.s);
    let signature = Signature::from_slice(&compact).map_err(|_| invalid_signature())?;

    recover_prehash(digest, &signature, recovery_id).ok_or_else(invalid_signature)
}

/// Recover the account that signed `message`.
pub fn recover_signer(
    message: &[u8],
    signature: &RecoverableSignature,
) -> Result<Address, GatewayError> {
    recover_digest(&hash_message(message), signature)
}

/// True iff `signature` over `message` was produced by `expected`.
pub fn verify_signer(
    message: &[u8],
    signature: &RecoverableSignature,
    expected: &Address,
) -> Result<bool, GatewayError> {
    Ok(recover_signer(message, signature)? == *expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::SigningAccount;
    use proptest::prelude::*;

    fn account(byte: u8) -> SigningAccount {
        SigningAccount::from_bytes(&[byte; 32]).unwrap()
    }

    #[test]
    fn envelope_prefixes_length_in_decimal() {
        let mut expected = Keccak256::new();
        expected.update(b"\x19Ethereum Signed Message:\n11hello world");
        let expected: [u8; 32] = expected.finalize().into();
        assert_eq!(hash_message(b"hello world"), expected);
    }

    #[test]
    fn recovers_the_signing_account() {
        let signer = account(0x42);
        let message = [0x11u8; 52];
        let signature = signer.sign_message(&message).unwrap();

        assert_eq!(recover_signer(&message, &signature).unwrap(), signer.address());
        assert!(verify_signer(&message, &signature, &signer.address()).unwrap());
        assert!(!verify_signer(&message, &signature, &account(0x43).address()).unwrap());
    }

    // Wallet-produced signature over the UTF-8 message "I♥SF".
    const WALLET_KEY: &str = "0xb25c7db31feed9122727bf0939dc769a96564b2de4c4726d035b36ecf1e5b364";
    const WALLET_SIGNER: &str = "0x5ce9454909639D2D17A3F753ce7d93fa0b9aB12E";
    const WALLET_SIGNATURE: &str = "0xe6ca9bba58c88611fad66a6ce8f996908195593807c4b38bd528d2cff09d4eb3\
                                    3e5bfbbf4d3e39b1a2fd816a7680c19ebebaf3a141b239934ad43cb33fcec8ce1c";

    #[test]
    fn recovers_wallet_signature() {
        let message = "I♥SF".as_bytes();
        assert_eq!(
            hex::encode(hash_message(message)),
            "1476abb745d423bf09273f1afd887d951181d25adc66c4834a70491911b7f750"
        );

        let signature = RecoverableSignature::parse(WALLET_SIGNATURE).unwrap();
        assert_eq!(signature.v, 28);
        let signer: Address = WALLET_SIGNER.parse().unwrap();
        assert_eq!(recover_signer(message, &signature).unwrap(), signer);
        assert!(verify_signer(message, &signature, &signer).unwrap());
    }

    #[test]
    fn signing_reproduces_wallet_signature() {
        let wallet = SigningAccount::from_hex(WALLET_KEY).unwrap();
        assert_eq!(wallet.address().to_string(), WALLET_SIGNER);
        let signature = wallet.sign_message("I♥SF".as_bytes()).unwrap();
        assert_eq!(signature.to_string(), WALLET_SIGNATURE);
    }

    #[test]
    fn textual_form_survives_parse() {
        let signature = account(0x01).sign_message(b"payload").unwrap();
        let text = signature.to_string();
        assert_eq!(text.len(), SIGNATURE_TEXT_LEN);
        assert_eq!(RecoverableSignature::parse(&text).unwrap(), signature);
        assert_eq!(
            RecoverableSignature::parse(&text.to_uppercase().replacen("0X", "0x", 1)).unwrap(),
            signature
        );
    }

    #[test]
    fn wrong_lengths_are_rejected() {
        let invalid = GatewayError::validation(messages::INVALID_SIGNATURE);
        let short = format!("0x{}", "a".repeat(129));
        let long = format!("0x{}", "a".repeat(131));
        let unprefixed = "a".repeat(132);
        let bad_digit = format!("0x{}g", "a".repeat(129));

        for input in [short, long, unprefixed, bad_digit] {
            assert_eq!(RecoverableSignature::parse(&input), Err(invalid.clone()));
        }
    }

    #[test]
    fn recovery_byte_outside_27_28_is_invalid() {
        let mut signature = account(0x07).sign_message(b"m").unwrap();
        signature.v = 1;
        assert!(matches!(
            recover_signer(b"m", &signature),
            Err(GatewayError::Validation(_))
        ));
    }

    #[test]
    fn zero_scalars_are_invalid() {
        let signature = RecoverableSignature {
            r: [0u8; 32],
            s: [0u8; 32],
            v: 27,
        };
        assert!(recover_signer(b"m", &signature).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn tampered_message_never_recovers_original_signer(message in prop::collection::vec(any::<u8>(), 1..96)) {
            let signer = account(0x5a);
            let signature = signer.sign_message(&message).unwrap();
            let mut tampered = message.clone();
            tampered[0] ^= 0x01;
            let recovered = recover_signer(&tampered, &signature);
            prop_assert!(recovered.map(|addr| addr != signer.address()).unwrap_or(true));
        }

        #[test]
        fn only_130_hex_digits_parse(len in 0usize..200) {
            let input = format!("0x{}", "1b".repeat(len / 2) + &"f".repeat(len % 2));
            prop_assert_eq!(RecoverableSignature::parse(&input).is_ok(), len == 130);
        }
    }
}
