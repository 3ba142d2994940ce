use crate::error::{BootstrapError, GatewayError};
use crate::signature::{address_of, hash_message, RecoverableSignature};
use crate::types::Address;
use k256::ecdsa::{RecoveryId, Signature, SigningKey};
use std::fmt;
use std::path::Path;

/// Operator identity holding the secp256k1 key that signs gateway writes.
///
/// The key never leaves this type; `Debug` only shows the derived address.
#[derive(Clone)]
pub struct SigningAccount {
    address: Address,
    key: SigningKey,
}

impl SigningAccount {
    pub fn from_bytes(secret: &[u8]) -> Result<Self, BootstrapError> {
        let key = SigningKey::from_slice(secret)
            .map_err(|_| BootstrapError::InvalidKey("not a valid secp256k1 scalar".to_string()))?;
        let address = address_of(key.verifying_key());
        Ok(Self { address, key })
    }

    /// Accepts 64 hex digits, with or without a `0x` prefix.
    pub fn from_hex(secret: &str) -> Result<Self, BootstrapError> {
        let trimmed = secret.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        if digits.len() != 64 {
            return Err(BootstrapError::InvalidKey(format!(
                "expected 64 hex digits, got {}",
                digits.len()
            )));
        }
        let bytes = hex::decode(digits)
            .map_err(|_| BootstrapError::InvalidKey("key is not hex".to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Load a hex key from a file. Surrounding whitespace is ignored.
    pub fn from_file(path: &Path) -> Result<Self, BootstrapError> {
        let contents = std::fs::read_to_string(path).map_err(|err| {
            BootstrapError::InvalidKey(format!("cannot read {}: {err}", path.display()))
        })?;
        Self::from_hex(&contents)
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub(crate) fn sign_prehash(
        &self,
        digest: &[u8; 32],
    ) -> Result<(Signature, RecoveryId), GatewayError> {
        self.key
            .sign_prehash_recoverable(digest)
            .map_err(|err| GatewayError::Ledger(format!("signing failed: {err}")))
    }

    /// Personal-message signature, as a wallet would produce it.
    pub fn sign_message(&self, message: &[u8]) -> Result<RecoverableSignature, GatewayError> {
        let (signature, recovery_id) = self.sign_prehash(&hash_message(message))?;
        let bytes = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Ok(RecoverableSignature {
            r,
            s,
            v: 27 + recovery_id.to_byte(),
        })
    }
}

impl fmt::Debug for SigningAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningAccount")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    // Well-known development key (account #0 of the default local test mnemonic).
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const DEV_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    #[test]
    fn derives_address_from_key() {
        let account = SigningAccount::from_hex(DEV_KEY).unwrap();
        assert_eq!(account.address().to_checksum(), DEV_ADDRESS);

        let unprefixed = SigningAccount::from_hex(&DEV_KEY[2..]).unwrap();
        assert_eq!(unprefixed.address(), account.address());
    }

    #[test]
    fn rejects_malformed_keys() {
        assert!(matches!(
            SigningAccount::from_hex("0x1234"),
            Err(BootstrapError::InvalidKey(_))
        ));
        assert!(matches!(
            SigningAccount::from_hex(&format!("0x{}", "zz".repeat(32))),
            Err(BootstrapError::InvalidKey(_))
        ));
        assert!(SigningAccount::from_bytes(&[0u8; 32]).is_err());
    }

    #[test]
    fn debug_never_prints_key_material() {
        let account = SigningAccount::from_hex(DEV_KEY).unwrap();
        let rendered = format!("{account:?}");
        assert!(rendered.contains(DEV_ADDRESS));
        assert!(!rendered.contains(&DEV_KEY[2..]));
    }

    #[test]
    fn loads_key_file_with_trailing_newline() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{DEV_KEY}").unwrap();
        let account = SigningAccount::from_file(file.path()).unwrap();
        assert_eq!(account.address().to_checksum(), DEV_ADDRESS);
    }
}
