//! Replay-protected legacy transactions: RLP layout, signing, and sender recovery.

use crate::abi::{self, Token};
use crate::account::SigningAccount;
use crate::error::GatewayError;
use crate::ledger::CallRequest;
use crate::signature::recover_prehash;
use crate::types::{keccak256, Address, H256};
use k256::ecdsa::{RecoveryId, Signature};

/// Contract write with its ledger parameters fixed, ready to sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWrite {
    pub function: &'static str,
    pub arguments: Vec<Token>,
    pub to: Address,
    pub nonce: u64,
    pub gas_limit: u64,
    pub gas_price: u64,
    pub chain_id: u64,
}

impl PendingWrite {
    pub fn calldata(&self) -> Vec<u8> {
        abi::encode_call(self.function, &self.arguments)
    }

    /// Same write expressed as a read-only call, for replaying a failure.
    pub fn call_request(&self, from: Address) -> CallRequest {
        CallRequest {
            from: Some(from),
            to: self.to,
            data: self.calldata(),
            gas: Some(self.gas_limit),
            gas_price: Some(self.gas_price),
        }
    }

    fn envelope(&self) -> LegacyEnvelope {
        LegacyEnvelope::new(
            self.nonce,
            self.gas_price,
            self.gas_limit,
            &self.to,
            0,
            &self.calldata(),
            self.chain_id,
        )
    }

    /// Digest over the fields plus `chain_id, 0, 0`.
    pub fn signing_hash(&self) -> [u8; 32] {
        self.envelope().signing_hash()
    }

    pub fn sign(self, account: &SigningAccount) -> Result<SignedTransaction, GatewayError> {
        let sealed = self.envelope().seal(account)?;
        Ok(SignedTransaction {
            write: self,
            from: account.address(),
            raw: sealed.raw,
            hash: sealed.hash,
            v: sealed.v,
            r: sealed.r,
            s: sealed.s,
        })
    }
}

/// RLP fields of a legacy transaction before the signature is attached.
struct LegacyEnvelope {
    fields: Vec<Vec<u8>>,
    chain_id: u64,
}

struct Sealed {
    raw: Vec<u8>,
    hash: H256,
    v: u64,
    r: [u8; 32],
    s: [u8; 32],
}

impl LegacyEnvelope {
    fn new(
        nonce: u64,
        gas_price: u64,
        gas_limit: u64,
        to: &Address,
        value: u64,
        data: &[u8],
        chain_id: u64,
    ) -> Self {
        let fields = vec![
            rlp_uint(nonce),
            rlp_uint(gas_price),
            rlp_uint(gas_limit),
            rlp_bytes(to.as_bytes()),
            rlp_uint(value),
            rlp_bytes(data),
        ];
        Self { fields, chain_id }
    }

    fn signing_hash(&self) -> [u8; 32] {
        let mut fields = self.fields.clone();
        fields.push(rlp_uint(self.chain_id));
        fields.push(rlp_uint(0));
        fields.push(rlp_uint(0));
        keccak256(&rlp_list(&fields))
    }

    /// Sign and attach `v = recovery_id + chain_id * 2 + 35`.
    fn seal(self, account: &SigningAccount) -> Result<Sealed, GatewayError> {
        let (signature, recovery_id) = account.sign_prehash(&self.signing_hash())?;
        let v = self
            .chain_id
            .checked_mul(2)
            .and_then(|doubled| doubled.checked_add(35))
            .and_then(|base| base.checked_add(u64::from(recovery_id.to_byte())))
            .ok_or_else(|| {
                GatewayError::Ledger(format!(
                    "chain id {} too large for replay protection",
                    self.chain_id
                ))
            })?;

        let bytes = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);

        let mut fields = self.fields;
        fields.push(rlp_uint(v));
        fields.push(rlp_scalar(&r));
        fields.push(rlp_scalar(&s));
        let raw = rlp_list(&fields);
        let hash = H256::from(keccak256(&raw));
        Ok(Sealed { raw, hash, v, r, s })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub write: PendingWrite,
    pub from: Address,
    pub raw: Vec<u8>,
    pub hash: H256,
    pub v: u64,
    pub r: [u8; 32],
    pub s: [u8; 32],
}

impl SignedTransaction {
    pub fn raw_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.raw))
    }

    /// Recover the sender from the signature alone.
    pub fn recover_sender(&self) -> Option<Address> {
        let base = self.write.chain_id.checked_mul(2)?.checked_add(35)?;
        let recovery_byte = u8::try_from(self.v.checked_sub(base)?).ok()?;
        let recovery_id = RecoveryId::from_byte(recovery_byte)?;

        let mut compact = [0u8; 64];
        compact[..32].copy_from_slice(&self.r);
        compact[32..].copy_from_slice(&self.s);
        let signature = Signature::from_slice(&compact).ok()?;
        recover_prehash(&self.write.signing_hash(), &signature, recovery_id)
    }
}

fn rlp_bytes(bytes: &[u8]) -> Vec<u8> {
    if bytes.len() == 1 && bytes[0] < 0x80 {
        return bytes.to_vec();
    }
    let mut out = rlp_length_prefix(bytes.len(), 0x80);
    out.extend_from_slice(bytes);
    out
}

fn rlp_uint(value: u64) -> Vec<u8> {
    rlp_bytes(trim_leading_zeros(&value.to_be_bytes()))
}

fn rlp_scalar(value: &[u8; 32]) -> Vec<u8> {
    rlp_bytes(trim_leading_zeros(value))
}

fn rlp_list(items: &[Vec<u8>]) -> Vec<u8> {
    let payload = items.concat();
    let mut out = rlp_length_prefix(payload.len(), 0xc0);
    out.extend(payload);
    out
}

fn rlp_length_prefix(len: usize, offset: u8) -> Vec<u8> {
    if len < 56 {
        return vec![offset + len as u8];
    }
    let len_bytes = (len as u64).to_be_bytes();
    let trimmed = trim_leading_zeros(&len_bytes);
    let mut out = vec![offset + 55 + trimmed.len() as u8];
    out.extend_from_slice(trimmed);
    out
}

fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first = bytes
        .iter()
        .position(|byte| *byte != 0)
        .unwrap_or(bytes.len());
    &bytes[first..]
}
