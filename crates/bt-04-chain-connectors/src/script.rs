//! UTXO HTLC script construction.
//!
//! The redeem script layout:
//!
//! ```text
//! IF
//!   OP_SHA256 OP_RIPEMD160 <H(20)> OP_EQUALVERIFY
//!   OP_DUP OP_HASH160 <recipient_pkh(20)>
//! ELSE
//!   <locktime> OP_CHECKLOCKTIMEVERIFY OP_DROP
//!   OP_DUP OP_HASH160 <refund_pkh(20)>
//! ENDIF
//! OP_EQUALVERIFY OP_CHECKSIG
//! ```
//!
//! The recipient branch is spent by pushing
//! `<sig> <pubkey> <secret> OP_TRUE <redeem_script>`; the refund branch by
//! `<sig> <pubkey> OP_FALSE <redeem_script>` after the locktime.

use shared_crypto::{hash160, sha256};
use shared_types::Hash160;

/// Script opcodes used by the HTLC template.
pub mod opcodes {
    /// Begin conditional branch.
    pub const OP_IF: u8 = 0x63;
    /// Alternative branch.
    pub const OP_ELSE: u8 = 0x67;
    /// End conditional.
    pub const OP_ENDIF: u8 = 0x68;
    /// Drop top stack item.
    pub const OP_DROP: u8 = 0x75;
    /// Duplicate top stack item.
    pub const OP_DUP: u8 = 0x76;
    /// Equality check, fail-fast.
    pub const OP_EQUALVERIFY: u8 = 0x88;
    /// RIPEMD-160 of top item.
    pub const OP_RIPEMD160: u8 = 0xa6;
    /// SHA-256 then RIPEMD-160 of top item.
    pub const OP_HASH160: u8 = 0xa9;
    /// SHA-256 of top item.
    pub const OP_SHA256: u8 = 0xa8;
    /// Signature check.
    pub const OP_CHECKSIG: u8 = 0xac;
    /// Absolute locktime gate.
    pub const OP_CHECKLOCKTIMEVERIFY: u8 = 0xb1;
}

/// Push a data blob with the minimal direct-push opcode.
fn push_data(script: &mut Vec<u8>, data: &[u8]) {
    debug_assert!(data.len() < 0x4c, "direct push only");
    script.push(data.len() as u8);
    script.extend_from_slice(data);
}

/// Minimal CScriptNum encoding of a non-negative integer.
fn script_num(value: u64) -> Vec<u8> {
    if value == 0 {
        return Vec::new();
    }
    let mut bytes = Vec::new();
    let mut v = value;
    while v > 0 {
        bytes.push((v & 0xff) as u8);
        v >>= 8;
    }
    // A set high bit would flip the sign; pad with a zero byte.
    if bytes.last().is_some_and(|b| b & 0x80 != 0) {
        bytes.push(0x00);
    }
    bytes
}

/// Build the HTLC redeem script.
#[must_use]
pub fn htlc_redeem_script(
    hash_lock: &Hash160,
    recipient_pkh: &Hash160,
    refund_pkh: &Hash160,
    locktime: u64,
) -> Vec<u8> {
    use opcodes::*;

    let mut script = Vec::with_capacity(81);
    script.push(OP_IF);
    script.push(OP_SHA256);
    script.push(OP_RIPEMD160);
    push_data(&mut script, hash_lock.as_bytes());
    script.push(OP_EQUALVERIFY);
    script.push(OP_DUP);
    script.push(OP_HASH160);
    push_data(&mut script, recipient_pkh.as_bytes());
    script.push(OP_ELSE);
    push_data(&mut script, &script_num(locktime));
    script.push(OP_CHECKLOCKTIMEVERIFY);
    script.push(OP_DROP);
    script.push(OP_DUP);
    script.push(OP_HASH160);
    push_data(&mut script, refund_pkh.as_bytes());
    script.push(OP_ENDIF);
    script.push(OP_EQUALVERIFY);
    script.push(OP_CHECKSIG);
    script
}

/// Base58Check encoding of `version ‖ payload`.
#[must_use]
pub fn base58check(version: u8, payload: &[u8]) -> String {
    let mut data = Vec::with_capacity(1 + payload.len() + 4);
    data.push(version);
    data.extend_from_slice(payload);
    let checksum = sha256(&sha256(&data));
    data.extend_from_slice(&checksum[..4]);
    bs58::encode(data).into_string()
}

/// The P2SH escrow address of a redeem script.
#[must_use]
pub fn p2sh_address(script: &[u8], version: u8) -> String {
    base58check(version, hash160(script).as_bytes())
}
