//! Gensig decoding and scoop-number derivation. Scoop-encoding proper (the
//! per-scoop deadline hash) lives in [`crate::shabal_engine`] and
//! [`crate::verifier`]; this module only covers the small amount of
//! gensig bookkeeping that every block announcement needs.

use crate::shabal_engine::{deadline_material, ScalarEngine};

/// Decodes a hex-encoded generation signature as handed out by
/// `getMiningInfo`.
pub fn decode_gensig(gensig: &str) -> Result<[u8; 32], hex::FromHexError> {
    let bytes = hex::decode(gensig)?;
    let mut out = [0u8; 32];
    if bytes.len() != 32 {
        return Err(hex::FromHexError::InvalidStringLength);
    }
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Derives the active scoop number for `height` under `gensig`.
///
/// This is a chain-protocol constant with no single canonical source
/// document; the scheme below follows the Burstcoin convention of hashing
/// `gensig || height_be` and taking the low 12 bits out of the resulting
/// digest's last two bytes.
pub fn calculate_scoop(height: u64, gensig: &[u8; 32]) -> u32 {
    let mut data = [0u8; 64];
    data[..32].copy_from_slice(gensig);
    data[32..40].copy_from_slice(&height.to_be_bytes());

    let digest = ScalarEngine::with_prefix(&[]).close(&data);
    (u32::from(digest[30] & 0x0F) << 8) | u32::from(digest[31])
}

/// Computes the deadline for a single nonce given its scoop bytes:
/// `shabal256(gensig || scoop) as u64_le / base_target`. Exposed for tests
/// and reference scans; the verifier pool uses the batched engines
/// directly instead of this one-nonce-at-a-time helper.
pub fn deadline_for_scoop(gensig: &[u8; 32], scoop: &[u8; 64], base_target: u64) -> Option<u64> {
    if base_target == 0 {
        return None;
    }
    let digest = ScalarEngine::with_prefix(gensig).close(scoop);
    Some(deadline_material(&digest) / base_target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_gensig_roundtrips_hex() {
        let hex_str = "00".repeat(32);
        let decoded = decode_gensig(&hex_str).unwrap();
        assert_eq!(decoded, [0u8; 32]);
    }

    #[test]
    fn decode_gensig_rejects_wrong_length() {
        assert!(decode_gensig("00").is_err());
    }

    #[test]
    fn scoop_is_within_range() {
        let gensig = [0u8; 32];
        for height in [0u64, 1, 12345, u64::MAX] {
            let scoop = calculate_scoop(height, &gensig);
            assert!(scoop < 4096);
        }
    }

    #[test]
    fn scoop_depends_on_height() {
        let gensig = [1u8; 32];
        let a = calculate_scoop(1, &gensig);
        let b = calculate_scoop(2, &gensig);
        // Not a mathematical guarantee, but collisions across two arbitrary
        // heights under a cryptographic hash are not something real runs hit.
        assert_ne!(a, b);
    }

    #[test]
    fn base_target_zero_is_rejected() {
        assert_eq!(deadline_for_scoop(&[0u8; 32], &[0u8; 64], 0), None);
    }

    #[test]
    fn deadline_is_deterministic() {
        let gensig = [5u8; 32];
        let scoop = [6u8; 64];
        let a = deadline_for_scoop(&gensig, &scoop, 1).unwrap();
        let b = deadline_for_scoop(&gensig, &scoop, 1).unwrap();
        assert_eq!(a, b);
    }
}
