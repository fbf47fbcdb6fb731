//! [`VerifyJob`]: the unit of work handed from a reader to a verifier.
//! Move-only ownership: the queue transfers the job, exactly one verifier
//! owns it, and that verifier is responsible for releasing `memory_size`
//! back to the arbiter on every exit path.

use std::path::PathBuf;

pub struct VerifyJob {
    /// Contiguous scoops for this slab, `buffer.len() == memory_size`
    /// (`num_scoops() == memory_size / 64`).
    pub buffer: Vec<u8>,
    pub account_id: u64,
    /// First nonce number of the plot file this slab came from.
    pub nonce_start: u64,
    /// Offset, in nonces, within the file where this slab begins.
    pub nonce_read: u64,
    pub input_path: PathBuf,
    pub block: u64,
    pub gensig: [u8; 32],
    pub base_target: u64,
    pub memory_size: u64,
}

impl VerifyJob {
    pub fn num_scoops(&self) -> usize {
        self.buffer.len() / crate::plot::SCOOP_SIZE
    }

    pub fn scoop(&self, i: usize) -> &[u8] {
        let start = i * crate::plot::SCOOP_SIZE;
        &self.buffer[start..start + crate::plot::SCOOP_SIZE]
    }
}
