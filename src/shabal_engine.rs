//! Width-1/4/8 Shabal-256 batching.
//!
//! The hashing primitive itself comes from the `shabal` crate (RustCrypto
//! family `Digest` trait); what this module adds is the lane-batching
//! contract the verifier's inner loop needs: a cheap-to-clone prefix state
//! shared across lanes, and width-4/width-8 engines that advance `W`
//! independent lanes in lock-step. The caller (the verifier) guarantees
//! all lanes are non-null; tail handling falls back to width-1 rather
//! than padding with null lanes.

use digest::Digest;

pub const HASH_SIZE: usize = 32;

/// A Shabal-256 instance with the gensig prefix already fed in, cheap to
/// clone so every scoop in a job can fork from the same prefix state.
#[derive(Clone)]
pub struct ScalarEngine {
    inner: shabal::Shabal256,
}

impl ScalarEngine {
    /// Starts a fresh instance and feeds `prefix` (the 32-byte gensig).
    pub fn with_prefix(prefix: &[u8]) -> Self {
        let mut inner = shabal::Shabal256::new();
        inner.update(prefix);
        ScalarEngine { inner }
    }

    /// Cheap state copy so the prefix needn't be re-hashed per scoop.
    pub fn fork(&self) -> Self {
        self.clone()
    }

    /// Feeds `tail` (the 64-byte scoop) and finalizes into a 32-byte digest.
    pub fn close(self, tail: &[u8]) -> [u8; HASH_SIZE] {
        let mut inner = self.inner;
        inner.update(tail);
        let out = inner.finalize();
        let mut buf = [0u8; HASH_SIZE];
        buf.copy_from_slice(&out);
        buf
    }
}

/// The little-endian u64 deadline material: the first 8 bytes of the
/// digest interpreted as a little-endian integer.
pub fn deadline_material(digest: &[u8; HASH_SIZE]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[0..8]);
    u64::from_le_bytes(bytes)
}

macro_rules! batched_engine {
    ($name:ident, $width:expr) => {
        /// Lock-step batch of independent Shabal-256 lanes sharing one
        /// gensig prefix. All lanes must be fed and closed together.
        pub struct $name {
            lanes: [ScalarEngine; $width],
        }

        impl $name {
            pub const WIDTH: usize = $width;

            pub fn from_prefix(prefix: &ScalarEngine) -> Self {
                $name {
                    lanes: std::array::from_fn(|_| prefix.fork()),
                }
            }

            /// `tails[i]` is the 64-byte scoop for lane `i`; caller
            /// guarantees every lane has a real tail (no null lanes).
            pub fn close(self, tails: [&[u8]; $width]) -> [[u8; HASH_SIZE]; $width] {
                let mut out = [[0u8; HASH_SIZE]; $width];
                for (i, lane) in self.lanes.into_iter().enumerate() {
                    out[i] = lane.close(tails[i]);
                }
                out
            }
        }
    };
}

batched_engine!(Width4Engine, 4);
batched_engine!(Width8Engine, 8);

/// SIMD width selected once at startup per the CPU's feature set, fixed
/// for the lifetime of a verifier worker. Avoids runtime polymorphism
/// inside the hot loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimdWidth {
    Scalar,
    Four,
    Eight,
}

impl SimdWidth {
    /// Picks the widest width whose matching CPU feature is present.
    /// Because lanes here are independent scalar engines rather than true
    /// machine-SIMD instructions, every width is always available; we
    /// still gate on `avx2`/`sse2` so the reported width tracks what real
    /// vectorized hardware could exploit.
    pub fn detect() -> SimdWidth {
        cfg_if::cfg_if! {
            if #[cfg(target_arch = "x86_64")] {
                if is_x86_feature_detected!("avx2") {
                    SimdWidth::Eight
                } else if is_x86_feature_detected!("sse2") {
                    SimdWidth::Four
                } else {
                    SimdWidth::Scalar
                }
            } else {
                SimdWidth::Scalar
            }
        }
    }

    pub fn lanes(self) -> usize {
        match self {
            SimdWidth::Scalar => 1,
            SimdWidth::Four => 4,
            SimdWidth::Eight => 8,
        }
    }
}
