// Transaction identifier generation
//
// Branch and tag tokens carry 64 random bits, so for n draws the chance of
// any collision is at most n^2 / 2^65 (about 2.7e-12 for n = 10_000).
// Call-IDs are UUID v4 values with 122 random bits: at most n^2 / 2^123.

use std::cell::RefCell;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::rngs::{OsRng, SmallRng};
use rand::{Rng, RngCore, SeedableRng};
use uuid::Uuid;

use crate::error::SimError;
use crate::sip::BRANCH_MAGIC_COOKIE;

thread_local! {
    static FAST_RNG: RefCell<SmallRng> = RefCell::new(SmallRng::from_entropy());
}

/// Source of per-transaction unique tokens.
pub trait TokenSource: Send + Sync {
    /// Via branch parameter, always prefixed with the RFC 3261 magic cookie.
    fn branch(&self) -> String;
    /// From/To tag parameter.
    fn tag(&self) -> String;
    /// Call-ID value, unique across clients for the process lifetime.
    fn call_id(&self) -> String;
}

fn hex64(prefix: &str, value: u64) -> String {
    let mut buf = String::with_capacity(prefix.len() + 16);
    buf.push_str(prefix);
    write!(buf, "{:016x}", value).unwrap();
    buf
}

/// Random tokens backed by a thread-local `SmallRng` and UUID v4 call-ids.
#[derive(Debug, Clone, Copy)]
pub struct RandomTokens;

impl RandomTokens {
    /// Check the OS randomness source once. Failure here is a fatal startup
    /// condition; generation afterwards cannot fail.
    pub fn new() -> Result<Self, SimError> {
        let mut seed = [0u8; 16];
        OsRng
            .try_fill_bytes(&mut seed)
            .map_err(|e| SimError::EntropyUnavailable(e.to_string()))?;
        Ok(RandomTokens)
    }

    fn next_u64() -> u64 {
        FAST_RNG.with(|rng| rng.borrow_mut().gen())
    }
}

impl TokenSource for RandomTokens {
    fn branch(&self) -> String {
        hex64(BRANCH_MAGIC_COOKIE, Self::next_u64())
    }

    fn tag(&self) -> String {
        hex64("", Self::next_u64())
    }

    fn call_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Deterministic counter-based tokens for tests.
#[derive(Debug, Default)]
pub struct SequentialTokens {
    counter: AtomicU64,
}

impl SequentialTokens {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl TokenSource for SequentialTokens {
    fn branch(&self) -> String {
        hex64(BRANCH_MAGIC_COOKIE, self.next())
    }

    fn tag(&self) -> String {
        hex64("", self.next())
    }

    fn call_id(&self) -> String {
        hex64("call-", self.next())
    }
}
