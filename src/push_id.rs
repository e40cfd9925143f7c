//! Client-side generation of time-ordered database keys.
//!
//! Keys use the realtime database push-id layout: 8 characters encoding the
//! millisecond timestamp followed by 12 random characters, all drawn from an
//! alphabet whose ASCII order matches its numeric order. Keys sort
//! lexicographically by creation time. Within a single generator they are
//! strictly increasing, even for several keys in the same millisecond.

use std::sync::Mutex;

use chrono::Utc;
use rand::Rng;

use crate::error::FireLogError;

/// Alphabet in ascending ASCII order.
const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

const TIMESTAMP_LEN: usize = 8;
const RANDOM_LEN: usize = 12;

/// Length of every generated key.
pub const PUSH_ID_LEN: usize = TIMESTAMP_LEN + RANDOM_LEN;

#[derive(Debug, Default)]
struct PushState {
    /// Timestamp of the previous key, `None` before the first one
    last_ms: Option<i64>,
    last_random: [u8; RANDOM_LEN],
}

/// Generator for monotonic, collision-resistant push keys.
#[derive(Debug, Default)]
pub struct PushIdGenerator {
    state: Mutex<PushState>,
}

impl PushIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a key for the current time.
    pub fn generate(&self) -> Result<String, FireLogError> {
        self.generate_at(Utc::now().timestamp_millis())
    }

    /// Generate a key for the given epoch-millisecond timestamp.
    ///
    /// A timestamp earlier than the previous one is clamped to it, so a clock
    /// stepping backwards never breaks ordering.
    ///
    /// # Errors
    ///
    /// Returns `KeyGenerationFailed` if the timestamp cannot be encoded or the
    /// random suffix space for one millisecond is exhausted. A failed call
    /// leaves the generator state unchanged.
    pub fn generate_at(&self, now_ms: i64) -> Result<String, FireLogError> {
        if now_ms < 0 {
            return Err(FireLogError::KeyGenerationFailed(format!(
                "timestamp {} is before the epoch",
                now_ms
            )));
        }

        let mut state = self
            .state
            .lock()
            .map_err(|_| FireLogError::KeyGenerationFailed("generator state poisoned".to_string()))?;

        let now_ms = state.last_ms.map_or(now_ms, |last| now_ms.max(last));
        let mut key = encode_timestamp(now_ms)?;

        let random = match state.last_ms {
            Some(last) if last == now_ms => {
                let mut random = state.last_random;
                increment_random(&mut random)?;
                random
            }
            _ => {
                let mut rng = rand::thread_rng();
                let mut random = [0u8; RANDOM_LEN];
                for slot in random.iter_mut() {
                    *slot = rng.gen_range(0..64);
                }
                random
            }
        };
        state.last_ms = Some(now_ms);
        state.last_random = random;

        key.extend(random.iter().map(|&i| PUSH_CHARS[i as usize] as char));
        Ok(key)
    }
}

fn encode_timestamp(mut ms: i64) -> Result<String, FireLogError> {
    let mut chars = [0u8; TIMESTAMP_LEN];
    for slot in chars.iter_mut().rev() {
        *slot = PUSH_CHARS[(ms % 64) as usize];
        ms /= 64;
    }
    if ms != 0 {
        return Err(FireLogError::KeyGenerationFailed(
            "timestamp does not fit in a push key".to_string(),
        ));
    }
    let mut key = String::with_capacity(PUSH_ID_LEN);
    key.extend(chars.iter().map(|&c| c as char));
    Ok(key)
}

fn increment_random(random: &mut [u8; RANDOM_LEN]) -> Result<(), FireLogError> {
    for slot in random.iter_mut().rev() {
        if *slot == 63 {
            *slot = 0;
        } else {
            *slot += 1;
            return Ok(());
        }
    }
    Err(FireLogError::KeyGenerationFailed(
        "push key space exhausted for this millisecond".to_string(),
    ))
}
