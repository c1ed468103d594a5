//! Chronologically ordered push keys.
//!
//! Keys are 20 characters: 8 encode the creation time in milliseconds, 12
//! are random. Keys created within the same millisecond increment the random
//! part, so lexical order always matches creation order.

use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use rand::Rng;

const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";
const TIME_CHARS: usize = 8;
const RANDOM_CHARS: usize = 12;

#[derive(Debug, Default)]
struct PushState {
    last_millis: i64,
    last_random: [u8; RANDOM_CHARS],
}

/// Generates keys for `push` on stores that do not assign their own.
#[derive(Debug, Default)]
pub struct PushIdGenerator {
    state: Mutex<PushState>,
}

impl PushIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> String {
        self.next_id_at(Utc::now().timestamp_millis())
    }

    fn next_id_at(&self, millis: i64) -> String {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if millis == state.last_millis {
            for digit in state.last_random.iter_mut().rev() {
                if *digit == 63 {
                    *digit = 0;
                } else {
                    *digit += 1;
                    break;
                }
            }
        } else {
            let mut rng = rand::thread_rng();
            for digit in state.last_random.iter_mut() {
                *digit = rng.gen_range(0..64);
            }
            state.last_millis = millis;
        }

        let mut time = [0u8; TIME_CHARS];
        let mut remaining = millis.max(0);
        for slot in time.iter_mut().rev() {
            *slot = PUSH_CHARS[(remaining % 64) as usize];
            remaining /= 64;
        }

        let mut id = String::with_capacity(TIME_CHARS + RANDOM_CHARS);
        id.extend(time.iter().map(|c| *c as char));
        id.extend(
            state
                .last_random
                .iter()
                .map(|digit| PUSH_CHARS[*digit as usize] as char),
        );
        id
    }
}
