//! Shortcode generation.

use std::collections::HashSet;

use rand::Rng;

use crate::{CodeGenerator, CoreError, ShortCode};

/// Alphanumeric alphabet for generated codes. Generated codes use neither
/// '-' nor '_' even though custom codes may.
pub const ALPHABET: &[u8; 62] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Length of generated codes.
pub const DEFAULT_CODE_LEN: usize = 6;

/// How many candidates to draw before giving up.
pub const DEFAULT_ATTEMPT_BUDGET: u32 = 100;

/// Random-draw code generator. Draws fixed-length candidates from the
/// alphanumeric alphabet and accepts the first one not already in use.
#[derive(Clone, Copy, Debug)]
pub struct RandomCodeGenerator {
    length: usize,
    attempt_budget: u32,
}

impl RandomCodeGenerator {
    pub fn new(length: usize, attempt_budget: u32) -> Self {
        Self {
            length,
            attempt_budget,
        }
    }

    fn draw(&self) -> String {
        let mut rng = rand::rng();
        (0..self.length)
            .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
            .collect()
    }
}

impl Default for RandomCodeGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_CODE_LEN, DEFAULT_ATTEMPT_BUDGET)
    }
}

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self, existing: &HashSet<String>) -> Result<ShortCode, CoreError> {
        for _ in 0..self.attempt_budget {
            let candidate = self.draw();
            if !existing.contains(&candidate) {
                return Ok(ShortCode::from_generated(candidate));
            }
        }
        Err(CoreError::GenerationExhausted {
            attempts: self.attempt_budget,
        })
    }
}
