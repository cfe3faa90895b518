use rand::RngCore;

const MULTIPLIER: u64 = 6364136223846793005;
const INCREMENT: u64 = 1442695040888963407;

/// 64-bit linear-congruential generator.
///
/// Implements [`RngCore`] so the `rand::Rng` helpers (`random_range`,
/// `random_bool`) drive it; the same seed always yields the same stream.
#[derive(Debug, Clone)]
pub struct Lcg {
    state: u64,
}

impl Lcg {
    pub fn new(seed: u64) -> Self {
        let mut rng = Self {
            state: seed ^ 0x9e3779b97f4a7c15,
        };
        rng.step();
        rng
    }

    /// Seed drawn from ambient entropy, returned so callers can record it.
    pub fn from_entropy() -> (Self, u64) {
        let seed = rand::random::<u64>();
        (Self::new(seed), seed)
    }

    fn step(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(MULTIPLIER)
            .wrapping_add(INCREMENT);
        self.state
    }
}

impl RngCore for Lcg {
    fn next_u32(&mut self) -> u32 {
        (self.step() >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        let high = self.next_u32() as u64;
        let low = self.next_u32() as u64;
        (high << 32) | low
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        for chunk in dst.chunks_mut(4) {
            let bytes = self.next_u32().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }
}
