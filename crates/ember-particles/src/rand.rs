//! Lightweight xorshift32 PRNG owned by each controller

use glam::Vec3;

/// Seedable generator passed explicitly to every stage that samples randomness.
#[derive(Debug, Clone)]
pub struct ParticleRng {
    state: u32,
}

impl ParticleRng {
    pub fn new(seed: u32) -> Self {
        Self {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    /// Derive an independent generator, e.g. for a copied controller
    pub fn fork(&mut self) -> Self {
        Self::new(self.next_u32() ^ 0x9E37_79B9)
    }

    fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Returns a float in [0, 1)
    pub fn next_f32(&mut self) -> f32 {
        // 24 random mantissa bits keep the result strictly below 1.0
        (self.next_u32() >> 8) as f32 / (1u32 << 24) as f32
    }

    /// Returns a float in [min, max)
    pub fn range(&mut self, min: f32, max: f32) -> f32 {
        min + self.next_f32() * (max - min)
    }

    /// Returns an index in [0, len). `len` must be non-zero.
    pub fn index(&mut self, len: usize) -> usize {
        ((self.next_f32() * len as f32) as usize).min(len.saturating_sub(1))
    }

    pub fn next_bool(&mut self) -> bool {
        self.next_u32() & 1 == 1
    }

    /// Returns a random unit direction vector (uniformly on sphere surface)
    pub fn random_direction(&mut self) -> Vec3 {
        // Marsaglia method for uniform sphere sampling
        loop {
            let x = self.range(-1.0, 1.0);
            let y = self.range(-1.0, 1.0);
            let s = x * x + y * y;
            if s < 1.0 {
                let factor = 2.0 * (1.0 - s).sqrt();
                return Vec3::new(x * factor, y * factor, 1.0 - 2.0 * s);
            }
        }
    }
}

impl Default for ParticleRng {
    fn default() -> Self {
        Self::new(0xDEAD_BEEF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rng_range_bounds() {
        let mut rng = ParticleRng::new(42);
        for _ in 0..1000 {
            let v = rng.range(0.0, 10.0);
            assert!((0.0..10.0).contains(&v));
        }
    }

    #[test]
    fn rng_index_bounds() {
        let mut rng = ParticleRng::new(7);
        for _ in 0..1000 {
            assert!(rng.index(3) < 3);
        }
        assert_eq!(rng.index(1), 0);
    }

    #[test]
    fn rng_direction_unit_length() {
        let mut rng = ParticleRng::new(123);
        for _ in 0..100 {
            let d = rng.random_direction();
            assert!((d.length() - 1.0).abs() < 0.01);
        }
    }

    #[test]
    fn forked_generators_diverge() {
        let mut a = ParticleRng::new(5);
        let mut b = a.fork();
        let same = (0..16).filter(|_| a.next_f32() == b.next_f32()).count();
        assert!(same < 16);
    }
}
