//! Human-behavior timing.
//!
//! Randomized delays between actions plus simulated on-page behaviour
//! (scroll passes with reading pauses, occasional scroll-ups) so the
//! engine's footprint is not mechanically uniform.

use std::time::Duration;

use anyhow::Result;
use rand::distr::{Distribution, Uniform};
use tracing::debug;

use crate::browser::PageDriver;

#[derive(Debug, Clone, Copy)]
pub struct HumanPacing {
    /// Delay range between listings on a search page, in ms.
    pub listing_delay_ms: (u64, u64),
    /// Delay range between application submissions, in ms.
    pub application_delay_ms: (u64, u64),
}

impl HumanPacing {
    pub fn new(listing_delay_ms: (u64, u64), application_delay_ms: (u64, u64)) -> Self {
        Self {
            listing_delay_ms,
            application_delay_ms,
        }
    }

    fn jitter(range: (u64, u64)) -> u64 {
        let (min, max) = range;
        if max <= min {
            return min;
        }
        let mut rng = rand::rng();
        let dist = Uniform::new_inclusive(min, max).expect("valid delay range");
        dist.sample(&mut rng)
    }

    pub async fn between_listings(&self) {
        let ms = Self::jitter(self.listing_delay_ms);
        debug!("Pacing: {}ms between listings", ms);
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    pub async fn between_applications(&self) {
        let ms = Self::jitter(self.application_delay_ms);
        debug!("Pacing: {}ms between applications", ms);
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    /// A short pause after a click or field fill, the gap a person leaves
    /// while the UI reacts.
    pub async fn micro_pause(&self) {
        let ms = Self::jitter((300, 1_200));
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    /// Simulate a human reading the current page: an initial idle, then a
    /// few randomized smooth-scroll passes with occasional scroll-backs.
    /// Scroll errors are non-fatal — some pages block evaluate.
    pub async fn simulate_reading(&self, driver: &dyn PageDriver) -> Result<()> {
        let idle_ms = Self::jitter((800, 2_500));
        tokio::time::sleep(Duration::from_millis(idle_ms)).await;

        let passes: Vec<(u64, u64, bool, u64)> = {
            let mut rng = rand::rng();
            let pass_dist = Uniform::new(2usize, 5).expect("range");
            let scroll_dist = Uniform::new(200u64, 700).expect("range");
            let pause_dist = Uniform::new(300u64, 1_500).expect("range");
            let back_dist = Uniform::new(50u64, 200).expect("range");
            let chance_dist = Uniform::new(0u8, 5).expect("range");

            (0..pass_dist.sample(&mut rng))
                .map(|_| {
                    (
                        scroll_dist.sample(&mut rng),
                        pause_dist.sample(&mut rng),
                        chance_dist.sample(&mut rng) == 0,
                        back_dist.sample(&mut rng),
                    )
                })
                .collect()
        };

        for (distance, pause_ms, scroll_back, back_distance) in passes {
            if let Err(e) = driver
                .evaluate(&format!(
                    "window.scrollBy({{top: {}, behavior: 'smooth'}});",
                    distance
                ))
                .await
            {
                debug!("Scroll simulation error (non-fatal): {}", e);
            }
            tokio::time::sleep(Duration::from_millis(pause_ms)).await;

            if scroll_back {
                if let Err(e) = driver
                    .evaluate(&format!(
                        "window.scrollBy({{top: -{}, behavior: 'smooth'}});",
                        back_distance
                    ))
                    .await
                {
                    debug!("Scroll-up simulation error (non-fatal): {}", e);
                }
                tokio::time::sleep(Duration::from_millis(200 + back_distance % 300)).await;
            }
        }
        Ok(())
    }
}

impl Default for HumanPacing {
    fn default() -> Self {
        Self::new((1_500, 4_500), (5_000, 15_000))
    }
}
