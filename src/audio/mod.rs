pub mod decode;
pub mod resample;
pub mod segment;

/// Every clip is normalized to this rate before segmentation, so millisecond
/// offsets map to exact sample offsets.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Decoded audio: mono f32 samples at [`TARGET_SAMPLE_RATE`].
#[derive(Clone, Debug, PartialEq)]
pub struct AudioClip {
    samples: Vec<f32>,
}

impl AudioClip {
    pub fn from_samples(samples: Vec<f32>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn duration_ms(&self) -> u64 {
        self.samples.len() as u64 * 1000 / TARGET_SAMPLE_RATE as u64
    }
}
