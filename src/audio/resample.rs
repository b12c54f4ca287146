use anyhow::Result;
use rubato::{Resampler, SincFixedIn, SincInterpolationType, WindowFunction};

use super::TARGET_SAMPLE_RATE;

/// Resamples a mono stream to [`TARGET_SAMPLE_RATE`], compensating for the
/// sinc filter's group delay so the output lines up with the input.
pub fn resample_to_target(samples: &[f32], sample_rate: u32) -> Result<Vec<f32>> {
    if sample_rate == TARGET_SAMPLE_RATE {
        return Ok(samples.to_vec());
    }
    if samples.is_empty() {
        return Ok(Vec::new());
    }

    let params = rubato::SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let resample_ratio = TARGET_SAMPLE_RATE as f64 / sample_rate as f64;
    let mut resampler =
        SincFixedIn::<f32>::new(resample_ratio, 2.0, params, samples.len(), 1)?;

    let mut output = resampler.process(&[samples.to_vec()], None)?.remove(0);
    let delay = resampler.output_delay();
    let expected_frames = (samples.len() as f64 * resample_ratio) as usize;

    // The filter holds its look-ahead back until more input arrives. Flush
    // with empty input until the delay-trimmed window is fully covered, or
    // the tail of the clip goes missing.
    while output.len() < delay + expected_frames {
        let mut tail = resampler.process_partial::<Vec<f32>>(None, None)?;
        let tail = tail.remove(0);
        if tail.is_empty() {
            break;
        }
        output.extend_from_slice(&tail);
    }

    let start = delay.min(output.len());
    let end = (delay + expected_frames).min(output.len());

    Ok(output[start..end].to_vec())
}
