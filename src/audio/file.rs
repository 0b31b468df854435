use crate::audio::AudioBuffer;
use crate::error::EditorError;
use hound::{WavSpec, WavWriter};
use rodio::{Decoder, Source};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, info};

/// Decode an audio file into a mono buffer.
///
/// Uses rodio::Decoder, which yields interleaved samples for multichannel
/// audio; channels are averaged into one. Any failure maps to
/// `EditorError::DecodeFailed` so the caller can keep its current state.
pub fn decode<P: AsRef<Path>>(path: P) -> Result<AudioBuffer, EditorError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| EditorError::DecodeFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let source = Decoder::new(BufReader::new(file)).map_err(|e| EditorError::DecodeFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let sample_rate = source.sample_rate();
    let n_channels = source.channels() as usize;
    debug!(sample_rate, n_channels, "decoding {:?}", path);

    if n_channels == 0 {
        return Err(EditorError::DecodeFailed {
            path: path.to_path_buf(),
            reason: "decoder reported 0 channels".into(),
        });
    }

    let interleaved: Vec<f32> = source.collect();
    if interleaved.len() % n_channels != 0 {
        return Err(EditorError::DecodeFailed {
            path: path.to_path_buf(),
            reason: format!(
                "sample count {} is not divisible by channel count {}",
                interleaved.len(),
                n_channels
            ),
        });
    }

    let samples = mixdown(&interleaved, n_channels);
    info!(
        frames = samples.len(),
        seconds = samples.len() as f64 / sample_rate as f64,
        "loaded {:?}",
        path
    );
    Ok(AudioBuffer::new(sample_rate, samples))
}

/// Average interleaved channels into a mono signal.
fn mixdown(interleaved: &[f32], n_channels: usize) -> Vec<f32> {
    if n_channels == 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(n_channels)
        .map(|frame| frame.iter().sum::<f32>() / n_channels as f32)
        .collect()
}

/// Save a mono buffer as 16-bit PCM WAV.
pub fn save_wav<P: AsRef<Path>>(buffer: &AudioBuffer, path: P) -> anyhow::Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for &sample in buffer.samples() {
        // Clamp to [-1.0, 1.0] before scaling to i16
        let clamped = sample.clamp(-1.0, 1.0);
        writer.write_sample((clamped * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}
