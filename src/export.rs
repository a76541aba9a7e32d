//! Audio export — offline bounce of the machine state to a container.
//!
//! The bounce replays the flat recording and the active loop layers
//! through the same one-shot render path playback uses, into one mono
//! buffer. Container choice mirrors the browser's capability probing: the
//! first format in the caller's preference list with a compiled-in encoder
//! wins, and an empty intersection aborts with no partial file.

use crate::dsp::engine::ToneEngine;
use crate::error::ExportError;
use crate::looper::Layer;
use crate::recorder::NoteEvent;

/// Containers a caller may ask for. Only WAV has an encoder in this build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Ogg,
    Mp4,
}

impl AudioFormat {
    pub fn file_extension(self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Mp4 => "m4a",
        }
    }

    fn has_encoder(self) -> bool {
        matches!(self, AudioFormat::Wav)
    }
}

/// A finished export: the container that was chosen and its bytes.
#[derive(Debug)]
pub struct ExportedAudio {
    pub format: AudioFormat,
    pub bytes: Vec<u8>,
}

/// Tail appended after the last note so its decay is not cut off.
const TAIL_S: f64 = 0.5;
/// Bounce block size, matching the realtime render granularity.
const BLOCK: usize = 128;

/// Render the recording plus `cycles` repeats of every active layer into
/// one mono buffer. Returns an empty buffer when there is nothing to play.
pub fn bounce_mix(
    recorded: &[NoteEvent],
    layers: &[Layer],
    cycles: u32,
    cycle_ms: u64,
    sample_rate: f64,
) -> Vec<f32> {
    // Flatten everything into (start_ms, frequency) triggers.
    let mut triggers: Vec<(u64, f64)> = recorded
        .iter()
        .map(|n| (n.offset_ms, n.key.frequency()))
        .collect();
    for layer in layers.iter().filter(|l| l.active) {
        for cycle in 0..cycles as u64 {
            for note in &layer.notes {
                triggers.push((cycle * cycle_ms + note.offset_ms, note.key.frequency()));
            }
        }
    }
    if triggers.is_empty() {
        return Vec::new();
    }
    triggers.sort_by_key(|&(at, _)| at);

    let last_ms = triggers.last().map(|&(at, _)| at).unwrap_or(0);
    let total_samples = ((last_ms as f64 / 1000.0 + TAIL_S) * sample_rate) as usize;

    let mut engine = ToneEngine::new(sample_rate);
    let mut out = vec![0.0_f32; total_samples];
    let mut next_trigger = 0;

    let mut block_start = 0;
    while block_start < total_samples {
        let block_end = (block_start + BLOCK).min(total_samples);

        // fire triggers that start inside this block
        while next_trigger < triggers.len() {
            let (at_ms, frequency) = triggers[next_trigger];
            let at_sample = (at_ms as f64 / 1000.0 * sample_rate) as usize;
            if at_sample >= block_end {
                break;
            }
            engine.trigger_one_shot(frequency);
            next_trigger += 1;
        }

        engine.process(&mut out[block_start..block_end]);
        block_start = block_end;
    }

    out
}

/// Pick the first encodable format and produce the file bytes.
pub fn export_audio(
    samples: &[f32],
    sample_rate: u32,
    preference: &[AudioFormat],
) -> Result<ExportedAudio, ExportError> {
    if samples.is_empty() {
        return Err(ExportError::NothingToExport);
    }
    let format = preference
        .iter()
        .copied()
        .find(|f| f.has_encoder())
        .ok_or(ExportError::NoSupportedFormat)?;

    let bytes = match format {
        AudioFormat::Wav => encode_wav(samples, sample_rate),
        // unreachable while only WAV reports an encoder
        _ => return Err(ExportError::NoSupportedFormat),
    };
    Ok(ExportedAudio { format, bytes })
}

/// Encode mono f32 samples as a 16-bit PCM WAV byte buffer.
fn encode_wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let channels: u16 = 1;
    let bits_per_sample: u16 = 16;
    let byte_rate = sample_rate * channels as u32 * (bits_per_sample as u32 / 8);
    let block_align = channels * (bits_per_sample / 8);
    let data_size = (samples.len() * 2) as u32;
    let file_size = 36 + data_size;

    let mut buf = Vec::with_capacity(44 + data_size as usize);

    // RIFF header
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&file_size.to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    // fmt chunk
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&bits_per_sample.to_le_bytes());

    // data chunk
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    for &sample in samples {
        let pcm = (sample as f64 * 32767.0).round().clamp(-32768.0, 32767.0) as i16;
        buf.extend_from_slice(&pcm.to_le_bytes());
    }

    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::Key;

    const SR: f64 = 22_050.0;

    fn one_note() -> Vec<NoteEvent> {
        vec![NoteEvent {
            key: Key::Q,
            offset_ms: 0,
        }]
    }

    #[test]
    fn bounce_of_nothing_is_empty() {
        assert!(bounce_mix(&[], &[], 2, 4000, SR).is_empty());
    }

    #[test]
    fn bounce_renders_audible_audio() {
        let samples = bounce_mix(&one_note(), &[], 0, 4000, SR);
        let peak = samples.iter().fold(0.0_f32, |m, &s| m.max(s.abs()));
        assert!(peak > 0.02, "bounce should be audible, got {peak}");
        // one note at t=0 plus the tail
        assert_eq!(samples.len(), (0.5 * SR) as usize);
    }

    #[test]
    fn inactive_layers_are_skipped() {
        let layer = Layer {
            id: 0,
            notes: one_note(),
            active: false,
        };
        assert!(bounce_mix(&[], &[layer], 2, 4000, SR).is_empty());
    }

    #[test]
    fn layer_cycles_extend_the_bounce() {
        let layer = Layer {
            id: 0,
            notes: vec![NoteEvent {
                key: Key::W,
                offset_ms: 100,
            }],
            active: true,
        };
        let two = bounce_mix(&[], &[layer.clone()], 2, 4000, SR);
        // last trigger at 4100ms + 0.5s tail
        assert_eq!(two.len(), (4.6 * SR) as usize);

        // second-cycle copy actually sounds
        let late = &two[(4.1 * SR) as usize..];
        let peak = late.iter().fold(0.0_f32, |m, &s| m.max(s.abs()));
        assert!(peak > 0.02, "cycle repeat should be audible, got {peak}");
    }

    #[test]
    fn wav_header_is_valid() {
        let samples = bounce_mix(&one_note(), &[], 0, 4000, SR);
        let wav = export_audio(&samples, SR as u32, &[AudioFormat::Wav])
            .unwrap()
            .bytes;

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(&wav[36..40], b"data");

        let sr = u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]);
        assert_eq!(sr, 22_050);
        let ch = u16::from_le_bytes([wav[22], wav[23]]);
        assert_eq!(ch, 1);
        let data_size = u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]);
        assert_eq!(data_size as usize, samples.len() * 2);
        assert_eq!(wav.len(), 44 + samples.len() * 2);
    }

    #[test]
    fn probing_picks_the_first_supported_format() {
        let samples = vec![0.1_f32; 64];
        let export = export_audio(
            &samples,
            44_100,
            &[AudioFormat::Ogg, AudioFormat::Wav, AudioFormat::Mp4],
        )
        .unwrap();
        assert_eq!(export.format, AudioFormat::Wav);
        assert_eq!(export.format.file_extension(), "wav");
    }

    #[test]
    fn no_supported_format_aborts_with_no_output() {
        let samples = vec![0.1_f32; 64];
        let result = export_audio(&samples, 44_100, &[AudioFormat::Ogg, AudioFormat::Mp4]);
        assert!(matches!(result, Err(ExportError::NoSupportedFormat)));
    }

    #[test]
    fn empty_buffer_has_nothing_to_export() {
        let result = export_audio(&[], 44_100, &[AudioFormat::Wav]);
        assert!(matches!(result, Err(ExportError::NothingToExport)));
    }
}
