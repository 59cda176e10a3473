//! In-memory audio track: decode, concatenate, encode.
//!
//! Tracks are interleaved signed 16-bit PCM. Decoding goes through symphonia
//! so both WAV and MP3 responses are accepted; encoding writes WAV with hound
//! and hands MP3 to ffmpeg.

use crate::defaults;
use crate::error::{PlainvoiceError, Result};
use std::io::Cursor;
use std::path::Path;
use std::process::Command;
use std::time::Duration;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Decoded audio.
///
/// A track created with [`AudioTrack::empty`] has no format yet; the first
/// appended track decides it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioTrack {
    samples: Vec<i16>,
    sample_rate: u32,
    channels: u16,
}

impl AudioTrack {
    /// Zero-length track without a format.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a track from interleaved samples.
    pub fn from_samples(samples: Vec<i16>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn has_format(&self) -> bool {
        self.sample_rate > 0 && self.channels > 0
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Appends `other` to the end of this track.
    ///
    /// `other` is converted to this track's channel count and sample rate when
    /// they differ. A format-less track adopts the format of `other`.
    pub fn append(&mut self, other: AudioTrack) {
        if !other.has_format() {
            return;
        }
        if !self.has_format() {
            self.sample_rate = other.sample_rate;
            self.channels = other.channels;
            self.samples.extend(other.samples);
            return;
        }

        let remixed = remix(&other.samples, other.channels, self.channels);
        let converted = if other.sample_rate == self.sample_rate {
            remixed
        } else {
            resample_interleaved(&remixed, self.channels, other.sample_rate, self.sample_rate)
        };
        self.samples.extend(converted);
    }
}

/// Changes the channel count of interleaved samples.
///
/// Downmixing averages all channels; upmixing copies the mono signal.
fn remix(samples: &[i16], from: u16, to: u16) -> Vec<i16> {
    if from == to {
        return samples.to_vec();
    }
    let mono: Vec<i16> = if from == 1 {
        samples.to_vec()
    } else {
        samples
            .chunks_exact(from as usize)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum / from as i32) as i16
            })
            .collect()
    };
    if to == 1 {
        return mono;
    }
    mono.iter()
        .flat_map(|&s| std::iter::repeat_n(s, to as usize))
        .collect()
}

/// Linear interpolation resampling, applied per channel.
fn resample_interleaved(samples: &[i16], channels: u16, from_rate: u32, to_rate: u32) -> Vec<i16> {
    let channels = channels as usize;
    let frames = samples.len() / channels;
    if frames == 0 {
        return Vec::new();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_frames = (frames as f64 / ratio).ceil() as usize;
    let mut out = Vec::with_capacity(output_frames * channels);

    for i in 0..output_frames {
        let source_pos = i as f64 * ratio;
        let source_idx = (source_pos.floor() as usize).min(frames - 1);
        let fraction = source_pos - source_idx as f64;

        for ch in 0..channels {
            let left = samples[source_idx * channels + ch];
            if source_idx + 1 >= frames {
                out.push(left);
            } else {
                let right = samples[(source_idx + 1) * channels + ch] as f64;
                let left = left as f64;
                out.push((left + (right - left) * fraction) as i16);
            }
        }
    }
    out
}

/// Decodes an encoded audio buffer into a track.
///
/// `extension` is a format hint (for example `"mp3"`); the container is
/// probed either way.
///
/// # Errors
/// Returns `AudioDecode` if the data cannot be probed or decoded.
pub fn decode(bytes: Vec<u8>, extension: Option<&str>) -> Result<AudioTrack> {
    let decode_err = |message: String| PlainvoiceError::AudioDecode { message };

    let stream = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| decode_err(format!("unrecognized audio data: {e}")))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| decode_err("no audio track found".to_string()))?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| decode_err(format!("unsupported codec: {e}")))?;

    let mut samples: Vec<i16> = Vec::new();
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(decode_err(format!("failed to read packet: {e}"))),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                channels = spec.channels.count() as u16;
                let mut buffer = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buffer.samples());
            }
            // A corrupt frame is skipped; the rest of the stream is still usable.
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::debug!("skipping undecodable frame: {}", e);
            }
            Err(e) => return Err(decode_err(format!("decode failed: {e}"))),
        }
    }

    if sample_rate == 0 || channels == 0 {
        return Err(decode_err("stream has no sample format".to_string()));
    }
    Ok(AudioTrack::from_samples(samples, sample_rate, channels))
}

/// Output container, chosen from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Mp3,
}

impl AudioFormat {
    /// # Errors
    /// Returns `ConfigInvalidValue` for anything other than `.wav` or `.mp3`.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("wav") => Ok(AudioFormat::Wav),
            Some("mp3") => Ok(AudioFormat::Mp3),
            _ => Err(PlainvoiceError::invalid_value(
                "output.audio",
                format!("{} must end in .wav or .mp3", path.display()),
            )),
        }
    }
}

/// Writes the track to `path` in the format implied by its extension.
///
/// A format-less track is written as an empty mono WAV at the fallback rate.
///
/// # Errors
/// Returns `AudioEncode` if writing or the external encoder fails.
pub fn encode(track: &AudioTrack, path: &Path) -> Result<()> {
    match AudioFormat::from_path(path)? {
        AudioFormat::Wav => write_wav(track, path),
        AudioFormat::Mp3 => {
            let temp = tempfile::Builder::new()
                .prefix("plainvoice-")
                .suffix(".wav")
                .tempfile()?;
            write_wav(track, temp.path())?;
            transcode_mp3(temp.path(), path)
        }
    }
}

/// Encodes the track as 16-bit WAV into memory.
pub fn to_wav_bytes(track: &AudioTrack) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, wav_spec(track)).map_err(encode_err)?;
    for &sample in track.samples() {
        writer.write_sample(sample).map_err(encode_err)?;
    }
    writer.finalize().map_err(encode_err)?;
    Ok(cursor.into_inner())
}

fn write_wav(track: &AudioTrack, path: &Path) -> Result<()> {
    let mut writer = hound::WavWriter::create(path, wav_spec(track)).map_err(encode_err)?;
    for &sample in track.samples() {
        writer.write_sample(sample).map_err(encode_err)?;
    }
    writer.finalize().map_err(encode_err)?;
    Ok(())
}

fn wav_spec(track: &AudioTrack) -> hound::WavSpec {
    let (sample_rate, channels) = if track.has_format() {
        (track.sample_rate, track.channels)
    } else {
        (defaults::FALLBACK_SAMPLE_RATE, 1)
    };
    hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

fn encode_err(e: hound::Error) -> PlainvoiceError {
    PlainvoiceError::AudioEncode {
        message: e.to_string(),
    }
}

fn transcode_mp3(input: &Path, output: &Path) -> Result<()> {
    let ffmpeg =
        std::env::var(defaults::FFMPEG_ENV).unwrap_or_else(|_| defaults::FFMPEG.to_string());
    tracing::debug!(encoder = %ffmpeg, output = %output.display(), "encoding mp3");

    let result = Command::new(&ffmpeg)
        .args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
        .arg(input)
        .args(["-c:a", defaults::SPEECH_CODEC, "-b:a", defaults::SPEECH_BITRATE])
        .arg(output)
        .output()
        .map_err(|e| PlainvoiceError::AudioEncode {
            message: format!("failed to run {ffmpeg}: {e}"),
        })?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        return Err(PlainvoiceError::AudioEncode {
            message: format!("{ffmpeg} exited with {}: {}", result.status, stderr.trim()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn wav_bytes(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        to_wav_bytes(&AudioTrack::from_samples(samples.to_vec(), sample_rate, channels)).unwrap()
    }

    #[test]
    fn decode_wav_round_trip_is_exact() {
        let input = vec![100i16, -200, 300, -400, 500];
        let track = decode(wav_bytes(16000, 1, &input), Some("wav")).unwrap();
        assert_eq!(track.samples(), input.as_slice());
        assert_eq!(track.sample_rate(), 16000);
        assert_eq!(track.channels(), 1);
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode(b"definitely not audio".to_vec(), Some("mp3")).unwrap_err();
        assert!(matches!(err, PlainvoiceError::AudioDecode { .. }));
    }

    #[test]
    fn empty_track_adopts_first_format() {
        let mut track = AudioTrack::empty();
        assert!(track.is_empty());
        assert_eq!(track.duration(), Duration::ZERO);

        track.append(AudioTrack::from_samples(vec![1, 2, 3], 8000, 1));
        assert_eq!(track.sample_rate(), 8000);
        assert_eq!(track.samples(), &[1, 2, 3]);
    }

    #[test]
    fn append_concatenates_in_order() {
        let mut track = AudioTrack::from_samples(vec![1, 2], 8000, 1);
        track.append(AudioTrack::from_samples(vec![3, 4], 8000, 1));
        track.append(AudioTrack::empty());
        assert_eq!(track.samples(), &[1, 2, 3, 4]);
    }

    #[test]
    fn append_downmixes_stereo() {
        let mut track = AudioTrack::from_samples(vec![0], 8000, 1);
        track.append(AudioTrack::from_samples(vec![100, 200, 300, 500], 8000, 2));
        assert_eq!(track.samples(), &[0, 150, 400]);
    }

    #[test]
    fn append_upmixes_mono() {
        let mut track = AudioTrack::from_samples(vec![0, 0], 8000, 2);
        track.append(AudioTrack::from_samples(vec![7, 9], 8000, 1));
        assert_eq!(track.samples(), &[0, 0, 7, 7, 9, 9]);
    }

    #[test]
    fn append_resamples_to_first_rate() {
        let mut track = AudioTrack::from_samples(Vec::new(), 16000, 1);
        track.append(AudioTrack::from_samples(vec![1000; 48000], 48000, 1));
        assert!(track.frames() >= 15900 && track.frames() <= 16100);
        assert!(track.samples().iter().all(|&s| s == 1000));
    }

    #[test]
    fn duration_counts_frames() {
        let track = AudioTrack::from_samples(vec![0; 16000], 8000, 2);
        assert_eq!(track.frames(), 8000);
        assert_eq!(track.duration(), Duration::from_secs(1));
    }

    #[test]
    fn format_from_path() {
        assert_eq!(
            AudioFormat::from_path(&PathBuf::from("a/b.WAV")).unwrap(),
            AudioFormat::Wav
        );
        assert_eq!(
            AudioFormat::from_path(&PathBuf::from("out.mp3")).unwrap(),
            AudioFormat::Mp3
        );
        assert!(AudioFormat::from_path(&PathBuf::from("out.ogg")).is_err());
        assert!(AudioFormat::from_path(&PathBuf::from("out")).is_err());
    }

    #[test]
    fn encode_wav_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let track = AudioTrack::from_samples(vec![5, 6, 7, 8], 22050, 2);
        encode(&track, &path).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 22050);
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.len(), 4);
    }

    #[test]
    fn encode_empty_track_writes_valid_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        encode(&AudioTrack::empty(), &path).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.len(), 0);
        assert_eq!(reader.spec().sample_rate, defaults::FALLBACK_SAMPLE_RATE);
    }
}
