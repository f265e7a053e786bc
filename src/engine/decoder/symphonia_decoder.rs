use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;
use crate::engine::decoder::AudioDecoder;

pub struct SymphoniaDecoder {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    duration: Option<f64>,
    /// Reused between packets; replaced only when a larger packet shows up.
    sample_buf: Option<SampleBuffer<f32>>,
}

impl SymphoniaDecoder {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let path_ref = path.as_ref();
        let file = File::open(path_ref)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path_ref.extension().and_then(|s| s.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or("No supported audio tracks found")?;

        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
        let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2);
        let duration = track
            .codec_params
            .n_frames
            .map(|frames| frames as f64 / sample_rate as f64);

        let decoder = symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

        log::info!(
            "Opened {}: {} Hz, {} ch{}",
            path_ref.display(),
            sample_rate,
            channels,
            duration.map(|d| format!(", {:.1} s", d)).unwrap_or_default()
        );

        Ok(Self {
            reader,
            decoder,
            track_id,
            sample_rate,
            channels,
            duration,
            sample_buf: None,
        })
    }
}

impl AudioDecoder for SymphoniaDecoder {
    fn next_block(&mut self) -> Option<&[f32]> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(Error::IoError(ref err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => return None,
                Err(err) => {
                    log::error!("Decoder error: {}", err);
                    return None;
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(audio_buf) => {
                    let spec = *audio_buf.spec();
                    let needed = audio_buf.capacity() as u64;
                    let reusable = self
                        .sample_buf
                        .as_ref()
                        .is_some_and(|buf| buf.capacity() as u64 >= needed * spec.channels.count() as u64);
                    if !reusable {
                        self.sample_buf = Some(SampleBuffer::<f32>::new(needed, spec));
                    }
                    let buf = self.sample_buf.as_mut()?;
                    buf.copy_interleaved_ref(audio_buf);
                    self.channels = spec.channels.count();
                    return Some(buf.samples());
                }
                Err(Error::DecodeError(err)) => {
                    log::warn!("Skipping undecodable packet: {}", err);
                    continue;
                }
                Err(err) => {
                    log::error!("Unexpected decoder error: {}", err);
                    return None;
                }
            }
        }
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn seek(&mut self, time_secs: f64) -> bool {
        let result = self.reader.seek(
            SeekMode::Accurate,
            SeekTo::Time {
                time: Time::from(time_secs),
                track_id: Some(self.track_id),
            },
        );
        match result {
            Ok(_) => {
                self.decoder.reset();
                true
            }
            Err(err) => {
                log::warn!("Seek to {:.2} s failed: {}", time_secs, err);
                false
            }
        }
    }

    fn duration(&self) -> Option<f64> {
        self.duration
    }
}
