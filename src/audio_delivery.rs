//! Audio delivery path from the content session into the active media pipe.

use std::sync::{Arc, Mutex};

use log::trace;

use crate::backends::{AudioFormat, MusicDelivery};
use crate::media_pipe::{AudioFrame, MediaPipe};

/// Pipe of the playback session currently in progress, if any.
pub type ActivePipe = Arc<Mutex<Option<MediaPipe>>>;

/// Worker-side sink handed to [`ContentSession::process_events`].
///
/// Tracks a running sample counter so every queued frame carries a
/// presentation timestamp, and pushes back once the pipe holds more than
/// `watermark` buffers.
///
/// [`ContentSession::process_events`]: crate::backends::ContentSession::process_events
pub struct AudioDelivery {
    active_pipe: ActivePipe,
    playing: bool,
    play_position: u64,
    seek_ms: u64,
    watermark: usize,
}

impl AudioDelivery {
    pub fn new(active_pipe: ActivePipe, watermark: usize) -> Self {
        Self {
            active_pipe,
            playing: false,
            play_position: 0,
            seek_ms: 0,
            watermark,
        }
    }

    /// Marks a freshly started track.
    pub fn start(&mut self) {
        self.playing = true;
        self.play_position = 0;
        self.seek_ms = 0;
    }

    pub fn stop(&mut self) {
        self.playing = false;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Remembers the last seek target; applied on the session's flush.
    pub fn set_seek_target(&mut self, position_ms: u32) {
        self.seek_ms = u64::from(position_ms);
    }

    pub fn play_position(&self) -> u64 {
        self.play_position
    }
}

impl MusicDelivery for AudioDelivery {
    fn deliver(&mut self, format: AudioFormat, samples: &[i16], num_frames: usize) -> usize {
        let pipe = self
            .active_pipe
            .lock()
            .expect("active pipe lock poisoned")
            .clone();
        let Some(pipe) = pipe.filter(|_| self.playing) else {
            return num_frames;
        };

        let rate = u64::from(format.sample_rate.max(1));
        if num_frames == 0 {
            self.play_position = self.seek_ms * rate / 1000;
            trace!(
                "AudioDelivery: flush, position reset to {} samples",
                self.play_position
            );
            return 0;
        }

        if pipe.audio_len() > self.watermark {
            return 0;
        }

        let channels = usize::from(format.channels.max(1));
        let wanted = (num_frames * channels).min(samples.len());
        pipe.enqueue_audio(AudioFrame {
            channels: format.channels,
            sample_rate: format.sample_rate,
            pts_us: self.play_position * 1_000_000 / rate,
            samples: samples[..wanted].to_vec(),
        });
        self.play_position += num_frames as u64;
        num_frames
    }
}
