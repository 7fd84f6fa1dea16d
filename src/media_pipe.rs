//! Media pipe shared between a playback caller and the audio sink.
//!
//! The pipe carries two queues: decoded audio frames flowing towards the
//! sink, and playback-control events flowing back towards the playback
//! session. Both are guarded by one mutex and signalled through one condvar.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

/// Decoded PCM chunk queued for the audio sink.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub channels: u16,
    pub sample_rate: u32,
    /// Presentation timestamp in microseconds.
    pub pts_us: u64,
    pub samples: Vec<i16>,
}

impl AudioFrame {
    pub fn frame_count(&self) -> usize {
        self.samples.len() / usize::from(self.channels.max(1))
    }
}

/// Events delivered to an active playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// The source ran out of audio.
    EndOfFile,
    PrevTrack,
    NextTrack,
    Stop,
    PlayqueueJump,
    /// Seek to a position in microseconds.
    Seek { position_us: u64 },
    PlayPause,
    Play,
    Pause,
    /// Another pipe took over the output.
    NoLongerPrimary,
    /// This pipe owns the output again.
    IsPrimary,
    /// Paused on behalf of the source (e.g. the account is used elsewhere).
    InternalPause,
}

impl PlaybackEvent {
    /// Events that end a playback session immediately.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::PrevTrack | Self::NextTrack | Self::Stop | Self::PlayqueueJump
        )
    }
}

/// Control command pushed to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeControl {
    Pause,
    Play,
}

/// Play status reported to observers of the pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayStatus {
    #[default]
    Stopped,
    Playing,
    Paused,
}

#[derive(Default)]
struct PipeState {
    audio: VecDeque<AudioFrame>,
    events: VecDeque<PlaybackEvent>,
    controls: Vec<PipeControl>,
    status: PlayStatus,
    can_seek: bool,
    can_pause: bool,
    primary: bool,
}

struct PipeInner {
    name: String,
    state: Mutex<PipeState>,
    changed: Condvar,
}

/// Cloneable handle to one media pipe.
#[derive(Clone)]
pub struct MediaPipe {
    inner: Arc<PipeInner>,
}

impl std::fmt::Debug for MediaPipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaPipe")
            .field("name", &self.inner.name)
            .finish()
    }
}

impl MediaPipe {
    pub fn new(name: &str) -> Self {
        Self {
            inner: Arc::new(PipeInner {
                name: name.to_string(),
                state: Mutex::new(PipeState::default()),
                changed: Condvar::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PipeState> {
        self.inner.state.lock().expect("media pipe lock poisoned")
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn enqueue_audio(&self, frame: AudioFrame) {
        self.lock().audio.push_back(frame);
        self.inner.changed.notify_all();
    }

    pub fn audio_len(&self) -> usize {
        self.lock().audio.len()
    }

    /// Takes the oldest audio frame (sink side).
    pub fn pop_audio(&self) -> Option<AudioFrame> {
        let frame = self.lock().audio.pop_front();
        if frame.is_some() {
            self.inner.changed.notify_all();
        }
        frame
    }

    /// Drops all queued audio.
    pub fn flush(&self) {
        self.lock().audio.clear();
        self.inner.changed.notify_all();
    }

    pub fn post_event(&self, event: PlaybackEvent) {
        self.lock().events.push_back(event);
        self.inner.changed.notify_all();
    }

    /// Blocks until a playback event is available.
    pub fn dequeue_event(&self) -> PlaybackEvent {
        let mut state = self.lock();
        loop {
            if let Some(event) = state.events.pop_front() {
                return event;
            }
            state = self
                .inner
                .changed
                .wait(state)
                .expect("media pipe lock poisoned");
        }
    }

    /// Blocks until the audio queue has drained.
    ///
    /// Returns early with an event if one arrives before the drain completes.
    pub fn wait_for_empty_queues(&self) -> Option<PlaybackEvent> {
        let mut state = self.lock();
        loop {
            if let Some(event) = state.events.pop_front() {
                return Some(event);
            }
            if state.audio.is_empty() {
                return None;
            }
            state = self
                .inner
                .changed
                .wait(state)
                .expect("media pipe lock poisoned");
        }
    }

    pub fn send_control(&self, control: PipeControl) {
        self.lock().controls.push(control);
    }

    /// Control commands sent so far, oldest first.
    pub fn controls(&self) -> Vec<PipeControl> {
        self.lock().controls.clone()
    }

    /// Reports whether playback is held (paused) or running.
    pub fn set_play_status(&self, hold: bool) {
        self.lock().status = if hold {
            PlayStatus::Paused
        } else {
            PlayStatus::Playing
        };
    }

    pub fn set_stopped(&self) {
        self.lock().status = PlayStatus::Stopped;
    }

    pub fn play_status(&self) -> PlayStatus {
        self.lock().status
    }

    pub fn set_caps(&self, can_seek: bool, can_pause: bool) {
        let mut state = self.lock();
        state.can_seek = can_seek;
        state.can_pause = can_pause;
    }

    pub fn caps(&self) -> (bool, bool) {
        let state = self.lock();
        (state.can_seek, state.can_pause)
    }

    pub fn become_primary(&self) {
        self.lock().primary = true;
    }

    pub fn is_primary(&self) -> bool {
        self.lock().primary
    }
}
