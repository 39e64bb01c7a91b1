use crate::game::beatmap::Beatmap;
use crate::game::mods::Mods;
use crate::game::replay::{Keys, Replay};
use crate::game::visibility::{self, ObjectVisual};
use log::{debug, info};

/// Lifecycle of a playback session. `Finished` is terminal: replaying takes
/// a fresh session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
    Finished,
}

/// Read-only view of one tick, everything the shell needs to draw.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub time: f64,
    pub cursor: (f32, f32),
    pub keys: Keys,
    pub frame_index: usize,
    pub visuals: Vec<ObjectVisual>,
}

/// The only mutable runtime state in the core. The replay and beatmap are
/// immutable once loaded; the session owns the frame cursor, the simulated
/// clock and the live mod set. `tick` must be called at most once per
/// logical frame.
pub struct PlaybackSession {
    replay: Replay,
    beatmap: Beatmap,
    state: PlaybackState,
    frame_index: usize,
    time_ms: f64,
    active_mods: Mods,
}

impl PlaybackSession {
    /// Starts `Stopped`, with the recording's original mods active.
    pub fn new(replay: Replay, beatmap: Beatmap) -> Self {
        let active_mods = replay.mods;
        Self {
            replay,
            beatmap,
            state: PlaybackState::Stopped,
            frame_index: 0,
            time_ms: 0.0,
            active_mods,
        }
    }

    pub const fn state(&self) -> PlaybackState {
        self.state
    }

    pub const fn active_mods(&self) -> Mods {
        self.active_mods
    }

    pub const fn replay(&self) -> &Replay {
        &self.replay
    }

    pub const fn beatmap(&self) -> &Beatmap {
        &self.beatmap
    }

    pub fn total_frames(&self) -> usize {
        self.replay.frames.len()
    }

    /// Takes effect on the next tick; frames already rendered are never
    /// re-transformed.
    pub fn set_active_mods(&mut self, mods: Mods) {
        if mods != self.active_mods {
            info!("Active mods: {}", mods.label());
            self.active_mods = mods;
        }
    }

    pub fn start(&mut self) {
        if self.state == PlaybackState::Stopped {
            self.state = PlaybackState::Playing;
        }
    }

    pub fn toggle_pause(&mut self) {
        self.state = match self.state {
            PlaybackState::Playing => {
                info!("Replay paused");
                PlaybackState::Paused
            }
            PlaybackState::Paused => {
                info!("Replay resumed");
                PlaybackState::Playing
            }
            other => other,
        };
    }

    /// Rewinds to the pre-first-tick state; a later `start` replays from
    /// the beginning.
    pub fn stop(&mut self) {
        if self.state != PlaybackState::Finished {
            info!("Replay stopped");
            self.state = PlaybackState::Stopped;
            self.frame_index = 0;
            self.time_ms = 0.0;
        }
    }

    /// Advances exactly one frame. Returns `None` unless `Playing`. Never
    /// skips or reorders frames to catch up with wall time; pacing is the
    /// caller's concern.
    pub fn tick(&mut self) -> Option<Snapshot> {
        if self.state != PlaybackState::Playing {
            return None;
        }
        let Some(&frame) = self.replay.frames.get(self.frame_index) else {
            // Zero-frame recording: nothing to play.
            self.state = PlaybackState::Finished;
            return None;
        };

        // A negative delta contributes zero progress rather than rewinding
        // the clock. Cursor and hit objects share the one transform call
        // site (Mods::apply; the evaluator funnels objects through it too).
        let delta = frame.time_delta.max(0) as f64;
        let (x, y, time) = self.active_mods.apply(frame.x, frame.y, self.time_ms + delta);
        self.time_ms = time.max(0.0);

        let visuals: Vec<ObjectVisual> = self
            .beatmap
            .hit_objects
            .iter()
            .filter_map(|obj| visibility::evaluate(obj, self.time_ms, self.active_mods))
            .collect();

        let snapshot = Snapshot {
            time: self.time_ms,
            cursor: (x, y),
            keys: frame.keys,
            frame_index: self.frame_index,
            visuals,
        };

        self.frame_index += 1;
        if self.frame_index % 100 == 0 {
            debug!(
                "Frame {}/{}, time {:.2}ms, {} visible objects",
                self.frame_index,
                self.replay.frames.len(),
                self.time_ms,
                snapshot.visuals.len()
            );
        }
        if self.frame_index >= self.replay.frames.len() {
            info!("Replay finished after {} frames", self.frame_index);
            self.state = PlaybackState::Finished;
        }
        Some(snapshot)
    }
}
