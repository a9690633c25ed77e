//! Sound contract
//!
//! The engine only ever addresses sounds by id: play from the start, pause,
//! resume, rewind. Loading and decoding belong to the implementation.
//! [`MemorySoundBoard`] tracks playback state without producing audio;
//! `platform::web::AudioManager` drives `HtmlAudioElement`s in the browser.

use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::error::{EngineError, Result};

/// Per-sound playback settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoundSettings {
    /// 0.0 - 1.0
    pub volume: f32,
    pub looping: bool,
}

impl Default for SoundSettings {
    fn default() -> Self {
        Self {
            volume: 1.0,
            looping: false,
        }
    }
}

/// Sounds addressed by id. An empty id list means every registered sound.
pub trait SoundBoard {
    fn add(&self, id: &str, url: &str, settings: SoundSettings);
    /// Rewind and play
    fn play(&self, id: &str) -> Result<()>;
    fn pause(&self, ids: &[&str]) -> Result<()>;
    /// Resume sounds that were started and have not finished
    fn resume(&self, ids: &[&str]) -> Result<()>;
    /// Rewind and pause everything
    fn reset(&self);
}

/// Playback state of one sound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Playback {
    /// Never started, or rewound
    #[default]
    Idle,
    Playing,
    Paused,
    Ended,
}

#[derive(Debug, Clone)]
struct MemorySound {
    url: String,
    settings: SoundSettings,
    playback: Playback,
}

/// Silent sound board that only tracks state
#[derive(Debug, Default)]
pub struct MemorySoundBoard {
    sounds: RefCell<BTreeMap<String, MemorySound>>,
}

impl MemorySoundBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn playback(&self, id: &str) -> Option<Playback> {
        self.sounds.borrow().get(id).map(|s| s.playback)
    }

    pub fn settings(&self, id: &str) -> Option<SoundSettings> {
        self.sounds.borrow().get(id).map(|s| s.settings)
    }

    pub fn url(&self, id: &str) -> Option<String> {
        self.sounds.borrow().get(id).map(|s| s.url.clone())
    }

    /// Mark a non-looping sound as having played to the end
    pub fn finish(&self, id: &str) {
        if let Some(sound) = self.sounds.borrow_mut().get_mut(id) {
            if !sound.settings.looping {
                sound.playback = Playback::Ended;
            }
        }
    }

    fn for_each(&self, ids: &[&str], mut f: impl FnMut(&mut MemorySound)) -> Result<()> {
        let mut sounds = self.sounds.borrow_mut();
        if ids.is_empty() {
            sounds.values_mut().for_each(&mut f);
            return Ok(());
        }
        for id in ids {
            let sound = sounds
                .get_mut(*id)
                .ok_or_else(|| EngineError::UnknownSound(id.to_string()))?;
            f(sound);
        }
        Ok(())
    }
}

impl SoundBoard for MemorySoundBoard {
    fn add(&self, id: &str, url: &str, settings: SoundSettings) {
        self.sounds.borrow_mut().insert(
            id.to_string(),
            MemorySound {
                url: url.to_string(),
                settings,
                playback: Playback::Idle,
            },
        );
    }

    fn play(&self, id: &str) -> Result<()> {
        self.for_each(&[id], |sound| sound.playback = Playback::Playing)
    }

    fn pause(&self, ids: &[&str]) -> Result<()> {
        self.for_each(ids, |sound| {
            if sound.playback == Playback::Playing {
                sound.playback = Playback::Paused;
            }
        })
    }

    fn resume(&self, ids: &[&str]) -> Result<()> {
        self.for_each(ids, |sound| {
            if sound.playback == Playback::Paused {
                sound.playback = Playback::Playing;
            }
        })
    }

    fn reset(&self) {
        for sound in self.sounds.borrow_mut().values_mut() {
            sound.playback = Playback::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board() -> MemorySoundBoard {
        let board = MemorySoundBoard::new();
        board.add("shoot", "sounds/shoot.wav", SoundSettings::default());
        board.add(
            "theme",
            "sounds/theme.mp3",
            SoundSettings {
                volume: 0.5,
                looping: true,
            },
        );
        board
    }

    #[test]
    fn test_pause_all_then_resume_only_started() {
        let board = board();
        board.play("theme").unwrap();

        board.pause(&[]).unwrap();
        assert_eq!(board.playback("theme"), Some(Playback::Paused));
        assert_eq!(board.playback("shoot"), Some(Playback::Idle));

        board.resume(&[]).unwrap();
        assert_eq!(board.playback("theme"), Some(Playback::Playing));
        assert_eq!(board.playback("shoot"), Some(Playback::Idle));
    }

    #[test]
    fn test_finished_sound_is_not_resumed() {
        let board = board();
        board.play("shoot").unwrap();
        board.finish("shoot");
        board.resume(&["shoot"]).unwrap();
        assert_eq!(board.playback("shoot"), Some(Playback::Ended));

        // Looping sounds never end.
        board.play("theme").unwrap();
        board.finish("theme");
        assert_eq!(board.playback("theme"), Some(Playback::Playing));
    }

    #[test]
    fn test_unknown_sound_reported() {
        let board = board();
        assert_eq!(
            board.play("explode"),
            Err(EngineError::UnknownSound("explode".into()))
        );
    }

    #[test]
    fn test_reset_rewinds_everything() {
        let board = board();
        board.play("shoot").unwrap();
        board.play("theme").unwrap();
        board.reset();
        assert_eq!(board.playback("shoot"), Some(Playback::Idle));
        assert_eq!(board.playback("theme"), Some(Playback::Idle));
        assert_eq!(board.settings("theme").map(|s| s.volume), Some(0.5));
    }
}
