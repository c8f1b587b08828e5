//! Two-stem mix: an instrumental track and a vocal track.
//!
//! Both stems start together at transport zero. The vocals toggle decides
//! which one is audible; the other keeps playing muted so switching never
//! loses sync.

use super::backend::StemHandle;
use serde::{Deserialize, Serialize};

/// Which part of the song a stem carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StemRole {
    Instrumental,
    Vocals,
}

impl StemRole {
    /// Stable identifier passed to the backend when loading.
    pub fn id(self) -> &'static str {
        match self {
            StemRole::Instrumental => "instrumental",
            StemRole::Vocals => "vocals",
        }
    }
}

/// A loaded stem.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stem {
    pub role: StemRole,
    pub handle: StemHandle,
    pub looping: bool,
}

/// The set of loaded stems plus mix settings.
#[derive(Debug, Clone)]
pub struct StemMix {
    stems: Vec<Stem>,
    vocals_enabled: bool,
    level: f32,
}

impl StemMix {
    /// Creates an empty mix with vocals muted at unity level.
    pub fn new() -> Self {
        Self {
            stems: Vec::with_capacity(2),
            vocals_enabled: false,
            level: 1.0,
        }
    }

    /// Adds a stem, replacing any existing stem with the same role.
    ///
    /// # Returns
    ///
    /// The replaced stem, if any.
    pub fn insert(&mut self, stem: Stem) -> Option<Stem> {
        match self.stems.iter_mut().find(|s| s.role == stem.role) {
            Some(existing) => Some(std::mem::replace(existing, stem)),
            None => {
                self.stems.push(stem);
                None
            }
        }
    }

    /// Returns the stem for a role.
    pub fn get(&self, role: StemRole) -> Option<&Stem> {
        self.stems.iter().find(|s| s.role == role)
    }

    /// Iterates over loaded stems.
    pub fn iter(&self) -> impl Iterator<Item = &Stem> {
        self.stems.iter()
    }

    /// Returns true if no stems are loaded.
    pub fn is_empty(&self) -> bool {
        self.stems.is_empty()
    }

    /// Whether the vocal stem is the audible one.
    pub fn vocals_enabled(&self) -> bool {
        self.vocals_enabled
    }

    /// Selects the audible stem.
    pub fn set_vocals_enabled(&mut self, enabled: bool) {
        self.vocals_enabled = enabled;
    }

    /// Level applied to the audible stem.
    pub fn level(&self) -> f32 {
        self.level
    }

    /// Sets the level of the audible stem, clamped to [0, 1].
    pub fn set_level(&mut self, level: f32) {
        self.level = if level.is_finite() {
            level.clamp(0.0, 1.0)
        } else {
            1.0
        };
    }

    /// Effective volume for a role under the current settings.
    pub fn volume_for(&self, role: StemRole) -> f32 {
        let audible = match role {
            StemRole::Vocals => self.vocals_enabled,
            StemRole::Instrumental => !self.vocals_enabled,
        };
        if audible {
            self.level
        } else {
            0.0
        }
    }
}

impl Default for StemMix {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stem(role: StemRole, id: u64) -> Stem {
        Stem {
            role,
            handle: StemHandle(id),
            looping: false,
        }
    }

    #[test]
    fn test_insert_replaces_same_role() {
        let mut mix = StemMix::new();
        assert!(mix.insert(stem(StemRole::Instrumental, 1)).is_none());
        assert!(mix.insert(stem(StemRole::Vocals, 2)).is_none());
        let replaced = mix.insert(stem(StemRole::Instrumental, 3)).unwrap();
        assert_eq!(replaced.handle, StemHandle(1));
        assert_eq!(mix.iter().count(), 2);
        assert_eq!(mix.get(StemRole::Instrumental).unwrap().handle, StemHandle(3));
    }

    #[test]
    fn test_vocals_toggle_is_exclusive() {
        let mut mix = StemMix::new();
        mix.set_level(0.8);
        assert_eq!(mix.volume_for(StemRole::Instrumental), 0.8);
        assert_eq!(mix.volume_for(StemRole::Vocals), 0.0);

        mix.set_vocals_enabled(true);
        assert_eq!(mix.volume_for(StemRole::Instrumental), 0.0);
        assert_eq!(mix.volume_for(StemRole::Vocals), 0.8);
    }

    #[test]
    fn test_level_clamped() {
        let mut mix = StemMix::new();
        mix.set_level(3.0);
        assert_eq!(mix.level(), 1.0);
        mix.set_level(-1.0);
        assert_eq!(mix.level(), 0.0);
        mix.set_level(f32::NAN);
        assert_eq!(mix.level(), 1.0);
    }
}
