//! Drum pattern presets and the pattern library
//!
//! Presets are static 16-step tables (1 = hit). They are normalized to
//! booleans when read, so everything past this module sees `Pattern`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Steps in one bar of every pattern (sixteenth notes in 4/4)
pub const STEPS_PER_PATTERN: usize = 16;

/// Identifier of the editable pattern
pub const CUSTOM_ID: &str = "custom";
/// Identifier of the generated pattern
pub const RANDOM_ID: &str = "random";

/// Drum voices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    Kick,
    Snare,
    HiHat,
}

impl Voice {
    pub const ALL: [Voice; 3] = [Voice::Kick, Voice::Snare, Voice::HiHat];

    fn index(self) -> usize {
        match self {
            Voice::Kick => 0,
            Voice::Snare => 1,
            Voice::HiHat => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Voice::Kick => "kick",
            Voice::Snare => "snare",
            Voice::HiHat => "hihat",
        }
    }
}

impl std::fmt::Display for Voice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Voice {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "kick" => Ok(Voice::Kick),
            "snare" => Ok(Voice::Snare),
            "hihat" | "hi-hat" | "hh" => Ok(Voice::HiHat),
            _ => Err(Error::UnknownVoice(s.to_string())),
        }
    }
}

/// One bar of kick/snare/hihat steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pattern {
    steps: [[bool; STEPS_PER_PATTERN]; 3],
}

impl Pattern {
    /// A pattern with every step off
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_active(&self, voice: Voice, step: usize) -> bool {
        self.steps[voice.index()]
            .get(step)
            .copied()
            .unwrap_or(false)
    }

    pub fn set(&mut self, voice: Voice, step: usize, active: bool) -> Result<()> {
        let slot = self.steps[voice.index()]
            .get_mut(step)
            .ok_or(Error::StepOutOfRange {
                index: step,
                steps: STEPS_PER_PATTERN,
            })?;
        *slot = active;
        Ok(())
    }

    pub fn voice_steps(&self, voice: Voice) -> &[bool; STEPS_PER_PATTERN] {
        &self.steps[voice.index()]
    }

    /// Voices that hit on `step`, in kick/snare/hihat order
    pub fn voices_at(&self, step: usize) -> impl Iterator<Item = Voice> + '_ {
        Voice::ALL
            .into_iter()
            .filter(move |&voice| self.is_active(voice, step))
    }

    /// Number of active steps across all voices
    pub fn hit_count(&self) -> usize {
        self.steps.iter().flatten().filter(|&&on| on).count()
    }

    /// Render one voice as a row of `x` and `.`
    pub fn row(&self, voice: Voice) -> String {
        self.voice_steps(voice)
            .iter()
            .map(|&on| if on { 'x' } else { '.' })
            .collect()
    }
}

/// Kind of a pattern in the catalogue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Preset,
    Random,
    Custom,
}

/// A fixed pattern table
#[derive(Debug, Clone)]
pub struct Preset {
    /// Unique identifier
    pub id: &'static str,
    /// Display name
    pub name: &'static str,
    pub description: &'static str,
    pub kick: [u8; STEPS_PER_PATTERN],
    pub snare: [u8; STEPS_PER_PATTERN],
    pub hihat: [u8; STEPS_PER_PATTERN],
}

impl From<&Preset> for Pattern {
    fn from(p: &Preset) -> Self {
        let normalize = |row: &[u8; STEPS_PER_PATTERN]| row.map(|v| v != 0);
        Pattern {
            steps: [normalize(&p.kick), normalize(&p.snare), normalize(&p.hihat)],
        }
    }
}

/// Pattern info for listings (without step data)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub kind: PatternKind,
}

impl From<&Preset> for PatternInfo {
    fn from(p: &Preset) -> Self {
        Self {
            id: p.id.to_string(),
            name: p.name.to_string(),
            description: p.description.to_string(),
            kind: PatternKind::Preset,
        }
    }
}

// =============================================================================
// PRESETS
// =============================================================================

const BASIC: Preset = Preset {
    id: "basic",
    name: "Basic Rock",
    description: "Classic rock beat",
    kick: [1, 0, 0, 0, 0, 0, 1, 0, 1, 0, 0, 0, 0, 0, 1, 0],
    snare: [0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0],
    hihat: [1, 1, 0, 1, 1, 1, 0, 1, 1, 1, 0, 1, 1, 1, 0, 1],
};

const MARCH: Preset = Preset {
    id: "march",
    name: "March",
    description: "Strict marching rhythm",
    kick: [1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0],
    snare: [0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0],
    hihat: [1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0],
};

const ELECTRONIC: Preset = Preset {
    id: "electronic",
    name: "Electronic",
    description: "Driving electronic beat with straight sixteenth hats",
    kick: [1, 0, 0, 1, 0, 0, 1, 0, 1, 0, 0, 1, 0, 0, 1, 0],
    snare: [0, 0, 1, 0, 1, 0, 0, 0, 0, 0, 1, 0, 1, 0, 0, 0],
    hihat: [1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1],
};

const REGGAE: Preset = Preset {
    id: "reggae",
    name: "Reggae",
    description: "Laid-back reggae groove",
    kick: [1, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 1, 0, 0, 0],
    snare: [0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0],
    hihat: [0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1],
};

const FUNK: Preset = Preset {
    id: "funk",
    name: "Funk",
    description: "Syncopated funk groove",
    kick: [1, 0, 0, 1, 0, 1, 0, 0, 1, 0, 0, 1, 0, 1, 0, 0],
    snare: [0, 0, 1, 0, 0, 0, 0, 1, 0, 0, 1, 0, 0, 0, 0, 1],
    hihat: [1, 0, 1, 1, 0, 1, 1, 0, 1, 0, 1, 1, 0, 1, 1, 0],
};

/// Four on floor kick, backbeat snare, off-beat hats
const DISCO: Preset = Preset {
    id: "disco",
    name: "Disco",
    description: "Four on the floor with off-beat hi-hats",
    kick: [1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0],
    snare: [0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0],
    hihat: [0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0],
};

/// Kick on every beat, nothing else
const FOUR_ON_FLOOR: Preset = Preset {
    id: "four_on_floor",
    name: "Four on Floor",
    description: "Kick on every beat",
    kick: [1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0],
    snare: [0; STEPS_PER_PATTERN],
    hihat: [0; STEPS_PER_PATTERN],
};

/// All built-in presets
pub const ALL_PRESETS: &[Preset] = &[BASIC, MARCH, ELECTRONIC, REGGAE, FUNK, DISCO, FOUR_ON_FLOOR];

/// Get a preset by ID
pub fn get_preset(id: &str) -> Option<&'static Preset> {
    ALL_PRESETS.iter().find(|p| p.id == id)
}

// =============================================================================
// LIBRARY
// =============================================================================

/// Per-voice probability of a random hit on steps other than 0 and 8
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomDensity {
    pub kick: f64,
    pub snare: f64,
    pub hihat: f64,
}

impl Default for RandomDensity {
    fn default() -> Self {
        Self {
            kick: 0.15,
            snare: 0.2,
            hihat: 0.4,
        }
    }
}

impl RandomDensity {
    pub fn for_voice(&self, voice: Voice) -> f64 {
        let p = match voice {
            Voice::Kick => self.kick,
            Voice::Snare => self.snare,
            Voice::HiHat => self.hihat,
        };
        if p.is_finite() {
            p.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Presets plus one editable and one generated pattern, with a selection
pub struct PatternLibrary {
    custom: Pattern,
    random: Pattern,
    active: String,
    density: RandomDensity,
    rng: StdRng,
}

impl PatternLibrary {
    pub fn new(density: RandomDensity) -> Self {
        Self::with_rng(density, StdRng::from_entropy())
    }

    /// Library with a deterministic randomizer
    pub fn with_seed(density: RandomDensity, seed: u64) -> Self {
        Self::with_rng(density, StdRng::seed_from_u64(seed))
    }

    fn with_rng(density: RandomDensity, rng: StdRng) -> Self {
        Self {
            custom: Pattern::empty(),
            random: Pattern::empty(),
            active: CUSTOM_ID.to_string(),
            density,
            rng,
        }
    }

    /// Pattern for `id`; unknown ids fall back to the custom pattern
    pub fn pattern(&self, id: &str) -> Pattern {
        if let Some(preset) = get_preset(id) {
            return Pattern::from(preset);
        }
        match id {
            RANDOM_ID => self.random,
            _ => self.custom,
        }
    }

    /// Whether `id` names a pattern in the catalogue
    pub fn contains(&self, id: &str) -> bool {
        id == CUSTOM_ID || id == RANDOM_ID || get_preset(id).is_some()
    }

    /// Make `id` the active pattern. Unknown ids select custom.
    pub fn select(&mut self, id: &str) -> Pattern {
        if self.contains(id) {
            self.active = id.to_string();
        } else {
            log::warn!("Unknown pattern '{}', using custom", id);
            self.active = CUSTOM_ID.to_string();
        }
        self.active_pattern()
    }

    pub fn active_id(&self) -> &str {
        &self.active
    }

    pub fn active_pattern(&self) -> Pattern {
        self.pattern(&self.active)
    }

    /// Edit one step of the custom pattern.
    ///
    /// If another pattern is active it is copied into custom first and custom
    /// becomes the active pattern.
    pub fn set_custom_step(&mut self, voice: Voice, index: usize, active: bool) -> Result<()> {
        if index >= STEPS_PER_PATTERN {
            return Err(Error::StepOutOfRange {
                index,
                steps: STEPS_PER_PATTERN,
            });
        }

        if self.active != CUSTOM_ID {
            log::debug!("Copying '{}' into custom pattern for editing", self.active);
            self.custom = self.active_pattern();
            self.active = CUSTOM_ID.to_string();
        }
        self.custom.set(voice, index, active)
    }

    /// Regenerate the random pattern. Does not change the selection.
    pub fn generate_random(&mut self) -> Pattern {
        let mut pattern = Pattern::empty();
        for voice in Voice::ALL {
            let p = self.density.for_voice(voice);
            for step in 0..STEPS_PER_PATTERN {
                let on = step == 0 || step == STEPS_PER_PATTERN / 2 || self.rng.gen_bool(p);
                pattern.steps[voice.index()][step] = on;
            }
        }
        self.random = pattern;
        pattern
    }

    /// All presets plus the random and custom entries
    pub fn list(&self) -> Vec<PatternInfo> {
        let mut infos: Vec<PatternInfo> = ALL_PRESETS.iter().map(PatternInfo::from).collect();
        infos.push(PatternInfo {
            id: RANDOM_ID.to_string(),
            name: "Random".to_string(),
            description: "Randomly generated 4/4 beat".to_string(),
            kind: PatternKind::Random,
        });
        infos.push(PatternInfo {
            id: CUSTOM_ID.to_string(),
            name: "Custom".to_string(),
            description: "Your own pattern".to_string(),
            kind: PatternKind::Custom,
        });
        infos
    }
}

impl Default for PatternLibrary {
    fn default() -> Self {
        Self::new(RandomDensity::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_count() {
        assert_eq!(ALL_PRESETS.len(), 7);
    }

    #[test]
    fn test_get_preset() {
        let preset = get_preset("march").unwrap();
        assert_eq!(preset.name, "March");
        let pattern = Pattern::from(preset);
        assert_eq!(pattern.row(Voice::Kick), "x...x...x...x...");
        assert!(get_preset("polka").is_none());
    }

    #[test]
    fn test_unknown_id_falls_back_to_custom() {
        let mut library = PatternLibrary::with_seed(RandomDensity::default(), 1);
        library.set_custom_step(Voice::Snare, 3, true).unwrap();
        assert_eq!(library.pattern("nonexistent"), library.pattern(CUSTOM_ID));

        let selected = library.select("nonexistent");
        assert_eq!(library.active_id(), CUSTOM_ID);
        assert!(selected.is_active(Voice::Snare, 3));
    }

    #[test]
    fn test_editing_preset_copies_into_custom() {
        let mut library = PatternLibrary::with_seed(RandomDensity::default(), 1);
        library.select("basic");
        library.set_custom_step(Voice::Kick, 1, true).unwrap();

        assert_eq!(library.active_id(), CUSTOM_ID);
        let custom = library.active_pattern();
        assert!(custom.is_active(Voice::Kick, 0));
        assert!(custom.is_active(Voice::Kick, 1));
        assert_eq!(custom.row(Voice::HiHat), "xx.xxx.xxx.xxx.x");

        // The preset itself is untouched
        assert!(!library.pattern("basic").is_active(Voice::Kick, 1));
    }

    #[test]
    fn test_step_out_of_range() {
        let mut library = PatternLibrary::with_seed(RandomDensity::default(), 1);
        library.select("funk");
        let err = library.set_custom_step(Voice::HiHat, 16, true).unwrap_err();
        assert!(matches!(err, Error::StepOutOfRange { index: 16, .. }));
        // Rejected edits do not switch to custom
        assert_eq!(library.active_id(), "funk");
    }

    #[test]
    fn test_random_always_has_downbeats() {
        let mut library = PatternLibrary::with_seed(RandomDensity::default(), 42);
        for _ in 0..100 {
            let pattern = library.generate_random();
            for voice in Voice::ALL {
                assert!(pattern.is_active(voice, 0));
                assert!(pattern.is_active(voice, 8));
            }
        }
    }

    #[test]
    fn test_random_density_ordering() {
        let mut library = PatternLibrary::with_seed(RandomDensity::default(), 7);
        let mut counts = [0usize; 3];
        for _ in 0..200 {
            let pattern = library.generate_random();
            for (i, voice) in Voice::ALL.into_iter().enumerate() {
                counts[i] += pattern.voice_steps(voice).iter().filter(|&&on| on).count();
            }
        }
        assert!(counts[0] < counts[1]);
        assert!(counts[1] < counts[2]);
    }

    #[test]
    fn test_generate_random_keeps_selection() {
        let mut library = PatternLibrary::with_seed(RandomDensity::default(), 3);
        library.select("reggae");
        let random = library.generate_random();
        assert_eq!(library.active_id(), "reggae");
        assert_eq!(library.pattern(RANDOM_ID), random);
    }

    #[test]
    fn test_zero_density_gives_only_downbeats() {
        let density = RandomDensity {
            kick: 0.0,
            snare: 0.0,
            hihat: 0.0,
        };
        let mut library = PatternLibrary::with_seed(density, 9);
        let pattern = library.generate_random();
        assert_eq!(pattern.hit_count(), 6);
    }

    #[test]
    fn test_list_includes_random_and_custom() {
        let library = PatternLibrary::with_seed(RandomDensity::default(), 1);
        let list = library.list();
        assert_eq!(list.len(), ALL_PRESETS.len() + 2);
        assert_eq!(list.last().unwrap().kind, PatternKind::Custom);
        assert!(list.iter().any(|info| info.id == "disco"));
    }

    #[test]
    fn test_voices_at() {
        let pattern = Pattern::from(get_preset("basic").unwrap());
        let voices: Vec<Voice> = pattern.voices_at(0).collect();
        assert_eq!(voices, vec![Voice::Kick, Voice::HiHat]);
        assert_eq!(pattern.voices_at(16).count(), 0);
    }

    #[test]
    fn test_voice_from_str() {
        assert_eq!("HiHat".parse::<Voice>().unwrap(), Voice::HiHat);
        assert_eq!("kick".parse::<Voice>().unwrap(), Voice::Kick);
        assert!(matches!("cowbell".parse::<Voice>(), Err(Error::UnknownVoice(_))));
    }
}
