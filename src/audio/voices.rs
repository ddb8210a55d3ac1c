//! Minimal drum synthesis
//!
//! Each hit is a short enveloped voice:
//! - kick: sine sweeping 160 Hz down to 55 Hz
//! - snare: noise plus a 250 Hz tone
//! - hihat: bright noise, louder on accented hits

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::TAU;

use crate::rhythm::Voice;

/// Voices sounding at once; further hits steal the oldest
const MAX_VOICES: usize = 32;

/// Level every envelope decays to at its end
const ENVELOPE_FLOOR: f32 = 0.01;

struct Hit {
    voice: Voice,
    velocity: f32,
    /// Samples to wait before sounding
    delay: usize,
    /// Samples rendered since the hit began
    pos: usize,
    length: usize,
    phase: f32,
    /// Previous noise sample, for the hihat's crude high-pass
    last_noise: f32,
}

/// Polyphonic drum voice mixer
pub struct DrumSynth {
    sample_rate: f32,
    hits: Vec<Hit>,
    rng: StdRng,
}

impl DrumSynth {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1) as f32,
            hits: Vec::with_capacity(MAX_VOICES),
            rng: StdRng::from_entropy(),
        }
    }

    fn duration_s(voice: Voice) -> f32 {
        match voice {
            Voice::Kick => 0.15,
            Voice::Snare => 0.1,
            Voice::HiHat => 0.05,
        }
    }

    /// Start a hit `delay` samples into the next rendered block
    pub fn trigger(&mut self, voice: Voice, velocity: f32, delay: usize) {
        if self.hits.len() >= MAX_VOICES {
            self.hits.remove(0);
        }
        let length = (Self::duration_s(voice) * self.sample_rate) as usize;
        self.hits.push(Hit {
            voice,
            velocity: velocity.clamp(0.0, 2.0),
            delay,
            pos: 0,
            length: length.max(1),
            phase: 0.0,
            last_noise: 0.0,
        });
    }

    /// Voices still sounding or waiting to sound
    pub fn active_voices(&self) -> usize {
        self.hits.len()
    }

    /// Mix all hits into an interleaved buffer, overwriting it
    pub fn render(&mut self, data: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        data.iter_mut().for_each(|s| *s = 0.0);

        let sample_rate = self.sample_rate;
        for hit in &mut self.hits {
            for frame in data.chunks_mut(channels) {
                if hit.delay > 0 {
                    hit.delay -= 1;
                    continue;
                }
                if hit.pos >= hit.length {
                    break;
                }
                let value = next_sample(hit, sample_rate, &mut self.rng);
                for sample in frame.iter_mut() {
                    *sample += value;
                }
            }
        }

        self.hits.retain(|hit| hit.pos < hit.length);

        for sample in data.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
    }
}

/// Exponential decay from `start` to the floor over `length` samples
fn envelope(start: f32, pos: usize, length: usize) -> f32 {
    if start <= ENVELOPE_FLOOR {
        return start;
    }
    let t = pos as f32 / length as f32;
    start * (ENVELOPE_FLOOR / start).powf(t)
}

fn next_sample(hit: &mut Hit, sample_rate: f32, rng: &mut StdRng) -> f32 {
    let t = hit.pos as f32 / sample_rate;
    let value = match hit.voice {
        Voice::Kick => {
            // Pitch drop over the first 50ms
            let sweep = (t / 0.05).min(1.0);
            let freq = 160.0 * (55.0f32 / 160.0).powf(sweep);
            hit.phase = (hit.phase + freq / sample_rate) % 1.0;
            (hit.phase * TAU).sin() * envelope(hit.velocity, hit.pos, hit.length)
        }
        Voice::Snare => {
            let noise: f32 = rng.gen_range(-1.0..1.0);
            hit.phase = (hit.phase + 250.0 / sample_rate) % 1.0;
            let tone = (hit.phase * TAU).sin();
            let gain = envelope(hit.velocity * 0.5, hit.pos, hit.length);
            (noise * 0.7 + tone * 0.3) * gain
        }
        Voice::HiHat => {
            let noise: f32 = rng.gen_range(-1.0..1.0);
            let bright = noise - hit.last_noise;
            hit.last_noise = noise;
            let level = if hit.velocity > 1.0 { 0.4 } else { 0.1 };
            bright * 0.5 * envelope(level, hit.pos, hit.length)
        }
    };
    hit.pos += 1;
    value
}
