//! Idle-gaze micro-saccades.
//!
//! Eyes that never move read as dead. Whenever the main gaze machine is
//! idle, this controller schedules small stochastic eye offsets: it waits
//! a few seconds, shifts away along one of eight directions with a
//! log-distributed amplitude, holds briefly, and shifts back. Any
//! activity on the main gaze machine aborts the excursion immediately.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use tracing::debug;

/// Where the micro-saccade machine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EyesAliveState {
    /// Eyes at rest, waiting for the next excursion.
    Idle,
    /// Interpolating toward the excursion offset.
    ShiftingAway,
    /// Holding the excursion offset.
    Holding,
    /// Interpolating back to rest.
    ShiftingBack,
}

/// Tuning knobs for the micro-saccade model.
#[derive(Debug, Clone)]
pub struct EyesAliveConfig {
    /// Hard cap on saccade amplitude in degrees.
    pub max_offset_deg: f32,
    /// Scales the drawn amplitude (when non-negative).
    pub offset_multiplier: f32,
    /// Divides the wait between excursions; higher means livelier eyes.
    pub rate_multiplier: f32,
    /// Interpolation step applied per tick while shifting.
    pub shift_step: f32,
}

impl Default for EyesAliveConfig {
    fn default() -> Self {
        Self {
            max_offset_deg: 5.0,
            offset_multiplier: 1.0,
            rate_multiplier: 1.0,
            shift_step: 0.1,
        }
    }
}

/// Eye rotation offset from the rest pose, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeOffset {
    pub pitch_deg: f32,
    pub yaw_deg: f32,
}

impl EyeOffset {
    pub const ZERO: Self = Self {
        pitch_deg: 0.0,
        yaw_deg: 0.0,
    };

    fn scale(self, t: f32) -> Self {
        Self {
            pitch_deg: self.pitch_deg * t,
            yaw_deg: self.yaw_deg * t,
        }
    }

    /// Euclidean magnitude of the offset.
    pub fn magnitude(self) -> f32 {
        (self.pitch_deg * self.pitch_deg + self.yaw_deg * self.yaw_deg).sqrt()
    }
}

/// The micro-saccade controller.
pub struct EyesAlive {
    pub config: EyesAliveConfig,
    state: EyesAliveState,
    rng: StdRng,
    timer: f64,
    wait: f64,
    shift_t: f32,
    target: EyeOffset,
    offset: EyeOffset,
}

impl EyesAlive {
    pub fn new(config: EyesAliveConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    pub fn with_seed(config: EyesAliveConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    pub fn with_rng(config: EyesAliveConfig, mut rng: StdRng) -> Self {
        let wait = draw_clamped(&mut rng, 0.8, 0.3, 0.2, 2.0);
        Self {
            config,
            state: EyesAliveState::Idle,
            rng,
            timer: 0.0,
            wait,
            shift_t: 0.0,
            target: EyeOffset::ZERO,
            offset: EyeOffset::ZERO,
        }
    }

    pub fn state(&self) -> EyesAliveState {
        self.state
    }

    /// Current eye offset to apply on top of the base gaze pose.
    pub fn offset(&self) -> EyeOffset {
        self.offset
    }

    /// Advance one tick. `base_gaze_idle` is false whenever the main gaze
    /// machine is shifting or holding a deliberate target, which defers
    /// and aborts excursions.
    pub fn tick(&mut self, dt_s: f64, base_gaze_idle: bool) -> EyeOffset {
        match self.state {
            EyesAliveState::Idle => {
                self.timer += dt_s;
                if self.timer > self.wait {
                    if base_gaze_idle {
                        self.begin_excursion();
                    } else {
                        self.timer = 0.0;
                    }
                }
            }
            EyesAliveState::ShiftingAway => {
                if !base_gaze_idle {
                    self.interrupt();
                    return self.offset;
                }
                self.shift_t += self.config.shift_step;
                if self.shift_t > 1.0 {
                    self.state = EyesAliveState::Holding;
                    self.wait = draw_clamped(&mut self.rng, 0.8, 0.3, 0.2, 2.0);
                    self.timer = 0.0;
                    self.offset = self.target;
                } else {
                    self.offset = self.target.scale(self.shift_t);
                }
            }
            EyesAliveState::Holding => {
                if !base_gaze_idle {
                    self.interrupt();
                    return self.offset;
                }
                self.timer += dt_s;
                if self.timer > self.wait {
                    self.state = EyesAliveState::ShiftingBack;
                    self.shift_t = 0.0;
                }
            }
            EyesAliveState::ShiftingBack => {
                if !base_gaze_idle {
                    self.interrupt();
                    return self.offset;
                }
                self.shift_t += self.config.shift_step;
                if self.shift_t > 1.0 {
                    self.state = EyesAliveState::Idle;
                    self.wait = self.draw_idle_wait();
                    self.timer = 0.0;
                    self.offset = EyeOffset::ZERO;
                } else {
                    self.offset = self.target.scale(1.0 - self.shift_t);
                }
            }
        }
        self.offset
    }

    /// Abort the excursion: the main gaze machine owns the eyes now.
    fn interrupt(&mut self) {
        self.state = EyesAliveState::Idle;
        self.offset = EyeOffset::ZERO;
        self.shift_t = 0.0;
        self.wait = self.draw_idle_wait();
        self.timer = 0.0;
    }

    /// Pick the excursion amplitude and direction and start shifting.
    fn begin_excursion(&mut self) {
        let p: f32 = self.rng.gen_range(1.0f32..15.0);
        let mut amplitude = -6.9 * (p / 15.7).ln();
        if self.config.offset_multiplier >= 0.0 {
            amplitude *= self.config.offset_multiplier;
        }
        if amplitude > self.config.max_offset_deg {
            amplitude = self.config.max_offset_deg;
        }

        // Empirical direction distribution: horizontal saccades dominate,
        // diagonals are rare.
        let u: f32 = self.rng.gen_range(0.0f32..100.0);
        let diag = amplitude / std::f32::consts::SQRT_2;
        let (pitch, yaw) = if u < 15.54 {
            (0.0, amplitude)
        } else if u < 22.0 {
            (diag, diag)
        } else if u < 39.69 {
            (amplitude, 0.0)
        } else if u < 47.13 {
            (diag, -diag)
        } else if u < 63.93 {
            (0.0, -amplitude)
        } else if u < 71.82 {
            (-diag, -diag)
        } else if u < 92.2 {
            (-amplitude, 0.0)
        } else {
            (-diag, diag)
        };

        debug!("eyes-alive excursion: pitch {:.2} yaw {:.2}", pitch, yaw);
        self.target = EyeOffset {
            pitch_deg: pitch,
            yaw_deg: yaw,
        };
        self.shift_t = 0.0;
        self.state = EyesAliveState::ShiftingAway;
    }

    fn draw_idle_wait(&mut self) -> f64 {
        let mut wait = draw_raw(&mut self.rng, 5.0, 0.5);
        if self.config.rate_multiplier > 0.0 {
            wait /= f64::from(self.config.rate_multiplier);
        }
        wait.clamp(2.0, 8.0)
    }
}

fn draw_raw(rng: &mut StdRng, mean: f64, spread: f64) -> f64 {
    match Normal::new(mean, spread) {
        Ok(dist) => dist.sample(rng),
        Err(_) => mean,
    }
}

fn draw_clamped(rng: &mut StdRng, mean: f64, spread: f64, lo: f64, hi: f64) -> f64 {
    draw_raw(rng, mean, spread).clamp(lo, hi)
}

// ── Tests ───────────────────────────────────────────────────
