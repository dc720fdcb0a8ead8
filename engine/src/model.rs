//! State-machine vocabulary and phase-dependent parameters.
//!
//! The arbiter's behavior is configuration data: each reference phase
//! carries a table of duration-distribution parameters (one per gaze
//! state) and a five-way transition-probability vector. The tables here
//! reproduce the published interaction model verbatim; the RandomGaze
//! condition overrides both with flat values.

/// The agent's current gaze-behavior state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentGazeState {
    /// Looking at the human partner.
    PersonGaze,
    /// Looking at the object currently being referred to.
    ReferenceGaze,
    /// Looking at one of the reference's visual confusers.
    AmbiguousGaze,
    /// Looking at some other object on the table.
    OtherGaze,
    /// Looking at the manipulation target.
    TargetGaze,
}

impl AgentGazeState {
    pub const ALL: [Self; 5] = [
        Self::PersonGaze,
        Self::ReferenceGaze,
        Self::AmbiguousGaze,
        Self::OtherGaze,
        Self::TargetGaze,
    ];

    /// Stable index for per-state parameter arrays.
    pub fn index(self) -> usize {
        match self {
            Self::PersonGaze => 0,
            Self::ReferenceGaze => 1,
            Self::AmbiguousGaze => 2,
            Self::OtherGaze => 3,
            Self::TargetGaze => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PersonGaze => "person",
            Self::ReferenceGaze => "reference",
            Self::AmbiguousGaze => "ambiguous",
            Self::OtherGaze => "other",
            Self::TargetGaze => "target",
        }
    }
}

// ── Reference phase ─────────────────────────────────────────

/// Externally driven phase of the current reference-action sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferencePhase {
    None,
    PreReference,
    Reference,
    Monitor,
    Refinement,
    Action,
}

impl ReferencePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::PreReference => "pre-reference",
            Self::Reference => "reference",
            Self::Monitor => "monitor",
            Self::Refinement => "refinement",
            Self::Action => "action",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Self::None),
            "pre-reference" => Some(Self::PreReference),
            "reference" => Some(Self::Reference),
            "monitor" => Some(Self::Monitor),
            "refinement" => Some(Self::Refinement),
            "action" => Some(Self::Action),
            _ => None,
        }
    }

    /// Transition-probability vector for this phase, in force until the
    /// next phase change. `None` for the idle phase, which leaves the
    /// previous vector untouched.
    pub fn transition_weights(self) -> Option<TransitionWeights> {
        match self {
            Self::None => None,
            Self::PreReference => Some(TransitionWeights::new(0.57, 0.0, 0.40, 0.03, 0.0)),
            Self::Reference => Some(TransitionWeights::new(0.41, 0.0, 0.48, 0.11, 0.0)),
            Self::Monitor => Some(TransitionWeights::new(0.34, 0.02, 0.49, 0.14, 0.0)),
            Self::Refinement => Some(TransitionWeights::new(0.35, 0.03, 0.47, 0.15, 0.0)),
            Self::Action => Some(TransitionWeights::new(0.65, 0.0, 0.0, 0.11, 0.24)),
        }
    }

    /// Duration-distribution entries this phase updates. Entries a phase
    /// does not name keep their previous parameters.
    pub fn duration_updates(self) -> &'static [(AgentGazeState, DurationParams)] {
        use AgentGazeState::*;
        const PRE_REFERENCE: &[(AgentGazeState, DurationParams)] = &[
            (ReferenceGaze, DurationParams::new(0.85, 0.75)),
            (PersonGaze, DurationParams::new(0.65, 0.60)),
            (AmbiguousGaze, DurationParams::new(0.45, 0.30)),
            (OtherGaze, DurationParams::new(0.35, 0.20)),
        ];
        const REFERENCE: &[(AgentGazeState, DurationParams)] = &[
            (ReferenceGaze, DurationParams::new(1.10, 0.80)),
            (PersonGaze, DurationParams::new(0.60, 0.45)),
            (AmbiguousGaze, DurationParams::new(0.50, 0.20)),
            (OtherGaze, DurationParams::new(0.45, 0.25)),
        ];
        const MONITOR: &[(AgentGazeState, DurationParams)] = &[
            (ReferenceGaze, DurationParams::new(1.20, 0.90)),
            (PersonGaze, DurationParams::new(1.70, 0.50)),
            (AmbiguousGaze, DurationParams::new(0.60, 0.30)),
            (OtherGaze, DurationParams::new(0.47, 0.30)),
        ];
        const REFINEMENT: &[(AgentGazeState, DurationParams)] = &[
            (ReferenceGaze, DurationParams::new(1.20, 1.10)),
            (PersonGaze, DurationParams::new(0.57, 0.30)),
            (AmbiguousGaze, DurationParams::new(0.53, 0.40)),
            (OtherGaze, DurationParams::new(0.40, 0.20)),
        ];
        const ACTION: &[(AgentGazeState, DurationParams)] = &[
            (TargetGaze, DurationParams::new(0.86, 0.50)),
            (PersonGaze, DurationParams::new(0.60, 0.25)),
            (OtherGaze, DurationParams::new(0.66, 0.60)),
        ];
        match self {
            Self::None => &[],
            Self::PreReference => PRE_REFERENCE,
            Self::Reference => REFERENCE,
            Self::Monitor => MONITOR,
            Self::Refinement => REFINEMENT,
            Self::Action => ACTION,
        }
    }

    /// Entering Refinement or Action resets the refinement timers and the
    /// offer-refinement flag.
    pub fn clears_refinement_flags(self) -> bool {
        matches!(self, Self::Refinement | Self::Action)
    }
}

// ── Evaluation condition ────────────────────────────────────

/// Evaluation condition gating gaze production and gaze detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// The controller does nothing; gaze is handled externally.
    None,
    /// Flat transition weights and flat duration distributions.
    RandomGaze,
    /// The agent produces gaze but ignores the user's.
    NoGazeDetection,
    /// The agent reacts to the user's gaze but never redirects its own.
    NoGazeProduction,
    /// Full model with the eye-tracker sensor.
    FullModel,
    /// Full model with the head tracker; observations get neighborhood
    /// expansion to absorb head-direction uncertainty.
    FullModelHeadTracked,
}

impl Condition {
    /// Whether the agent may redirect its own gaze.
    pub fn produces_gaze(self) -> bool {
        matches!(
            self,
            Self::FullModel | Self::FullModelHeadTracked | Self::NoGazeDetection | Self::RandomGaze
        )
    }

    /// Whether heuristics may react to the user's gaze.
    pub fn consumes_gaze(self) -> bool {
        matches!(
            self,
            Self::FullModel | Self::FullModelHeadTracked | Self::NoGazeProduction
        )
    }

    /// Whether observations come from a head tracker and need expansion.
    pub fn head_tracked(self) -> bool {
        self == Self::FullModelHeadTracked
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::RandomGaze => "random-gaze",
            Self::NoGazeDetection => "no-gaze-detection",
            Self::NoGazeProduction => "no-gaze-production",
            Self::FullModel => "full-model",
            Self::FullModelHeadTracked => "full-model-head-tracked",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Self::None),
            "random-gaze" => Some(Self::RandomGaze),
            "no-gaze-detection" => Some(Self::NoGazeDetection),
            "no-gaze-production" => Some(Self::NoGazeProduction),
            "full-model" => Some(Self::FullModel),
            "full-model-head-tracked" => Some(Self::FullModelHeadTracked),
            _ => None,
        }
    }
}

// ── Parameter types ─────────────────────────────────────────

/// Mean and spread of a gaze-duration distribution, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationParams {
    pub mean: f64,
    pub spread: f64,
}

impl DurationParams {
    pub const fn new(mean: f64, spread: f64) -> Self {
        Self { mean, spread }
    }
}

/// Flat duration distribution used under the RandomGaze condition.
pub const RANDOM_GAZE_DURATION: DurationParams = DurationParams::new(0.75, 0.40);

/// Five-way transition-probability vector over the gaze states.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionWeights {
    pub other: f64,
    pub ambiguous: f64,
    pub reference: f64,
    pub person: f64,
    pub target: f64,
}

impl TransitionWeights {
    pub const fn new(other: f64, ambiguous: f64, reference: f64, person: f64, target: f64) -> Self {
        Self {
            other,
            ambiguous,
            reference,
            person,
            target,
        }
    }

    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0, 0.0)
    }

    /// Flat weights under the RandomGaze condition. The raw vector sums to
    /// 0.5, not 1.0; callers must renormalize before sampling.
    pub fn random_gaze() -> Self {
        Self::new(0.1, 0.1, 0.1, 0.1, 0.1)
    }

    /// Deterministic next transition to the target.
    pub fn force_target() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0, 1.0)
    }

    pub fn raw_sum(&self) -> f64 {
        self.other + self.ambiguous + self.reference + self.person + self.target
    }

    /// Zero the weight of the currently occupied state (OtherGaze is
    /// exempt, permitting immediate re-selection of another object) and
    /// renormalize the rest to sum to 1. `None` if nothing remains.
    pub fn renormalized_excluding(&self, current: AgentGazeState) -> Option<Self> {
        let mut w = *self;
        match current {
            AgentGazeState::AmbiguousGaze => w.ambiguous = 0.0,
            AgentGazeState::ReferenceGaze => w.reference = 0.0,
            AgentGazeState::PersonGaze => w.person = 0.0,
            AgentGazeState::TargetGaze => w.target = 0.0,
            AgentGazeState::OtherGaze => {}
        }
        let total = w.raw_sum();
        if total <= 0.0 {
            return None;
        }
        w.other /= total;
        w.ambiguous /= total;
        w.reference /= total;
        w.person /= total;
        w.target /= total;
        Some(w)
    }
}

// ── Tests ───────────────────────────────────────────────────
