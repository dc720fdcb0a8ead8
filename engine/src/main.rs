//! regard driver: runs scripted reference-action sequences against the
//! gaze-arbitration engine with a stub effector and a scripted observer,
//! so the full model can be exercised without a host engine.

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{debug, info};

use regard::arbiter::{ArbiterConfig, GazeArbiter};
use regard::effector::{Effector, RecordingEffector};
use regard::eyes_alive::{EyesAlive, EyesAliveConfig};
use regard::logging::EventLog;
use regard::model::{Condition, ReferencePhase};
use regard::source::{ObservationSource, ScriptedSource};

#[derive(Parser, Debug)]
#[command(name = "regard", about = "Interactive gaze arbitration engine")]
struct Cli {
    /// Evaluation condition: full-model, full-model-head-tracked,
    /// no-gaze-detection, no-gaze-production, random-gaze, or none
    #[arg(long, default_value = "full-model")]
    condition: String,

    /// Seed for the random generator (omit for entropy)
    #[arg(long)]
    seed: Option<u64>,

    /// Write the tab-separated study log to this file
    #[arg(long)]
    log_file: Option<std::path::PathBuf>,

    /// Control ticks per second
    #[arg(long, default_value_t = 30)]
    tick_hz: u32,

    /// Number of reference-action sequences to run
    #[arg(long, default_value_t = 1)]
    sequences: u32,

    /// Simulated gaze-shift latency of the animation layer, in seconds
    #[arg(long, default_value_t = 0.3)]
    shift_latency: f64,

    /// Also run the idle micro-saccade controller
    #[arg(long)]
    eyes_alive: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "regard=info".into()),
        )
        .init();

    let Some(condition) = Condition::from_str(&cli.condition) else {
        bail!(
            "unknown condition {:?}; use full-model, full-model-head-tracked, \
             no-gaze-detection, no-gaze-production, random-gaze, or none",
            cli.condition
        );
    };
    if cli.tick_hz == 0 {
        bail!("tick-hz must be positive");
    }

    let log = match &cli.log_file {
        Some(path) => EventLog::to_file(path)
            .with_context(|| format!("cannot create log file {}", path.display()))?,
        None => EventLog::disabled(),
    };

    let config = ArbiterConfig {
        condition,
        ..ArbiterConfig::default()
    };
    let mut arbiter = match cli.seed {
        Some(seed) => GazeArbiter::with_seed(config, log, seed),
        None => GazeArbiter::new(config, log),
    };
    let mut effector = RecordingEffector::new(cli.shift_latency);
    let mut eyes = cli.eyes_alive.then(|| match cli.seed {
        Some(seed) => EyesAlive::with_seed(EyesAliveConfig::default(), seed),
        None => EyesAlive::new(EyesAliveConfig::default()),
    });

    info!(
        "regard v{} starting: condition {}, {} sequence(s) at {} Hz",
        env!("CARGO_PKG_VERSION"),
        condition.as_str(),
        cli.sequences,
        cli.tick_hz
    );

    let dt = 1.0 / f64::from(cli.tick_hz);
    let hz = cli.tick_hz as usize;
    let mut refinements = 0u32;

    for sequence in 1..=cli.sequences {
        info!("sequence {}: reference 5, confusers 4 and 11", sequence);
        let other: Vec<u8> = (1..=18).filter(|c| ![5, 4, 11, 12].contains(c)).collect();
        arbiter.set_reference(5, vec![4, 11], other);

        // A plausible trial: the user idles, tracks the instruction,
        // fixates a confuser long enough to look confused, glances at
        // the agent, and finally acts on the target.
        let phases: [(ReferencePhase, Vec<(u8, usize)>); 5] = [
            (ReferencePhase::PreReference, vec![(0, 2 * hz)]),
            (ReferencePhase::Reference, vec![(0, hz / 2), (5, hz)]),
            (
                ReferencePhase::Monitor,
                vec![(5, hz), (4, 2 * hz), (19, hz)],
            ),
            (ReferencePhase::Refinement, vec![(4, hz), (5, hz)]),
            (
                ReferencePhase::Action,
                vec![(19, hz / 2), (2, hz / 2), (12, 2 * hz)],
            ),
        ];

        for (phase, segments) in phases {
            // The scripted Refinement phase only makes sense when the
            // model actually asked for it.
            if phase == ReferencePhase::Refinement && !arbiter.offer_refinement() {
                continue;
            }
            if phase == ReferencePhase::Refinement {
                refinements += 1;
            }
            arbiter.set_phase(phase);
            info!("phase {}", phase.as_str());

            let mut source = ScriptedSource::from_segments(&segments);
            let ticks: usize = segments.iter().map(|(_, n)| n).sum();
            for _ in 0..ticks {
                effector.advance(dt);
                let observation = source.grid_location();
                for event in arbiter.tick(dt, observation, &mut effector) {
                    info!("{}", event);
                }
                if let Some(eyes) = eyes.as_mut() {
                    let idle = effector.left_eye_settled() && effector.right_eye_settled();
                    let offset = eyes.tick(dt, idle);
                    if offset != regard::eyes_alive::EyeOffset::ZERO {
                        debug!(
                            "eyes-alive offset: pitch {:.2} yaw {:.2}",
                            offset.pitch_deg, offset.yaw_deg
                        );
                    }
                }
            }
        }

        arbiter.set_phase(ReferencePhase::None);
    }

    info!(
        "done: final state {}, agent gaze at cell {}, {} gaze command(s), {} refinement(s) offered",
        arbiter.state().as_str(),
        arbiter.agent_gaze(),
        effector.commands.len(),
        refinements
    );
    Ok(())
}
