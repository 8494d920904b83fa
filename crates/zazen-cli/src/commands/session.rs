use std::time::Duration;

use clap::Subcommand;
use tracing::{debug, info};
use zazen_core::storage::EffectsConfig;
use zazen_core::timer::pending_instants;
use zazen_core::{
    now_ms, AlarmQueue, Config, EffectKind, EffectSink, Event, KvSessionStore, RawStep,
    SchedulingMode, SessionService, SessionState, SessionStore,
};

use super::print_json;

type Service = SessionService<KvSessionStore, AlarmQueue, TerminalSink>;

#[derive(Subcommand)]
pub enum SessionAction {
    /// Start a session, replacing any running one
    Start {
        /// Steps as JSON: `[{"t":"zazen","d":600}]` or
        /// `{"steps":[{"type":"zazen","durationSeconds":600}]}`.
        /// Uses the configured default steps when omitted.
        steps: Option<String>,
    },
    /// Cancel the running session
    Stop,
    /// Print the current step and remaining time as JSON
    Status,
    /// Print the transition instants still ahead
    Instants,
    /// Transition callback: step INDEX has completed
    Fire {
        /// Index of the step that just completed
        index: usize,
    },
    /// Track the running session until it ends
    Watch {
        /// Re-check at the configured interval instead of sleeping until
        /// each transition
        #[arg(long)]
        polling: bool,
    },
}

/// Effect sink for a terminal host: rings the bell for vibrations and writes
/// the status line to stderr.
pub struct TerminalSink {
    effects: EffectsConfig,
}

impl TerminalSink {
    pub fn new(effects: EffectsConfig) -> Self {
        Self { effects }
    }
}

impl EffectSink for TerminalSink {
    fn perform(&mut self, effect: EffectKind) {
        if effect.is_silent() || !self.effects.vibration {
            debug!(?effect, "Skipping effect");
            return;
        }
        info!(?effect, pattern = ?effect.waveform(), "Vibrate");
        let pulses = effect.waveform().len() / 2;
        eprint!("{}", "\x07".repeat(pulses.max(1)));
    }

    fn step_started(&mut self, state: &SessionState) {
        if self.effects.notifications {
            let snapshot = state.snapshot(state.step_start_time_ms);
            eprintln!("{}", snapshot.status_line());
        }
    }

    fn session_finished(&mut self) {
        if self.effects.notifications {
            eprintln!("Session finished");
        }
    }
}

fn open_service(config: &Config) -> Result<Service, Box<dyn std::error::Error>> {
    let store = KvSessionStore::open()?;
    Ok(SessionService::new(
        store,
        AlarmQueue::new(),
        TerminalSink::new(config.effects.clone()),
    ))
}

fn print_events(events: &[Event]) -> Result<(), Box<dyn std::error::Error>> {
    for event in events {
        print_json(event)?;
    }
    Ok(())
}

pub fn run(action: SessionAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let mut service = open_service(&config)?;

    match action {
        SessionAction::Start { steps } => {
            let raw = match steps {
                Some(json) => RawStep::parse_list(&json)?,
                None => config.default_steps.clone(),
            };
            let event = service.start(&raw, now_ms())?;
            print_json(&event)?;
        }
        SessionAction::Stop => {
            let event = service.stop(now_ms())?;
            print_json(&event)?;
        }
        SessionAction::Status => {
            print_json(&service.query(now_ms()))?;
        }
        SessionAction::Instants => {
            let pending = service
                .store()
                .load()
                .map(|record| pending_instants(&record, now_ms()))
                .unwrap_or_default();
            print_json(&pending)?;
        }
        SessionAction::Fire { index } => {
            let events = service.on_transition(index, now_ms())?;
            print_events(&events)?;
        }
        SessionAction::Watch { polling } => {
            let mode = if polling {
                SchedulingMode::Polling
            } else {
                config.scheduling.mode
            };
            let interval = Duration::from_millis(config.scheduling.poll_interval_ms.max(1));
            watch(service, mode, interval)?;
        }
    }
    Ok(())
}

/// Host loop. Picks up the persisted session, then either sleeps until each
/// armed transition or polls at `interval`, until the session is gone.
fn watch(
    mut service: Service,
    mode: SchedulingMode,
    interval: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    match service.rehydrate(now_ms())? {
        Some(event) => print_json(&event)?,
        None => {
            print_json(&Option::<Event>::None)?;
            return Ok(());
        }
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        match mode {
            SchedulingMode::Precise => {
                while let Some(deadline) = service.next_deadline() {
                    let wait = deadline.saturating_sub(now_ms());
                    tokio::time::sleep(Duration::from_millis(wait)).await;
                    print_events(&service.fire_due(now_ms())?)?;
                    if service.store().load().is_none() {
                        break;
                    }
                }
            }
            SchedulingMode::Polling => {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                    print_events(&service.poll(now_ms())?)?;
                    if service.store().load().is_none() {
                        break;
                    }
                }
            }
        }
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
