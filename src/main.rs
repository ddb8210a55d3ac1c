//! beatkeeper CLI entry point

mod cli;

use clap::Parser;
use std::io::BufRead;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use beatkeeper_lib::audio::{self, InputCapture, OutputEngine};
use beatkeeper_lib::clock::{Clock, MonotonicClock};
use beatkeeper_lib::rhythm::patterns::RANDOM_ID;
use beatkeeper_lib::rhythm::{PatternLibrary, TriggerQueue, Voice};
use beatkeeper_lib::{logging, Config, Result, Session, SessionObserver};

use cli::{Cli, Command};

/// Main loop period (about one display frame)
const POLL_INTERVAL: Duration = Duration::from_millis(16);

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_path = cli.log_path();
    match logging::init(cli.verbose, log_path.as_deref()) {
        Ok(Some(path)) => eprintln!("Logging to {}", path.display()),
        Ok(None) => {}
        Err(e) => {
            eprintln!("Error: could not open log file: {}", e);
            return ExitCode::FAILURE;
        }
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(cli.command, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Fatal error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(preset) = cli.stability_preset() {
        config.apply_stability_preset(preset);
    }
    config.validate()?;
    Ok(config)
}

fn run(command: Command, config: Config) -> Result<()> {
    match command {
        Command::Listen {
            device,
            output,
            pattern,
            seconds,
            no_auto_start,
        } => listen(
            config,
            device.as_deref(),
            output.as_deref(),
            pattern.as_deref(),
            seconds,
            no_auto_start,
        ),
        Command::Play {
            bpm,
            pattern,
            output,
            seconds,
        } => play(config, bpm, pattern.as_deref(), output.as_deref(), seconds),
        Command::Tap => tap(config),
        Command::Patterns { steps } => print_patterns(&config, steps),
        Command::Devices => {
            let listing = audio::list_devices()?;
            println!("{}", serde_json::to_string_pretty(&listing)?);
            Ok(())
        }
    }
}

// =============================================================================
// Console display
// =============================================================================

/// Prints tempo changes to stdout
#[derive(Default)]
struct ConsoleObserver {
    show_steps: bool,
}

impl SessionObserver for ConsoleObserver {
    fn on_bpm(&mut self, bpm: Option<u32>) {
        match bpm {
            Some(bpm) => println!("BPM: {}", bpm),
            None => println!("BPM: --"),
        }
    }

    fn on_stable(&mut self, bpm: u32) {
        println!("Stable at {} BPM", bpm);
    }

    fn on_step(&mut self, step: usize, _time_s: f64) {
        if self.show_steps && step % 4 == 0 {
            println!("beat {}", step / 4 + 1);
        }
    }
}

// =============================================================================
// Commands
// =============================================================================

fn listen(
    mut config: Config,
    device: Option<&str>,
    output: Option<&str>,
    pattern: Option<&str>,
    seconds: Option<f64>,
    no_auto_start: bool,
) -> Result<()> {
    if no_auto_start {
        config.session.auto_start_on_stable = false;
    }
    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let queue = Arc::new(TriggerQueue::new(config.session.trigger_queue_capacity));

    // Detection still works without an output device
    let _engine = match OutputEngine::start(output, Arc::clone(&clock), Arc::clone(&queue)) {
        Ok(engine) => Some(engine),
        Err(e) => {
            log::warn!("Drum output unavailable, tempo only: {}", e);
            None
        }
    };

    let frame_size = config.analyzer.frame_size;
    let mut session = Session::new(config, Arc::clone(&clock), Box::new(ConsoleObserver::default()))?;
    if let Some(id) = pattern {
        select(&mut session, id);
    }

    let capture = InputCapture::open(device, frame_size, Arc::clone(&clock))?;
    println!(
        "Listening on {} ({} Hz), play a steady beat",
        capture.device_name(),
        capture.sample_rate()
    );
    session.start_listening(Box::new(capture));

    let deadline = seconds.map(|s| clock.now_ms() + s * 1000.0);
    let mut sink: &TriggerQueue = &queue;
    while session.is_listening() {
        session.process_frame()?;
        session.poll_rhythm(&mut sink);
        if deadline.is_some_and(|d| clock.now_ms() >= d) {
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    session.stop_rhythm();
    session.stop_listening();
    Ok(())
}

fn play(
    mut config: Config,
    bpm: u32,
    pattern: Option<&str>,
    output: Option<&str>,
    seconds: Option<f64>,
) -> Result<()> {
    config.session.auto_start_on_stable = false;
    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let queue = Arc::new(TriggerQueue::new(config.session.trigger_queue_capacity));
    let engine = OutputEngine::start(output, Arc::clone(&clock), Arc::clone(&queue))?;

    let observer = ConsoleObserver { show_steps: true };
    let mut session = Session::new(config, Arc::clone(&clock), Box::new(observer))?;
    session.set_manual_bpm(bpm)?;
    if let Some(id) = pattern {
        select(&mut session, id);
    }
    print_grid(&session);

    session.start_rhythm()?;
    let deadline = seconds.map(|s| clock.now_ms() + s * 1000.0);
    let mut sink: &TriggerQueue = &queue;
    while session.is_playing() {
        session.poll_rhythm(&mut sink);
        if deadline.is_some_and(|d| clock.now_ms() >= d) {
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    session.stop_rhythm();
    log::info!("{} hits played on {}", engine.hits_played(), engine.device_name());
    Ok(())
}

fn tap(config: Config) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let mut session = Session::new(config, clock, Box::new(ConsoleObserver::default()))?;

    println!("Press Enter on each beat, q then Enter to finish");
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().eq_ignore_ascii_case("q") {
            break;
        }
        if session.tap().is_none() {
            println!("tap");
        }
    }

    match session.fix_bpm()? {
        Some(bpm) => println!("Tempo: {} BPM", bpm),
        None => println!("Not enough taps for a tempo"),
    }
    Ok(())
}

fn print_patterns(config: &Config, steps: bool) -> Result<()> {
    let library = PatternLibrary::new(config.random);
    let listing: Vec<serde_json::Value> = library
        .list()
        .into_iter()
        .map(|info| {
            let mut entry = serde_json::json!(info);
            if steps {
                let pattern = library.pattern(&info.id);
                let rows: serde_json::Map<String, serde_json::Value> = Voice::ALL
                    .iter()
                    .map(|&voice| (voice.name().to_string(), pattern.row(voice).into()))
                    .collect();
                entry["steps"] = serde_json::Value::Object(rows);
            }
            entry
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&listing)?);
    Ok(())
}

fn select(session: &mut Session, id: &str) {
    if id == RANDOM_ID {
        session.randomize_pattern();
    } else {
        session.select_pattern(id);
    }
}

fn print_grid(session: &Session) {
    let pattern = session.scheduler().pattern();
    println!("Pattern: {}", session.active_pattern_id());
    for voice in Voice::ALL {
        println!("  {:<6} {}", voice.name(), pattern.row(voice));
    }
}
