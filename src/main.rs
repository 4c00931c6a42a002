use beatclockrs::{
    cli::{format_port_list, matching_ports, Args},
    config::{AppConfig, DEFAULT_CONFIG_FILE, RULES_DIR},
    create_shared_state,
    event_loop::request_shutdown,
    logging,
    midi::{
        find_port_by_substring, list_input_ports, list_output_ports, MidirInput, MidirOutput,
        OutputFanout,
    },
    remote::{OscNotifier, RemoteGateway},
    rules::{load_rule_files, RuleSet},
    ui::{KeyMapper, KeyOutcome, StatusDisplay},
    ClockEngine, Command, EventLoop, Scheduler, SharedState, ShutdownFlag, ThreadScheduler,
    TransportController,
};
use clap::Parser;
use console::{Key, Term};
use crossbeam::channel::{self, Sender};
use dialoguer::MultiSelect;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const JOIN_TIMEOUT: Duration = Duration::from_millis(800);
const OUTPUT_DRAIN: Duration = Duration::from_millis(200);
const HEADLESS_POLL: Duration = Duration::from_millis(100);

fn main() {
    logging::init();
    log::info!("Application starting");
    let args = Args::parse();

    if args.list_ports {
        list_ports();
        return;
    }

    if let Err(e) = run(args) {
        log::error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn list_ports() {
    print!("{}", format_port_list("MIDI inputs", &list_input_ports()));
    print!("{}", format_port_list("MIDI outputs", &list_output_ports()));
}

fn run(args: Args) -> std::io::Result<()> {
    let config_path = args.config.as_deref().unwrap_or(DEFAULT_CONFIG_FILE);
    let config = AppConfig::load_or_default(Path::new(config_path));
    let rules = load_rule_files(Path::new(RULES_DIR), &args.rule_files);

    let initial_bpm = args
        .bpm
        .or(rules.default_tempo)
        .unwrap_or(config.general.default_bpm);
    let state = create_shared_state(initial_bpm);
    log::info!("Initial tempo {:.2} BPM", state.tempo());

    let outputs = Arc::new(OutputFanout::new());
    open_outputs(&args, &config, &rules, &outputs);
    if outputs.is_empty() {
        log::warn!("No MIDI outputs open; the clock runs without destinations");
        eprintln!("Warning: no MIDI outputs open.");
    }

    let mut transport = TransportController::new(state.clone(), outputs.clone());
    if config.osc.enabled {
        match OscNotifier::new(&config.osc) {
            Ok(notifier) => transport = transport.with_notifier(Arc::new(notifier)),
            Err(e) => log::warn!("OSC feedback disabled: {}", e),
        }
    }
    let transport = Arc::new(transport);

    let (command_tx, command_rx) = channel::unbounded::<Command>();
    let shutdown = ShutdownFlag::new();
    let scheduler = ThreadScheduler::new();

    let handler_tx = command_tx.clone();
    let handler_flag = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || request_shutdown(&handler_tx, &handler_flag)) {
        log::warn!("Could not install Ctrl+C handler: {}", e);
    }

    let event_loop = EventLoop::new(
        command_rx,
        transport.clone(),
        rules.engine(),
        shutdown.clone(),
    );
    let mut keys = KeyMapper::new();
    let display = StatusDisplay::new(
        state.clone(),
        keys.pending(),
        outputs.names(),
        shutdown.clone(),
    );

    let started = spawn_workers(
        &config,
        &scheduler,
        &state,
        &outputs,
        event_loop,
        display,
        &command_tx,
        &shutdown,
    );
    let mut inputs = match &started {
        Ok(()) => {
            let inputs = open_inputs(&rules, &command_tx);
            read_keys(&mut keys, &state, &command_tx, &shutdown);
            inputs
        }
        Err(e) => {
            log::error!("Startup failed: {}", e);
            Vec::new()
        }
    };

    log::info!("Shutting down");
    request_shutdown(&command_tx, &shutdown);
    state.wake().notify();
    let abandoned = scheduler.join_all(JOIN_TIMEOUT);
    if !abandoned.is_empty() {
        log::warn!("Abandoned threads: {}", abandoned.join(", "));
    }

    transport.panic();
    outputs.close_all(OUTPUT_DRAIN);
    for input in &mut inputs {
        log::debug!("Closing input '{}'", input.name());
        input.close();
    }
    log::info!("Shutdown complete");
    started
}

/// Starts the clock, event loop, OSC listener and status display. Threads
/// spawned before a failure stay registered with the scheduler so the
/// caller's shutdown still joins them.
#[allow(clippy::too_many_arguments)]
fn spawn_workers(
    config: &AppConfig,
    scheduler: &ThreadScheduler,
    state: &SharedState,
    outputs: &Arc<OutputFanout>,
    event_loop: EventLoop,
    display: StatusDisplay,
    command_tx: &Sender<Command>,
    shutdown: &ShutdownFlag,
) -> std::io::Result<()> {
    let clock = ClockEngine::new(state.clone(), outputs.clone(), shutdown.clone());
    scheduler.spawn("clock", move || {
        clock.run();
    })?;
    scheduler.spawn("event-loop", move || event_loop.run())?;

    if config.osc.enabled {
        start_remote(config, scheduler, command_tx, shutdown)?;
    }

    scheduler.spawn("status-display", move || display.run())?;
    Ok(())
}

fn start_remote(
    config: &AppConfig,
    scheduler: &ThreadScheduler,
    command_tx: &Sender<Command>,
    shutdown: &ShutdownFlag,
) -> std::io::Result<()> {
    match RemoteGateway::bind(&config.osc) {
        Ok(gateway) => {
            let tx = command_tx.clone();
            let flag = shutdown.clone();
            scheduler.spawn("osc-listener", move || gateway.run(tx, flag))?;
        }
        Err(e) => {
            log::error!("OSC remote control unavailable: {}", e);
            eprintln!("OSC remote control unavailable: {}", e);
        }
    }
    Ok(())
}

fn output_selection(args: &Args, rules: &RuleSet, available: &[String]) -> Vec<String> {
    if !args.outputs.is_empty() {
        let selected: BTreeSet<&str> = args
            .outputs
            .iter()
            .flat_map(|substring| {
                let found = matching_ports(substring, available);
                if found.is_empty() {
                    log::warn!("No output port matches '{}'", substring);
                }
                found
            })
            .collect();
        return selected.into_iter().map(str::to_string).collect();
    }

    if let Some(alias) = &rules.default_output_alias {
        let substring = rules.aliases.resolve(alias);
        return match find_port_by_substring(available, substring) {
            Some(port) => vec![port.to_string()],
            None => {
                log::warn!("Default output '{}' ({}) not found", alias, substring);
                Vec::new()
            }
        };
    }

    if args.virtual_port || args.vp_out.is_some() || available.is_empty() {
        return Vec::new();
    }
    select_outputs_interactively(available)
}

fn select_outputs_interactively(available: &[String]) -> Vec<String> {
    let chosen = MultiSelect::new()
        .with_prompt("Select clock output ports (space to toggle, enter to confirm)")
        .items(available)
        .interact_opt();
    match chosen {
        Ok(Some(indices)) => indices
            .into_iter()
            .filter_map(|i| available.get(i).cloned())
            .collect(),
        Ok(None) => Vec::new(),
        Err(e) => {
            log::warn!("Port selection failed: {}", e);
            Vec::new()
        }
    }
}

fn open_outputs(args: &Args, config: &AppConfig, rules: &RuleSet, outputs: &OutputFanout) {
    let available = list_output_ports();
    for name in output_selection(args, rules, &available) {
        match MidirOutput::open(&name) {
            Ok(output) => outputs.attach(Box::new(output)),
            Err(e) => log::warn!("Could not open output '{}': {}", name, e),
        }
    }

    if let Some(name) = args.virtual_port_name(&config.general.default_virtual_port_name) {
        match MidirOutput::open_virtual(&name) {
            Ok(output) => outputs.attach(Box::new(output)),
            Err(e) => log::warn!("Could not create virtual output '{}': {}", name, e),
        }
    }
}

/// Opens every input port referenced by a rule, once each.
fn open_inputs(rules: &RuleSet, command_tx: &Sender<Command>) -> Vec<MidirInput> {
    let available = list_input_ports();
    let wanted: BTreeSet<&str> = rules
        .rules
        .iter()
        .flat_map(|rule| matching_ports(rules.aliases.resolve(&rule.device_alias), &available))
        .collect();

    wanted
        .into_iter()
        .filter_map(|port| {
            let tx = command_tx.clone();
            let opened = MidirInput::open(port, move |message, source| {
                let _ = tx.send(Command::Midi {
                    message,
                    port: source.to_string(),
                });
            });
            match opened {
                Ok(input) => Some(input),
                Err(e) => {
                    log::warn!("Could not open input '{}': {}", port, e);
                    None
                }
            }
        })
        .collect()
}

fn read_keys(
    keys: &mut KeyMapper,
    state: &SharedState,
    command_tx: &Sender<Command>,
    shutdown: &ShutdownFlag,
) {
    let term = Term::stdout();
    if !term.is_term() {
        log::info!("Not attached to a terminal; keyboard control disabled");
        shutdown.wait(HEADLESS_POLL);
        return;
    }

    while !shutdown.is_set() {
        let key = match term.read_key() {
            Ok(Key::Char('\u{3}')) => break,
            Ok(key) => key,
            Err(e) => {
                log::warn!("Keyboard read failed: {}", e);
                break;
            }
        };
        match keys.handle(key, state) {
            KeyOutcome::Send(command) => {
                if command_tx.send(command).is_err() {
                    break;
                }
            }
            KeyOutcome::Quit => break,
            KeyOutcome::Ignored => {}
        }
    }
}
