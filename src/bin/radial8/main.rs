//! Runs one block of the radial8 task.
//!
//! ```text
//! cargo run --bin radial8 -- --config task.ron
//! ```
//!
//! Asks for the trial count, participant and data directory, picks the
//! amplifier, runs the trials in the terminal and saves the block.

use clap::Parser;
use log::{error, info, warn};
use rand::{rngs::StdRng, SeedableRng};
use radial8::{
    args::RadialArgs,
    config::TaskConfig,
    dummy_source::DummySource,
    gui::{device_selector, run_task},
    logging::{self, LogHandle},
    prompt::{self, Answers},
    sample_queue::SampleQueue,
    sample_source::{available_ports, SampleSource, SerialSource},
    scheduler::RandomPicker,
    session::{Session, SessionClock, SessionMetadata},
    session_file::finalize,
    setup::{choose_port, next_block_id, BlockPaths, PortChoice, SetupError},
    shutdown::{self, StopFlag},
};
use std::{fs, io, process};

/// Everything settled before the block log file is opened.
struct Prepared {
    args: RadialArgs,
    config: TaskConfig,
    answers: Answers,
    block_id: u32,
    paths: BlockPaths,
}

fn prepare(args: RadialArgs) -> Result<Prepared, SetupError> {
    let config = match &args.config {
        Some(path) => TaskConfig::from_path(path)?,
        None => TaskConfig::default(),
    };

    let answers = prompt::ask_all(&mut io::stdin().lock(), &mut io::stdout(), &config.data_dir)?;
    fs::create_dir_all(&answers.data_dir)?;
    let block_id = next_block_id(&answers.data_dir, &answers.participant_id)?;
    let paths = BlockPaths::new(&answers.data_dir, &answers.participant_id, block_id);

    Ok(Prepared {
        args,
        config,
        answers,
        block_id,
        paths,
    })
}

fn open_source(prepared: &Prepared) -> Result<Box<dyn SampleSource>, SetupError> {
    let Prepared { args, config, .. } = prepared;

    if args.dummy {
        info!(
            "Using synthetic samples: {} channels at {} Hz",
            config.channel_count, config.sample_rate
        );
        return Ok(Box::new(
            DummySource::builder()
                .sample_rate(config.sample_rate)
                .channel_count(config.channel_count)
                .build(),
        ));
    }

    let requested = args.port.as_deref().or(config.port.as_deref());
    let port = match choose_port(available_ports()?, requested)? {
        PortChoice::Use(port) => port,
        PortChoice::Ask(ports) => {
            info!("{} serial ports found, asking which one", ports.len());
            device_selector(ports)?.ok_or(SetupError::SelectorCancelled)?
        }
    };
    info!("Using serial port {}", port.display());

    Ok(Box::new(SerialSource::open(&port, config.serial_settings())?))
}

/// Run the trials and save them. `Ok(false)` means the block ran but
/// something failed on the way out; that has already been logged.
fn run_block(prepared: Prepared, log: &LogHandle) -> Result<bool, SetupError> {
    let mut source = open_source(&prepared)?;
    let Prepared {
        config,
        answers,
        block_id,
        paths,
        ..
    } = prepared;

    let queue = match config.queue_capacity {
        Some(capacity) => SampleQueue::bounded(capacity),
        None => SampleQueue::new(),
    };

    let metadata = SessionMetadata {
        sample_rate: config.sample_rate,
        channel_count: config.channel_count,
        participant_id: answers.participant_id,
        block_id,
        task_name: config.task_name.clone(),
        requested_trial_count: answers.trial_count,
        completed_trial_count: 0,
        save_path: paths.session,
    };
    let picker = RandomPicker::new(
        StdRng::from_entropy(),
        config.min_delay_ms,
        config.max_delay_ms,
    );
    let mut session = Session::open(metadata, config.layout(), picker, queue.clone());
    let clock = SessionClock::start();

    let producer = queue.clone();
    source
        .start_stream(Box::new(move |sample| producer.enqueue(sample)))
        .map_err(SetupError::DeviceInit)?;

    // Window close and kill end the task the same way Esc does
    let stop = shutdown::on_termination().unwrap_or_else(|e| {
        warn!("Could not install the termination handler: {}", e);
        StopFlag::new()
    });
    let shown = run_task(
        &mut session,
        &clock,
        config.frame_rate,
        &stop,
        Some(log.console()),
    );
    if let Err(e) = &shown {
        error!("Task display failed: {}", e);
    }

    // Stopping the stream and saving are attempted whatever the other does
    let stopped = source.stop();
    if let Err(e) = &stopped {
        error!("Could not stop the amplifier: {}", e);
    }
    if queue.dropped_count() > 0 {
        warn!(
            "{} samples were dropped because the queue was full",
            queue.dropped_count()
        );
    }

    let saved = match session.close() {
        Some(record) => finalize(&record, &config.backup_dir).map(|_| ()),
        None => Ok(()),
    };

    Ok(shown.is_ok() && stopped.is_ok() && saved.is_ok())
}

fn main() {
    let args = RadialArgs::parse();

    let log = match logging::init() {
        Ok(log) => log,
        Err(e) => {
            eprintln!("radial8: {}", e);
            process::exit(1);
        }
    };

    let prepared = match prepare(args) {
        Ok(prepared) => prepared,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    if let Err(e) = log.log_to_file(&prepared.paths.log) {
        error!("{}: {}", prepared.paths.log.display(), e);
        process::exit(1);
    }
    info!(
        "Block {} for {}, logging to {}",
        prepared.block_id,
        prepared.answers.participant_id,
        prepared.paths.log.display()
    );

    match run_block(prepared, &log) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    }
}
