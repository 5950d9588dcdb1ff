//! Prints what is in a saved radial8 block and plots its trajectories.
//!
//! ```text
//! cargo run --bin inspect -- data/P01_block1.r8s
//! ```

mod plot;

use clap::Parser;
use radial8::{
    args::InspectArgs,
    session::SessionRecord,
    session_file::read_session,
};
use std::{fmt::Write, process};

use plot::engage_plot;

fn describe(record: &SessionRecord) -> String {
    let meta = &record.metadata;
    let mut out = String::new();

    let _ = writeln!(
        out,
        "{} block {} for {:?}: {}/{} trials, {} channels at {} Hz",
        meta.task_name,
        meta.block_id,
        meta.participant_id,
        meta.completed_trial_count,
        meta.requested_trial_count,
        meta.channel_count,
        meta.sample_rate
    );
    let _ = writeln!(out, "saved as {}", meta.save_path.display());
    let _ = writeln!(
        out,
        "{:>5} {:>3} {:>7} {:>10} {:>10} {:>10} {:>8} {:>6}",
        "trial", "cue", "samples", "go ms", "start ms", "end ms", "dur ms", "points"
    );
    for (i, t) in record.trials.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>5} {:>3} {:>7} {:>10.1} {:>10.1} {:>10.1} {:>8.1} {:>6}",
            i + 1,
            t.cue,
            t.neural_samples.len(),
            t.go_time,
            t.start_time,
            t.end_time,
            t.duration(),
            t.cursor_trajectory.len()
        );
    }
    out
}

fn main() {
    let args = InspectArgs::parse();

    let record = match read_session(&args.file) {
        Ok(record) => record,
        Err(e) => {
            eprintln!("inspect: {}: {}", args.file.display(), e);
            process::exit(1);
        }
    };

    print!("{}", describe(&record));

    if args.no_plot || record.trials.iter().all(|t| t.cursor_trajectory.is_empty()) {
        return;
    }
    if let Err(e) = engage_plot(&record) {
        eprintln!("inspect: {}", e);
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radial8::{recording::TrialRecord, session::SessionMetadata, Point};
    use std::path::PathBuf;

    #[test]
    fn table() {
        let record = SessionRecord {
            trials: vec![TrialRecord {
                cue: 5,
                neural_samples: vec![vec![0.0; 8]; 125],
                cursor_trajectory: vec![Point::new(450.0, 350.0), Point::new(273.0, 527.0)],
                go_time: 1000.0,
                start_time: 1004.0,
                end_time: 1504.0,
            }],
            metadata: SessionMetadata {
                sample_rate: 250.0,
                channel_count: 8,
                participant_id: "P01".to_owned(),
                block_id: 2,
                task_name: "radial8".to_owned(),
                requested_trial_count: 1,
                completed_trial_count: 1,
                save_path: PathBuf::from("data/P01_block2.r8s"),
            },
        };

        let text = describe(&record);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("radial8 block 2 for \"P01\": 1/1 trials"));
        assert_eq!(
            lines[3].split_whitespace().collect::<Vec<_>>(),
            ["1", "5", "125", "1000.0", "1004.0", "1504.0", "500.0", "2"]
        );
    }
}
