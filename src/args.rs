// Commandline argument parsers using clap for radial8

use clap::Parser;
use std::path::PathBuf;

/// Run a block of the radial8 center-out reaching task.
///
/// Everything about the block itself is asked for at the console; these
/// flags only change how the task is set up.
#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct RadialArgs {
    /// RON file of task settings; anything left out keeps its default
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Serial port of the amplifier, skipping the device selector
    #[arg(short = 'p', long = "port")]
    pub port: Option<PathBuf>,

    /// Stream synthetic samples instead of opening a serial port
    #[arg(long = "dummy", conflicts_with = "port")]
    pub dummy: bool,
}

/// Look over a saved radial8 session.
#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct InspectArgs {
    /// Session file, or its backup
    pub file: PathBuf,

    /// Print the summary without drawing the trajectories
    #[arg(long = "no-plot")]
    pub no_plot: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radial_flags() {
        let args = RadialArgs::parse_from(["radial8"]);
        assert!(args.config.is_none() && args.port.is_none() && !args.dummy);

        let args = RadialArgs::parse_from(["radial8", "-c", "task.ron", "--port", "/dev/ttyUSB0"]);
        assert_eq!(args.config, Some(PathBuf::from("task.ron")));
        assert_eq!(args.port, Some(PathBuf::from("/dev/ttyUSB0")));

        assert!(RadialArgs::try_parse_from(["radial8", "--dummy", "-p", "COM3"]).is_err());
    }

    #[test]
    fn inspect_needs_file() {
        assert!(InspectArgs::try_parse_from(["inspect"]).is_err());
        let args = InspectArgs::parse_from(["inspect", "data/P01_block1.r8s", "--no-plot"]);
        assert_eq!(args.file, PathBuf::from("data/P01_block1.r8s"));
        assert!(args.no_plot);
    }
}
