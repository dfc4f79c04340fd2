//! Command-line surface of the daemon.

use std::path::PathBuf;

use clap::Parser;

/// Session and policy manager for the media graph.
#[derive(Parser, Debug)]
#[command(name = "ljudvakt", disable_version_flag = true)]
pub struct Args {
    /// Show version
    #[arg(short = 'v', long)]
    pub version: bool,

    /// The configuration file to use
    #[arg(short = 'c', long = "config-file", default_value = "wireplumber.conf")]
    pub config_file: PathBuf,

    /// The profile to load
    #[arg(short = 'p', long, default_value = "main")]
    pub profile: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["ljudvakt"]).unwrap();
        assert!(!args.version);
        assert_eq!(args.config_file, PathBuf::from("wireplumber.conf"));
        assert_eq!(args.profile, "main");
    }

    #[test]
    fn short_and_long_flags() {
        let args =
            Args::try_parse_from(["ljudvakt", "-c", "alt.conf", "--profile", "video"]).unwrap();
        assert_eq!(args.config_file, PathBuf::from("alt.conf"));
        assert_eq!(args.profile, "video");

        let args = Args::try_parse_from(["ljudvakt", "-v"]).unwrap();
        assert!(args.version);
    }

    #[test]
    fn unknown_flag_is_a_usage_error() {
        let err = Args::try_parse_from(["ljudvakt", "--bogus"]).unwrap_err();
        assert!(err.use_stderr());
    }
}
