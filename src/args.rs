use clap::Parser;

/// This program tallies ranked top-20 movie ballots into the leaderboard of a decade list.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The session file in JSON: the list to create, the catalog of movies and the
    /// sources of ballots. For more information about the file format, read the documentation of
    /// the `ballot_engine::manual` module.
    #[clap(short, long, value_parser)]
    pub config: String,

    /// (file path) A reference file containing the summary of a session in JSON format. If provided,
    /// decadevote will check that the computed summary matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the summary of the session will be written in JSON
    /// format to the given location. Setting this option overrides the output directory that may be
    /// specified in the session file.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path or empty) If specified, the leaderboard will also be written in CSV format to the
    /// given location.
    #[clap(long, value_parser)]
    pub csv: Option<String>,

    /// If passed as an argument, the list is closed at the end of the session, whatever the session
    /// file says.
    #[clap(long, takes_value = false)]
    pub close: bool,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
