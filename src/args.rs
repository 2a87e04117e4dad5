use clap::Parser;

/// This is a reconciliation program for cancer-registry datasets.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) A configuration file in JSON format. See the manual for the format.
    /// The options passed on the command line take precedence over the configuration file.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,
    /// (file path) A reference file containing a summary in JSON format. If provided, regrecon will
    /// check that the produced summary matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the summary will be written in JSON format to the given
    /// location. Setting this option overrides the path that may be specified with the --config option.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path) The dataset to reconcile. Setting this option overrides the file that may be
    /// specified with the --config option.
    #[clap(short, long, value_parser)]
    pub input: Option<String>,

    /// (csv, json or xlsx) The type of the input. If not specified, it is inferred from the extension
    /// of the input file.
    #[clap(long, value_parser)]
    pub input_type: Option<String>,

    /// (missing=existing, repeatable) Maps a missing required column to an existing column of the input.
    #[clap(short, long, value_parser)]
    pub mapping: Vec<String>,

    /// When using an Excel file with several worksheets, indicates the name of the worksheet to use.
    #[clap(long, value_parser)]
    pub excel_worksheet_name: Option<String>,

    /// The identifier of this upload in the consolidation payload. Defaults to the name of the input file.
    #[clap(long, value_parser)]
    pub upload_id: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
