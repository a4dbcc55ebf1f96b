use std::path::PathBuf;

/// Options steering how journal files are read, mirroring the usual
/// command-line flags. Options a reader does not support are ignored.
#[derive(Debug, Clone, Default)]
pub struct InputOpts {
    /// Force a specific reader instead of guessing from the file extension.
    pub format: Option<String>,
    /// Conversion rules file used by table-shaped formats.
    pub rules_file: Option<PathBuf>,
    /// Account aliases applied on top of any declared in the journal.
    pub aliases: Vec<String>,
    /// Obfuscate account names, descriptions and comments after reading.
    pub anonymize: bool,
    /// Keep balance assertions in the data but skip checking them.
    pub ignore_assertions: bool,
    /// Only read transactions not seen in a previous run.
    pub read_new_only: bool,
    /// Remember the latest transactions read, for `read_new_only`.
    pub save_new_state: bool,
    /// Use the named tag's value in place of each posting's account name.
    pub pivot_field: String,
    /// Apply transaction modifier rules to generate postings.
    pub generate_auto_postings: bool,
}
