//! CLI argument definitions and command dispatch.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::mapping::Mode;

/// deckbridge - Local control plane bridging remote devices to plugin actions.
///
/// Robot Mode: Use --robot or --json for machine-parseable output optimized for AI agents.
#[derive(Parser, Debug)]
#[command(name = "deckbridge", version, about, long_about = None)]
#[command(propagate_version = true)]
#[allow(clippy::struct_excessive_bools)] // CLI flags naturally use multiple bools
pub struct Cli {
    /// Output format (text for humans, json for agents/scripts)
    #[arg(
        long,
        short = 'f',
        default_value = "text",
        global = true,
        env = "DECKBRIDGE_FORMAT"
    )]
    pub format: OutputFormat,

    /// Robot mode: equivalent to --format=json (optimized for AI agents)
    #[arg(long, global = true)]
    pub robot: bool,

    /// Verbose output (-v debug, -vv trace)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-essential output)
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Override the mappings directory
    #[arg(long, global = true, env = "DECKBRIDGE_MAPPINGS_DIR")]
    pub mappings_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Output format selection.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text with optional color
    #[default]
    Text,
    /// JSON output for scripts and agents
    Json,
    /// Compact JSON (single line)
    JsonCompact,
}

impl Cli {
    /// Returns true if output should be JSON (robot mode or explicit --format=json).
    pub const fn use_json(&self) -> bool {
        self.robot || matches!(self.format, OutputFormat::Json | OutputFormat::JsonCompact)
    }

    /// Returns true if output should be compact JSON.
    pub const fn use_compact_json(&self) -> bool {
        matches!(self.format, OutputFormat::JsonCompact)
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    // === Server ===
    /// Start the WebSocket server for device connections
    Serve(ServeArgs),

    // === Mapping Inspection ===
    /// List registered keys
    Keys(KeysArgs),

    /// List registered actions
    Actions(ActionsArgs),

    /// Set an action's icon
    SetIcon(SetIconArgs),

    /// Show the active profile's bindings
    Show(ShowArgs),

    // === Bindings ===
    /// Bind a key and mode to an action
    Bind(BindArgs),

    /// Remove a binding
    Unbind(UnbindArgs),

    // === Profiles ===
    /// Manage mapping profiles
    #[command(subcommand)]
    Profiles(ProfilesCommand),

    // === Sources ===
    /// Enable or disable everything a plugin source contributed
    #[command(subcommand)]
    Source(SourceCommand),

    // === Configuration ===
    /// Initialize the configuration directory
    Init(InitArgs),

    /// Show current configuration
    Config(ConfigArgs),

    // === Utilities ===
    /// Show version and build information
    Version,

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// === Argument Structs ===

#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Port to listen on (overrides settings)
    #[arg(long, short = 'p')]
    pub port: Option<u16>,

    /// Bind address (overrides settings)
    #[arg(long)]
    pub bind: Option<String>,
}

#[derive(Parser, Debug)]
pub struct KeysArgs {
    /// Show extended key information
    #[arg(long, short = 'l')]
    pub long: bool,

    /// Only keys from this source
    #[arg(long)]
    pub source: Option<String>,
}

#[derive(Parser, Debug)]
pub struct ActionsArgs {
    /// Show extended action information
    #[arg(long, short = 'l')]
    pub long: bool,

    /// Only actions from this source
    #[arg(long)]
    pub source: Option<String>,
}

#[derive(Parser, Debug)]
pub struct SetIconArgs {
    /// Action id
    pub action: String,

    /// Icon identifier
    pub icon: String,
}

#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// Profile to show instead of the active one
    #[arg(long)]
    pub profile: Option<String>,
}

#[derive(Parser, Debug)]
pub struct BindArgs {
    /// Key id (e.g. "Digit1")
    pub key: String,

    /// Interaction mode
    #[arg(value_enum)]
    pub mode: ModeArg,

    /// Action id to bind
    pub action: String,

    /// Target profile (the default profile if omitted)
    #[arg(long)]
    pub profile: Option<String>,
}

#[derive(Parser, Debug)]
pub struct UnbindArgs {
    /// Key id
    pub key: String,

    /// Interaction mode (all of the key's bindings if omitted)
    #[arg(value_enum)]
    pub mode: Option<ModeArg>,

    /// Target profile (the default profile if omitted)
    #[arg(long)]
    pub profile: Option<String>,
}

/// [`Mode`] as a clap value enum.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Press,
    LongPress,
    Release,
    ScrollUp,
    ScrollDown,
    SwipeLeft,
    SwipeRight,
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Press => Self::Press,
            ModeArg::LongPress => Self::LongPress,
            ModeArg::Release => Self::Release,
            ModeArg::ScrollUp => Self::ScrollUp,
            ModeArg::ScrollDown => Self::ScrollDown,
            ModeArg::SwipeLeft => Self::SwipeLeft,
            ModeArg::SwipeRight => Self::SwipeRight,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum ProfilesCommand {
    /// List profiles, marking the active one
    List,

    /// Create a profile as a copy of another (default if omitted)
    Create(ProfileCreateArgs),

    /// Remove a profile (the default profile is protected)
    Remove(ProfileNameArgs),

    /// Switch the active profile
    Select(ProfileNameArgs),

    /// Export a profile to a file
    Export(ProfileExportArgs),

    /// Import a profile from a file under a new name
    Import(ProfileImportArgs),
}

#[derive(Parser, Debug)]
pub struct ProfileCreateArgs {
    /// New profile name
    pub name: String,

    /// Profile to copy bindings from
    #[arg(long)]
    pub base: Option<String>,
}

#[derive(Parser, Debug)]
pub struct ProfileNameArgs {
    pub name: String,
}

#[derive(Parser, Debug)]
pub struct ProfileExportArgs {
    pub name: String,

    /// Destination file
    pub path: PathBuf,
}

#[derive(Parser, Debug)]
pub struct ProfileImportArgs {
    /// Source file
    pub path: PathBuf,

    /// Name for the imported profile
    pub name: String,
}

#[derive(Subcommand, Debug)]
pub enum SourceCommand {
    /// Re-enable keys, actions, and bindings from a source
    Enable(SourceArgs),

    /// Disable keys, actions, and bindings from a source
    Disable(SourceArgs),
}

#[derive(Parser, Debug)]
pub struct SourceArgs {
    /// Source (plugin) id
    pub id: String,
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Force overwrite existing configuration
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Show configuration file path
    #[arg(long)]
    pub path: bool,
}

#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
