//! deckbridge - Local control plane bridging remote devices to plugin actions.
//!
//! Provides both human-friendly and agent-friendly (robot mode) interfaces.
#![forbid(unsafe_code)]

use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};

use clap::Parser;
use console::style;
use serde::Serialize;
use tracing::info;

use deckbridge::cli::{self, Cli, Commands, ProfilesCommand, SourceCommand};
use deckbridge::coordinator::Coordinator;
use deckbridge::dispatch::ChannelDispatcher;
use deckbridge::error::{BridgeError, Result};
use deckbridge::mapping::{self, MappingState, Mode, DEFAULT_PROFILE};
use deckbridge::registry::ConnectionRegistry;
use deckbridge::settings::Settings;

/// Build information embedded at compile time.
mod build_info {
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");

    pub fn git_sha() -> &'static str {
        option_env!("VERGEN_GIT_SHA").unwrap_or("unknown")
    }

    pub fn git_dirty() -> &'static str {
        option_env!("VERGEN_GIT_DIRTY").unwrap_or("false")
    }

    pub fn build_timestamp() -> &'static str {
        option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown")
    }

    pub fn rustc_semver() -> &'static str {
        option_env!("VERGEN_RUSTC_SEMVER").unwrap_or("unknown")
    }

    pub fn target() -> &'static str {
        option_env!("VERGEN_CARGO_TARGET_TRIPLE").unwrap_or("unknown")
    }
}

fn main() {
    let cli = Cli::parse();

    // Handle no-color flag or non-TTY
    if cli.no_color || !io::stdout().is_terminal() {
        console::set_colors_enabled(false);
    }

    deckbridge::logging::init_logging(cli.use_json(), cli.verbose, cli.quiet);

    let result = run(&cli);

    if let Err(e) = result {
        output_error(&cli, &e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        None => print_quick_start(cli),
        Some(Commands::Serve(args)) => cmd_serve(cli, args),
        Some(Commands::Keys(args)) => cmd_keys(cli, args),
        Some(Commands::Actions(args)) => cmd_actions(cli, args),
        Some(Commands::SetIcon(args)) => cmd_set_icon(cli, args),
        Some(Commands::Show(args)) => cmd_show(cli, args),
        Some(Commands::Bind(args)) => cmd_bind(cli, args),
        Some(Commands::Unbind(args)) => cmd_unbind(cli, args),
        Some(Commands::Profiles(command)) => cmd_profiles(cli, command),
        Some(Commands::Source(command)) => cmd_source(cli, command),
        Some(Commands::Init(args)) => cmd_init(cli, args),
        Some(Commands::Config(args)) => cmd_config(cli, args),
        Some(Commands::Version) => cmd_version(cli),
        Some(Commands::Completions(args)) => cmd_completions(cli, args),
    }
}

// === Quick Start (Robot Mode Optimized) ===

/// Prints quick-start help optimized for both humans and AI agents.
#[allow(clippy::unnecessary_wraps)] // Consistent return type with other commands
fn print_quick_start(cli: &Cli) -> Result<()> {
    if cli.use_json() {
        print_robot_quick_start();
    } else {
        print_human_quick_start();
    }
    Ok(())
}

fn print_robot_quick_start() {
    let help = RobotQuickStart {
        tool: "deckbridge",
        version: build_info::VERSION,
        description: "Local control plane bridging remote devices to plugin actions",
        server: RobotServer {
            start: "deckbridge serve --port 8891",
            protocol: "JSON text frames over ws://<host>:<port>/ws",
        },
        inspection: RobotInspection {
            list_keys: "deckbridge keys --robot",
            list_actions: "deckbridge actions --robot",
            show_bindings: "deckbridge show --robot",
        },
        bindings: RobotBindings {
            bind: "deckbridge bind <KEY> <MODE> <ACTION>",
            unbind: "deckbridge unbind <KEY> <MODE>",
            modes: "press, long-press, release, scroll-up, scroll-down, swipe-left, swipe-right",
        },
        profiles: RobotProfiles {
            list: "deckbridge profiles list",
            create: "deckbridge profiles create <NAME> [--base <PROFILE>]",
            select: "deckbridge profiles select <NAME>",
            export: "deckbridge profiles export <NAME> <FILE>",
            import: "deckbridge profiles import <FILE> <NAME>",
        },
        output_modes: OutputModes {
            human: "--format=text (default)",
            robot: "--robot or --format=json",
            compact: "--format=json-compact",
        },
    };

    println!("{}", serde_json::to_string_pretty(&help).unwrap());
}

fn print_human_quick_start() {
    println!(
        "{} {} - device-to-plugin control plane\n",
        style("deckbridge").bold().cyan(),
        build_info::VERSION
    );

    println!("{}", style("QUICK START").bold().underlined());
    println!();

    println!("  {}  Start the device server", style("deckbridge serve").green());
    println!("  {}  List registered keys", style("deckbridge keys").green());
    println!("  {}  List registered actions", style("deckbridge actions").green());
    println!("  {}  Show active bindings", style("deckbridge show").green());
    println!(
        "  {}  Bind a key",
        style("deckbridge bind Digit1 press play_pause").green()
    );
    println!("  {}  List profiles", style("deckbridge profiles list").green());
    println!();

    println!("{}", style("ROBOT MODE (for AI agents)").bold().underlined());
    println!();
    println!("  {}  JSON output", style("deckbridge --robot <command>").cyan());
    println!("  {}  Quick-start JSON", style("deckbridge --robot").cyan());
    println!();

    println!(
        "Run {} for full help",
        style("deckbridge --help").yellow()
    );
}

// === Robot Mode JSON Structures ===

#[derive(Serialize)]
struct RobotQuickStart {
    tool: &'static str,
    version: &'static str,
    description: &'static str,
    server: RobotServer,
    inspection: RobotInspection,
    bindings: RobotBindings,
    profiles: RobotProfiles,
    output_modes: OutputModes,
}

#[derive(Serialize)]
struct RobotServer {
    start: &'static str,
    protocol: &'static str,
}

#[derive(Serialize)]
struct RobotInspection {
    list_keys: &'static str,
    list_actions: &'static str,
    show_bindings: &'static str,
}

#[derive(Serialize)]
struct RobotBindings {
    bind: &'static str,
    unbind: &'static str,
    modes: &'static str,
}

#[derive(Serialize)]
struct RobotProfiles {
    list: &'static str,
    create: &'static str,
    select: &'static str,
    export: &'static str,
    import: &'static str,
}

#[derive(Serialize)]
struct OutputModes {
    human: &'static str,
    robot: &'static str,
    compact: &'static str,
}

// === Store Access ===

fn mappings_dir(cli: &Cli) -> Result<PathBuf> {
    match &cli.mappings_dir {
        Some(dir) => Ok(dir.clone()),
        None => Settings::load()?.mappings_dir(),
    }
}

fn open_store(cli: &Cli) -> Result<(PathBuf, MappingState)> {
    let dir = mappings_dir(cli)?;
    let state = MappingState::new(mapping::load_mappings(&dir));
    Ok((dir, state))
}

fn persist(dir: &Path, state: &MappingState) {
    mapping::save_mappings(dir, state.mapping());
}

// === Command Implementations ===

fn cmd_serve(cli: &Cli, args: &cli::ServeArgs) -> Result<()> {
    let mut settings = Settings::load()?;
    if let Some(port) = args.port {
        settings.listen_port = port;
    }
    if let Some(bind) = &args.bind {
        settings.listen_addr = bind.clone();
    }
    let addr = settings.socket_addr()?;
    let dir = match &cli.mappings_dir {
        Some(dir) => dir.clone(),
        None => settings.mappings_dir()?,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async move {
        // Eager load: the structure is in memory before the first
        // connection is accepted.
        let structure = mapping::load_mappings(&dir);
        let (persist_tx, _writer) = mapping::spawn_persistence_writer(dir);
        let state = MappingState::new(structure).with_persistence(persist_tx);

        let (dispatcher, mut deliveries) = ChannelDispatcher::new();
        tokio::spawn(async move {
            while let Some((source, payload)) = deliveries.recv().await {
                info!(source = %source, action = %payload.action.id, "action delivered");
            }
        });

        let (registry, events) = ConnectionRegistry::start(addr).await?;

        if !cli.quiet && !cli.use_json() {
            println!(
                "Listening on {} (Ctrl+C to stop)",
                style(format!("ws://{addr}/ws")).green()
            );
        }

        let stopper = registry.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            stopper.stop();
        });

        Coordinator::new(state, registry, dispatcher).run(events).await;
        Ok(())
    })
}

fn cmd_keys(cli: &Cli, args: &cli::KeysArgs) -> Result<()> {
    let (_, state) = open_store(cli)?;
    let keys: Vec<_> = state
        .mapping()
        .keys
        .iter()
        .filter(|k| args.source.as_deref().is_none_or(|s| k.source == s))
        .collect();

    if cli.use_json() {
        output_json(cli, &keys);
    } else {
        for key in keys {
            if args.long {
                println!(
                    "{}: source={} version={} enabled={} modes={}",
                    style(&key.id).green(),
                    key.source,
                    key.version,
                    key.enabled,
                    key.modes
                        .iter()
                        .map(|m| m.as_str())
                        .collect::<Vec<_>>()
                        .join(",")
                );
            } else {
                println!("{}", key.id);
            }
        }
    }
    Ok(())
}

fn cmd_actions(cli: &Cli, args: &cli::ActionsArgs) -> Result<()> {
    let (_, state) = open_store(cli)?;
    let actions: Vec<_> = state
        .mapping()
        .actions
        .iter()
        .filter(|a| args.source.as_deref().is_none_or(|s| a.source == s))
        .collect();

    if cli.use_json() {
        output_json(cli, &actions);
    } else {
        for action in actions {
            if args.long {
                println!(
                    "{}: source={} version={} enabled={}{}",
                    style(&action.id).green(),
                    action.source,
                    action.version,
                    action.enabled,
                    action
                        .name
                        .as_deref()
                        .map(|n| format!(" ({n})"))
                        .unwrap_or_default()
                );
            } else {
                println!("{}", action.id);
            }
        }
    }
    Ok(())
}

fn cmd_set_icon(cli: &Cli, args: &cli::SetIconArgs) -> Result<()> {
    let (dir, mut state) = open_store(cli)?;
    state.update_icon(&args.action, &args.icon)?;
    persist(&dir, &state);

    if cli.use_json() {
        output_json(
            cli,
            &serde_json::json!({ "action": args.action, "icon": args.icon, "ok": true }),
        );
    } else if !cli.quiet {
        println!("Set icon for {} to {}", args.action, args.icon);
    }
    Ok(())
}

fn cmd_show(cli: &Cli, args: &cli::ShowArgs) -> Result<()> {
    let (_, state) = open_store(cli)?;
    let profile = match &args.profile {
        Some(name) => state
            .get_profile(name)
            .ok_or_else(|| BridgeError::NotFound {
                kind: "profile",
                id: name.clone(),
            })?,
        None => state.current_profile(),
    };

    if cli.use_json() {
        output_json(cli, profile);
    } else {
        println!(
            "{} ({} keys bound)",
            style(&profile.name).bold(),
            profile.mapping.len()
        );
        let mut keys: Vec<_> = profile.mapping.iter().collect();
        keys.sort_by_key(|(id, _)| id.as_str());
        for (key_id, bindings) in keys {
            let mut modes: Vec<_> = bindings.iter().collect();
            modes.sort_by_key(|(mode, _)| mode.as_str());
            for (mode, reference) in modes {
                println!(
                    "  {} {} -> {}{}",
                    style(key_id).green(),
                    mode.as_str(),
                    reference.id,
                    if reference.enabled { "" } else { " (disabled)" }
                );
            }
        }
    }
    Ok(())
}

fn cmd_bind(cli: &Cli, args: &cli::BindArgs) -> Result<()> {
    let (dir, mut state) = open_store(cli)?;
    let action = state
        .get_action(&args.action)
        .ok_or_else(|| BridgeError::NotFound {
            kind: "action",
            id: args.action.clone(),
        })?;
    let reference = mapping::ActionReference::from(action);
    let mode = Mode::from(args.mode);
    state.add_button(args.profile.as_deref(), &args.key, mode, reference)?;
    persist(&dir, &state);

    if cli.use_json() {
        output_json(
            cli,
            &serde_json::json!({
                "key": args.key,
                "mode": mode.as_str(),
                "action": args.action,
                "ok": true
            }),
        );
    } else if !cli.quiet {
        println!("Bound {} {} to {}", args.key, mode.as_str(), args.action);
    }
    Ok(())
}

fn cmd_unbind(cli: &Cli, args: &cli::UnbindArgs) -> Result<()> {
    let (dir, mut state) = open_store(cli)?;
    let mode = args.mode.map(Mode::from);
    state.remove_button(args.profile.as_deref(), &args.key, mode)?;
    persist(&dir, &state);

    let mode_label = mode.map_or("all", Mode::as_str);
    if cli.use_json() {
        output_json(
            cli,
            &serde_json::json!({ "key": args.key, "mode": mode_label, "ok": true }),
        );
    } else if !cli.quiet {
        println!("Unbound {} {}", args.key, mode_label);
    }
    Ok(())
}

fn cmd_profiles(cli: &Cli, command: &ProfilesCommand) -> Result<()> {
    match command {
        ProfilesCommand::List => {
            let (_, state) = open_store(cli)?;
            let active = state.current_profile_name().to_string();
            if cli.use_json() {
                let profiles: Vec<_> = state
                    .mapping()
                    .profiles
                    .values()
                    .map(|p| {
                        serde_json::json!({
                            "id": p.id,
                            "name": p.name,
                            "active": p.name == active,
                            "keys_bound": p.mapping.len(),
                        })
                    })
                    .collect();
                output_json(cli, &profiles);
            } else {
                let mut names: Vec<_> = state.mapping().profiles.keys().collect();
                names.sort();
                for name in names {
                    if *name == active {
                        println!("{} {}", style("*").green(), style(name).bold());
                    } else {
                        println!("  {name}");
                    }
                }
            }
            Ok(())
        }
        ProfilesCommand::Create(args) => {
            let (dir, mut state) = open_store(cli)?;
            state.add_profile(&args.name, args.base.as_deref())?;
            persist(&dir, &state);
            if cli.use_json() {
                output_json(cli, &serde_json::json!({ "created": args.name, "ok": true }));
            } else if !cli.quiet {
                println!("Created profile {}", args.name);
            }
            Ok(())
        }
        ProfilesCommand::Remove(args) => {
            let (dir, mut state) = open_store(cli)?;
            state.remove_profile(&args.name)?;
            persist(&dir, &state);
            if cli.use_json() {
                output_json(cli, &serde_json::json!({ "removed": args.name, "ok": true }));
            } else if !cli.quiet {
                println!("Removed profile {}", args.name);
            }
            Ok(())
        }
        ProfilesCommand::Select(args) => {
            let (dir, mut state) = open_store(cli)?;
            let name = if args.name == DEFAULT_PROFILE {
                None
            } else {
                Some(args.name.as_str())
            };
            state.set_current_profile(name)?;
            persist(&dir, &state);
            if cli.use_json() {
                output_json(cli, &serde_json::json!({ "selected": args.name, "ok": true }));
            } else if !cli.quiet {
                println!("Selected profile {}", args.name);
            }
            Ok(())
        }
        ProfilesCommand::Export(args) => {
            let (_, state) = open_store(cli)?;
            state.export_profile(&args.name, &args.path)?;
            if cli.use_json() {
                output_json(
                    cli,
                    &serde_json::json!({
                        "exported": args.name,
                        "path": args.path.display().to_string(),
                        "ok": true
                    }),
                );
            } else if !cli.quiet {
                println!("Exported {} to {}", args.name, args.path.display());
            }
            Ok(())
        }
        ProfilesCommand::Import(args) => {
            let (dir, mut state) = open_store(cli)?;
            state.import_profile(&args.path, &args.name)?;
            persist(&dir, &state);
            if cli.use_json() {
                output_json(cli, &serde_json::json!({ "imported": args.name, "ok": true }));
            } else if !cli.quiet {
                println!("Imported {} from {}", args.name, args.path.display());
            }
            Ok(())
        }
    }
}

fn cmd_source(cli: &Cli, command: &SourceCommand) -> Result<()> {
    let (id, enable) = match command {
        SourceCommand::Enable(args) => (&args.id, true),
        SourceCommand::Disable(args) => (&args.id, false),
    };
    let (dir, mut state) = open_store(cli)?;
    if enable {
        state.add_source(id);
    } else {
        state.remove_source(id);
    }
    persist(&dir, &state);

    if cli.use_json() {
        output_json(cli, &serde_json::json!({ "source": id, "enabled": enable }));
    } else if !cli.quiet {
        println!(
            "Source {} {}",
            id,
            if enable { "enabled" } else { "disabled" }
        );
    }
    Ok(())
}

fn cmd_init(cli: &Cli, args: &cli::InitArgs) -> Result<()> {
    let settings_path = Settings::path()?;
    if settings_path.exists() && !args.force {
        return Err(BridgeError::Validation(format!(
            "{} already exists (use --force to overwrite)",
            settings_path.display()
        )));
    }
    let settings = Settings::default();
    settings.save()?;
    let dir = mappings_dir(cli)?;
    let structure = mapping::default_structure();
    mapping::save_mappings(&dir, &structure);

    if cli.use_json() {
        output_json(
            cli,
            &serde_json::json!({
                "settings": settings_path.display().to_string(),
                "mappings_dir": dir.display().to_string(),
                "ok": true
            }),
        );
    } else if !cli.quiet {
        println!("Wrote {}", settings_path.display());
        println!("Wrote default mappings under {}", dir.display());
    }
    Ok(())
}

fn cmd_config(cli: &Cli, args: &cli::ConfigArgs) -> Result<()> {
    let path = Settings::path()?;
    if args.path {
        println!("{}", path.display());
        return Ok(());
    }
    let settings = Settings::load()?;
    if cli.use_json() {
        output_json(
            cli,
            &serde_json::json!({
                "path": path.display().to_string(),
                "listen_addr": settings.listen_addr,
                "listen_port": settings.listen_port,
                "mappings_dir": mappings_dir(cli)?.display().to_string(),
            }),
        );
    } else {
        println!("{}: {}", style("Settings").bold(), path.display());
        println!(
            "{}: {}:{}",
            style("Listen").bold(),
            settings.listen_addr,
            settings.listen_port
        );
        println!(
            "{}: {}",
            style("Mappings").bold(),
            mappings_dir(cli)?.display()
        );
    }
    Ok(())
}

#[allow(clippy::unnecessary_wraps)] // Consistent return type with other commands
fn cmd_version(cli: &Cli) -> Result<()> {
    if cli.use_json() {
        output_json(
            cli,
            &serde_json::json!({
                "version": build_info::VERSION,
                "git_sha": build_info::git_sha(),
                "git_dirty": build_info::git_dirty() == "true",
                "build_timestamp": build_info::build_timestamp(),
                "rustc_version": build_info::rustc_semver(),
                "target": build_info::target(),
            }),
        );
    } else {
        println!("deckbridge {}", build_info::VERSION);
        println!(
            "git: {}{}",
            build_info::git_sha(),
            if build_info::git_dirty() == "true" {
                " (dirty)"
            } else {
                ""
            }
        );
        println!("built: {}", build_info::build_timestamp());
        println!("rustc: {}", build_info::rustc_semver());
        println!("target: {}", build_info::target());
    }
    Ok(())
}

#[allow(clippy::unnecessary_wraps)] // Consistent return type with other commands
fn cmd_completions(_cli: &Cli, args: &cli::CompletionsArgs) -> Result<()> {
    use clap::CommandFactory;
    clap_complete::generate(
        args.shell,
        &mut Cli::command(),
        "deckbridge",
        &mut io::stdout(),
    );
    Ok(())
}

// === Utility Functions ===

fn output_json<T: Serialize>(cli: &Cli, data: &T) {
    let json = if cli.use_compact_json() {
        serde_json::to_string(data).unwrap()
    } else {
        serde_json::to_string_pretty(data).unwrap()
    };
    println!("{json}");
}

fn output_error(cli: &Cli, error: &BridgeError) {
    if cli.use_json() {
        let json = serde_json::json!({
            "error": true,
            "message": error.to_string(),
            "suggestion": error.suggestion(),
            "recoverable": error.is_user_recoverable(),
        });
        eprintln!("{}", serde_json::to_string_pretty(&json).unwrap());
    } else {
        eprintln!("{}: {}", style("Error").red().bold(), error);
        if let Some(suggestion) = error.suggestion() {
            eprintln!("{}: {}", style("Hint").yellow(), suggestion);
        }
    }
}
