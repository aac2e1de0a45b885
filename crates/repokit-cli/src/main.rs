use std::sync::Arc;

use clap::Parser;
use cli::{Args, Commands};
use logging::setup_logging;
use nu_ansi_term::Color::{Cyan, Green, Red};
use progress::{spawn_event_handler, ProgressGuard};
use repokit_config::config::{default_config_path, Config, CACHE_ENV, CONFIG_ENV};
use repokit_core::{
    arch::{base_arch, canonical_arch},
    emulator::find_static_emulator,
    error::FetchError,
    RepokitResult, ResolveSession,
};
use repokit_events::{ChannelSink, EventSinkHandle, NullSink};
use repokit_registry::PrimaryFormat;
use repokit_utils::{
    fs::{copy_into, ensure_dir_exists},
    lock::FileLock,
};
use tracing::{debug, error, info, warn};
use utils::{progress_enabled, set_flag, Colored, COLOR, PROGRESS};

mod cli;
mod logging;
mod progress;
mod utils;

const LOCK_FILE: &str = ".repokit.lock";

fn create_events() -> (EventSinkHandle, Option<ProgressGuard>) {
    if progress_enabled() {
        let (sink, receiver) = ChannelSink::new();
        (Arc::new(sink), Some(spawn_event_handler(receiver)))
    } else {
        (Arc::new(NullSink), None)
    }
}

fn run_session(
    config: &Config,
    arch: Option<String>,
    command: Commands,
    events: EventSinkHandle,
) -> RepokitResult<()> {
    let session = ResolveSession::open(config, events)?.target_arch(arch);
    debug!(arch = session.arch(), "session ready");

    match command {
        Commands::Sync => {
            for index in session.indexes() {
                let meta = index.metadata();
                let format = match meta.primary_format {
                    PrimaryFormat::IndexDocument => "xml",
                    PrimaryFormat::Relational => "sqlite",
                };
                info!(
                    "{} {} ({format})",
                    Colored(Cyan, meta.repo_name()),
                    meta.primary_path.display()
                );
                if let Some(patterns) = &meta.patterns_path {
                    info!("  patterns: {}", patterns.display());
                }
                if let Some(comps) = &meta.comps_path {
                    info!("  comps: {}", comps.display());
                }
            }
        }
        Commands::Fetch {
            packages,
            output,
        } => {
            if let Some(output) = &output {
                ensure_dir_exists(output)?;
            }

            let mut first_error: Option<FetchError> = None;
            for (name, result) in session.resolve_many(&packages) {
                match result {
                    Ok(path) => {
                        let path = match &output {
                            Some(dir) => copy_into(&path, dir)?,
                            None => path,
                        };
                        info!("{} {}", Colored(Green, &name), path.display());
                    }
                    Err(err) => {
                        error!("{} {err}", Colored(Red, &name));
                        first_error.get_or_insert(err);
                    }
                }
            }
            if let Some(err) = first_error {
                return Err(err.into());
            }
        }
        Commands::Sources {
            packages,
            output,
        } => {
            let copied = session.collect_sources(&packages, &output)?;
            for name in &copied {
                info!("{name}");
            }
            info!("{} source packages in {}", copied.len(), output.display());
        }
        Commands::Arches => {
            info!("{}", session.supported_arches()?.join(" "));
        }
        Commands::Group {
            name,
        } => {
            let packages = session.group_packages(&name)?;
            if packages.is_empty() {
                warn!("Group {name} not found");
            }
            for package in packages {
                info!("{package}");
            }
        }
        Commands::RpmVersion => {
            match session.rpm_version_in_repos()? {
                Some(version) => info!("{version}"),
                None => warn!("rpm not found in the first repository"),
            }
        }
        Commands::HostArch | Commands::Emulator { .. } | Commands::Config | Commands::Env => {}
    }

    Ok(())
}

fn handle_cli() -> RepokitResult<()> {
    let args = Args::parse();

    setup_logging(&args);

    if args.no_color {
        set_flag(&COLOR, false);
    }
    if args.no_progress || args.json {
        set_flag(&PROGRESS, false);
    }

    let config = Config::load(args.config.as_deref())?;
    let Args {
        command,
        arch,
        config: config_path,
        ..
    } = args;

    match command {
        Commands::Config => {
            info!("{}", config.to_toml()?);
        }
        Commands::Env => {
            let config_path = config_path.unwrap_or_else(default_config_path);
            info!("{CONFIG_ENV}={}", config_path.display());
            info!("{CACHE_ENV}={}", config.get_cache_path()?.display());
        }
        Commands::HostArch => {
            info!("canonical: {}", canonical_arch());
            info!("base: {}", base_arch());
        }
        Commands::Emulator {
            arch,
            bin_dir,
        } => {
            let emulator = find_static_emulator(&arch, &bin_dir)?;
            info!("{}", emulator.display());
        }
        command => {
            let cache = config.get_cache_path()?;
            ensure_dir_exists(&cache)?;
            let lock = FileLock::try_acquire(cache.join(LOCK_FILE))?;

            let (events, progress_guard) = create_events();
            let result = run_session(&config, arch, command, events);

            // The session owned every event sender, so the handler thread
            // drains and exits here.
            if let Some(guard) = progress_guard {
                guard.finish();
            }
            progress::stop();
            lock.release()?;
            result?;
        }
    }

    Ok(())
}

fn main() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .ok();

    if let Err(err) = handle_cli() {
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(1);
    }
}
