//! Config subcommand handlers.

use serde::Serialize;
use tabled::Tabled;

use adcadence_config::{Config, Profile};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::config;
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct ResolvedProfile {
    profile: String,
    path: String,
    settings: Profile,
}

#[derive(Serialize, Tabled)]
struct ProfileRow {
    #[tabled(rename = "Profile")]
    name: String,
    #[tabled(rename = "Default")]
    default: String,
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init { force } => {
            let path = config::config_file(global);
            if path.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }
            adcadence_config::save_config_to(&Config::starter(), &path)?;
            tracing::info!(path = %path.display(), "wrote starter config");
            if !global.quiet {
                eprintln!("Config written to {}", path.display());
            }
            Ok(())
        }

        ConfigCommand::Show => {
            let (name, resolved) = config::resolve(global)?;
            let view = ResolvedProfile {
                profile: name,
                path: config::config_file(global).display().to_string(),
                settings: Profile::from_orchestrator(&resolved),
            };
            let rendered = match output::render_structured(global.output, &view)? {
                Some(rendered) => rendered,
                None => format!(
                    "# profile: {}\n# file: {}\n{}",
                    view.profile,
                    view.path,
                    toml::to_string_pretty(&view.settings)?
                ),
            };
            output::print_output(&rendered, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&config::config_file(global).display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = config::load(global)?;
            let active = config::active_profile_name(global, &cfg);
            let mut rows: Vec<ProfileRow> = cfg
                .profiles
                .keys()
                .map(|name| ProfileRow {
                    default: if *name == active { "*".into() } else { String::new() },
                    name: name.clone(),
                })
                .collect();
            rows.sort_by(|a, b| a.name.cmp(&b.name));

            let rendered = match global.output {
                OutputFormat::Table => output::render_table(&rows),
                OutputFormat::Plain => rows
                    .iter()
                    .map(|r| r.name.as_str())
                    .collect::<Vec<_>>()
                    .join("\n"),
                format => output::render_structured(format, &rows)?.unwrap_or_default(),
            };
            output::print_output(&rendered, global.quiet);
            Ok(())
        }
    }
}
