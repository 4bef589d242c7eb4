mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use commands::diff::DiffOptions;
use chartwalk_emr::RecordKind;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Diagnoses {
            chart,
            range,
            output,
        } => commands::diagnoses::run(&config, &chart, &range, &output),
        Commands::Icu {
            chart,
            stay,
            kind,
            output,
        } => commands::history::run_icu(&config, &chart, &stay, kind, &output),
        Commands::Nursing {
            chart,
            stay,
            admission: false,
            output,
        } => commands::history::run(
            &config,
            &chart,
            &stay,
            RecordKind::NursingEvent,
            &["nursing"],
            &output,
        ),
        Commands::Nursing {
            chart,
            stay,
            admission: true,
            output,
        } => commands::history::run(
            &config,
            &chart,
            &stay,
            RecordKind::NursingAdmission,
            &["nursing", "adm"],
            &output,
        ),
        Commands::Orders {
            chart,
            stay,
            output,
        } => commands::history::run(&config, &chart, &stay, RecordKind::Order, &["orders"], &output),
        Commands::Diff {
            chart,
            range,
            reverse,
            min_segments,
            output,
        } => commands::diff::run(
            &config,
            &chart,
            &range,
            DiffOptions {
                reverse,
                min_segments,
            },
            &output,
        ),
        Commands::Encounters {
            chart,
            range,
            output,
        } => commands::encounters::run(&config, &chart, &range, &output),
    }
}
