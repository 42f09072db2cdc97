use clap::Parser;
use stackpilot_core::config::StackpilotConfig;
use stackpilot_cron::{CronEngine, CronError, JobUpdate};
use tracing::debug;

mod cli;
mod output;

use cli::{Cli, Commands, CronCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "stackpilot=debug,stackpilot_cron=debug,stackpilot_terminal=debug"
    } else {
        "stackpilot=info,stackpilot_cron=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let json = match &cli.command {
        Commands::Cron { command } => command.wants_json(),
    };

    // explicit --config > STACKPILOT_CONFIG > /etc/stackpilot/stackpilot.toml
    let config = match StackpilotConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) if json => {
            println!("{}", output::json_error(e.code(), &e.to_string()));
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };
    debug!(metadata_dir = %config.cron.metadata_dir, "config loaded");

    match cli.command {
        Commands::Cron { command } => {
            let engine = CronEngine::from_config(&config);
            match run_cron(&engine, command).await {
                Ok(0) => Ok(()),
                Ok(code) => std::process::exit(code),
                Err(e) if json => {
                    if let Some(cron) = e.downcast_ref::<CronError>() {
                        println!("{}", output::json_error(cron.code(), &cron.to_string()));
                        std::process::exit(1);
                    }
                    Err(e)
                }
                Err(e) => Err(e),
            }
        }
    }
}

/// Execute one cron subcommand; the return value is the process exit code.
async fn run_cron(engine: &CronEngine, command: CronCommand) -> anyhow::Result<i32> {
    match command {
        CronCommand::Add {
            schedule,
            command,
            description,
        } => {
            let job = engine.add_job(&schedule, &command.join(" "), &description)?;
            println!("Created job {} ({} {})", job.id, job.schedule, job.command);
        }
        CronCommand::List { managed, json } => {
            let jobs = engine.list_jobs(managed)?;
            if json {
                println!("{}", output::json(&jobs)?);
            } else {
                print!("{}", output::job_table(&jobs));
            }
        }
        CronCommand::Show { id, json } => {
            let job = engine.get_job(id)?;
            if json {
                println!("{}", output::json(&job)?);
            } else {
                print!("{}", output::job_detail(&job));
            }
        }
        CronCommand::Edit {
            id,
            schedule,
            command,
            description,
        } => {
            let update = JobUpdate {
                schedule,
                command,
                description,
            };
            if update.is_empty() {
                anyhow::bail!("nothing to change: pass --schedule, --command or --description");
            }
            let job = engine.update_job(id, update)?;
            println!("Updated job {} ({} {})", job.id, job.schedule, job.command);
        }
        CronCommand::Delete { id } => {
            engine.delete_job(id)?;
            println!("Deleted job {id}");
        }
        CronCommand::Run { id } => {
            let report = engine.run_job(id).await?;
            if !report.output.is_empty() {
                print!("{}", report.output);
                if !report.output.ends_with('\n') {
                    println!();
                }
            }
            eprintln!("Job {id} {} in {} ms", report.outcome, report.duration_ms);
            return Ok(report.outcome.exit_status());
        }
        CronCommand::Enable { id } => {
            engine.enable_job(id)?;
            println!("Enabled job {id}");
        }
        CronCommand::Disable { id } => {
            engine.disable_job(id)?;
            println!("Disabled job {id}");
        }
        CronCommand::Status { json } => {
            let status = engine.status()?;
            if json {
                println!("{}", output::json(&status)?);
            } else {
                print!("{}", output::status_summary(&status));
            }
        }
        CronCommand::Logs { lines, grep } => {
            for line in engine.logs(lines, grep.as_deref())? {
                println!("{line}");
            }
        }
        CronCommand::Register {
            source,
            schedule,
            command,
            description,
        } => {
            let job = engine.register_job(source, &schedule, &command.join(" "), &description)?;
            println!("Registered job {} ({})", job.id, job.source);
        }
        CronCommand::Sync { json } => {
            let report = engine.reconcile()?;
            if json {
                println!("{}", output::json(&report)?);
            } else {
                print!("{}", output::sync_summary(&report));
            }
        }
    }
    Ok(0)
}
