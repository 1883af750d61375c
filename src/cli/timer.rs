use std::{io::Write, time::Duration};

use ansi_term::{Colour, Style};
use anyhow::Result;
use clap::CommandFactory;
use tokio_util::sync::CancellationToken;

use crate::{
    model::entities::EntityId,
    storage::ProjectRepository,
    timer::{
        manual::{create_manual_entry, validate_manual_entry, ManualEntry},
        RunningTimer, RunningUpdate, StartTimer, TimerMachine, TimerState,
    },
    utils::{shutdown::detect_shutdown, time::format_duration},
};

use super::{AppContext, Args};

#[derive(Debug, clap::Args)]
pub(crate) struct StartCommand {
    #[arg(help = "What is being worked on", default_value = "")]
    description: String,
    #[arg(short, long, help = "Project id. Falls back to the default_project_id setting")]
    project: Option<EntityId>,
    #[arg(short, long = "tag", help = "Tag id, may be repeated")]
    tags: Vec<EntityId>,
    #[arg(
        short,
        long,
        help = "Whether the entry is billable. Falls back to the default_billable setting"
    )]
    billable: Option<bool>,
}

#[derive(Debug, clap::Args)]
pub(crate) struct EditCommand {
    #[arg(short, long, help = "New description")]
    description: Option<String>,
    #[arg(short, long, help = "New project id", conflicts_with = "no_project")]
    project: Option<EntityId>,
    #[arg(long, help = "Detach the entry from its project")]
    no_project: bool,
    #[arg(
        short,
        long = "tag",
        help = "Tag id, may be repeated. Replaces the tags of the entry"
    )]
    tags: Vec<EntityId>,
    #[arg(long, help = "Remove every tag", conflicts_with = "tags")]
    clear_tags: bool,
}

#[derive(Debug, clap::Args)]
pub(crate) struct AddCommand {
    #[arg(help = "Start in the form 2024-01-08T09:00:00")]
    start: String,
    #[arg(help = "End in the form 2024-01-08T10:30:00")]
    end: String,
    #[arg(short, long, default_value = "")]
    description: String,
    #[arg(short, long, help = "Project id. Falls back to the default_project_id setting")]
    project: Option<EntityId>,
    #[arg(short, long = "tag", help = "Tag id, may be repeated")]
    tags: Vec<EntityId>,
    #[arg(short, long, help = "Falls back to the default_billable setting")]
    billable: Option<bool>,
}

async fn resumed_timer(context: &AppContext) -> Result<TimerMachine> {
    let mut timer = context.timer();
    timer.resume().await?;
    Ok(timer)
}

fn describe(running: &RunningTimer) -> String {
    if running.description.is_empty() {
        format!("#{}", running.entry_id)
    } else {
        format!("#{} {}", running.entry_id, running.description)
    }
}

pub(crate) async fn process_start_command(
    context: &AppContext,
    StartCommand {
        description,
        project,
        tags,
        billable,
    }: StartCommand,
) -> Result<()> {
    let settings = context.settings();
    let project_id = match project {
        Some(id) => Some(id),
        None => settings.default_project_id().await?,
    };
    let billable = match billable {
        Some(billable) => billable,
        None => settings.default_billable().await?,
    };

    let mut timer = context.timer();
    let running = timer
        .start(StartTimer {
            description,
            project_id,
            tag_ids: tags,
            billable,
        })
        .await?;
    println!(
        "{} {} at {}",
        Colour::Green.paint("Started"),
        describe(&running),
        running.started_at.format("%H:%M:%S")
    );
    Ok(())
}

pub(crate) async fn process_stop_command(context: &AppContext) -> Result<()> {
    let mut timer = resumed_timer(context).await?;
    match timer.stop().await? {
        Some(entry) => println!(
            "{} #{} after {}",
            Colour::Red.paint("Stopped"),
            entry.id,
            format_duration(entry.tracked_seconds() as f64)
        ),
        None => println!("No timer is running"),
    }
    Ok(())
}

pub(crate) async fn process_status_command(context: &AppContext, watch: bool) -> Result<()> {
    let mut timer = context.timer().with_live_ticks();
    let TimerState::Running(running) = timer.resume().await?.clone() else {
        println!("No timer is running");
        return Ok(());
    };

    let project = match running.project_id {
        Some(id) => context.store.project(id).await?.map(|p| p.name),
        None => None,
    };
    println!(
        "{} {}{}",
        Colour::Green.paint("Running"),
        describe(&running),
        project.map(|p| format!(" ({p})")).unwrap_or_default()
    );
    if !watch {
        println!(
            "{}",
            Style::new()
                .bold()
                .paint(format_duration(timer.elapsed_seconds() as f64))
        );
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    tokio::spawn(detect_shutdown(shutdown.clone()));
    let mut interval = tokio::time::interval(Duration::from_millis(250));
    let mut stdout = std::io::stdout();
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let elapsed = format_duration(timer.elapsed_seconds() as f64);
                write!(stdout, "\r{}", Style::new().bold().paint(elapsed))?;
                stdout.flush()?;
            }
        }
    }
    println!();
    Ok(())
}

pub(crate) async fn process_edit_command(
    context: &AppContext,
    EditCommand {
        description,
        project,
        no_project,
        tags,
        clear_tags,
    }: EditCommand,
) -> Result<()> {
    let update = RunningUpdate {
        description,
        project_id: if no_project { Some(None) } else { project.map(Some) },
        tag_ids: if clear_tags {
            Some(vec![])
        } else if tags.is_empty() {
            None
        } else {
            Some(tags)
        },
    };

    let mut timer = resumed_timer(context).await?;
    match timer.update_running(update).await? {
        Some(running) => println!("Updated {}", describe(running)),
        None => println!("No timer is running"),
    }
    Ok(())
}

pub(crate) async fn process_add_command(
    context: &AppContext,
    AddCommand {
        start,
        end,
        description,
        project,
        tags,
        billable,
    }: AddCommand,
) -> Result<()> {
    let (start, stop) = match validate_manual_entry(&start, &end) {
        Ok(v) => v,
        Err(e) => {
            return Err(Args::command()
                .error(clap::error::ErrorKind::ValueValidation, e.to_string())
                .into());
        }
    };

    let settings = context.settings();
    let project_id = match project {
        Some(id) => Some(id),
        None => settings.default_project_id().await?,
    };
    let billable = match billable {
        Some(billable) => billable,
        None => settings.default_billable().await?,
    };

    let entry = create_manual_entry(
        context.store.as_ref(),
        ManualEntry {
            description,
            project_id,
            start,
            stop,
            billable,
            tag_ids: tags,
        },
    )
    .await?;
    println!(
        "Added #{} lasting {}",
        entry.id,
        format_duration(entry.tracked_seconds() as f64)
    );
    Ok(())
}
