use anyhow::{bail, Result};
use clap::Subcommand;

use crate::{
    model::entities::{ClientUpdate, EntityId, NewProject, ProjectUpdate},
    storage::{ClientRepository, ProjectRepository, TagRepository},
    utils::time::format_duration,
};

use super::AppContext;

#[derive(Subcommand, Debug)]
pub(crate) enum ClientCommand {
    Add {
        name: String,
    },
    List {
        #[arg(short, long, help = "Include archived clients")]
        all: bool,
    },
    Rename {
        id: EntityId,
        name: String,
    },
    Archive {
        id: EntityId,
    },
    Unarchive {
        id: EntityId,
    },
    #[command(about = "Delete a client. Its projects stay without a client")]
    Delete {
        id: EntityId,
    },
}

#[derive(Subcommand, Debug)]
pub(crate) enum ProjectCommand {
    Add {
        name: String,
        #[arg(long, help = "Hex color, e.g. #4A90D9")]
        color: Option<String>,
        #[arg(long)]
        client: Option<EntityId>,
        #[arg(long, default_value_t = 0.)]
        rate: f64,
        #[arg(long)]
        billable: bool,
    },
    List {
        #[arg(short, long, help = "Include archived projects")]
        all: bool,
    },
    Update {
        id: EntityId,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        color: Option<String>,
        #[arg(long, conflicts_with = "no_client")]
        client: Option<EntityId>,
        #[arg(long)]
        no_client: bool,
        #[arg(long)]
        rate: Option<f64>,
        #[arg(long)]
        billable: Option<bool>,
    },
    Archive {
        id: EntityId,
    },
    Unarchive {
        id: EntityId,
    },
    #[command(about = "Delete a project. Its entries stay without a project")]
    Delete {
        id: EntityId,
    },
}

#[derive(Subcommand, Debug)]
pub(crate) enum TagCommand {
    Add { name: String },
    List {},
    Rename { id: EntityId, name: String },
    Delete { id: EntityId },
}

#[derive(Subcommand, Debug)]
pub(crate) enum SettingCommand {
    Get { key: String },
    Set { key: String, value: String },
    List {},
    #[command(about = "Remove a stored value so the default applies again")]
    Unset { key: String },
}

fn missing(entity: &str, id: EntityId) -> anyhow::Error {
    anyhow::anyhow!("{entity} {id} does not exist")
}

async fn archive_client(context: &AppContext, id: EntityId, archived: bool) -> Result<()> {
    let update = ClientUpdate {
        archived: Some(archived),
        ..Default::default()
    };
    context
        .store
        .update_client(id, update)
        .await?
        .ok_or_else(|| missing("Client", id))?;
    println!("Client #{id} archived: {archived}");
    Ok(())
}

async fn archive_project(context: &AppContext, id: EntityId, archived: bool) -> Result<()> {
    let update = ProjectUpdate {
        archived: Some(archived),
        ..Default::default()
    };
    context
        .store
        .update_project(id, update)
        .await?
        .ok_or_else(|| missing("Project", id))?;
    println!("Project #{id} archived: {archived}");
    Ok(())
}

pub(crate) async fn process_client_command(
    context: &AppContext,
    command: ClientCommand,
) -> Result<()> {
    let store = &context.store;
    match command {
        ClientCommand::Add { name } => {
            let client = store.create_client(&name).await?;
            println!("Created client #{} {}", client.id, client.name);
        }
        ClientCommand::List { all } => {
            for client in store.clients(all).await? {
                let projects = store.client_project_count(client.id).await?;
                let archived = if client.archived { "\tarchived" } else { "" };
                println!("{}\t{}\t{projects} projects{archived}", client.id, client.name);
            }
        }
        ClientCommand::Rename { id, name } => {
            let update = ClientUpdate {
                name: Some(name),
                ..Default::default()
            };
            let client = store
                .update_client(id, update)
                .await?
                .ok_or_else(|| missing("Client", id))?;
            println!("Renamed client #{id} to {}", client.name);
        }
        ClientCommand::Archive { id } => archive_client(context, id, true).await?,
        ClientCommand::Unarchive { id } => archive_client(context, id, false).await?,
        ClientCommand::Delete { id } => {
            if store.client_has_active_projects(id).await? {
                println!("Client #{id} still has active projects, they lose their client");
            }
            if !store.delete_client(id).await? {
                return Err(missing("Client", id));
            }
            println!("Deleted client #{id}");
        }
    }
    Ok(())
}

pub(crate) async fn process_project_command(
    context: &AppContext,
    command: ProjectCommand,
) -> Result<()> {
    let store = &context.store;
    match command {
        ProjectCommand::Add {
            name,
            color,
            client,
            rate,
            billable,
        } => {
            let project = store
                .create_project(NewProject {
                    name,
                    color,
                    client_id: client,
                    billable,
                    hourly_rate: rate,
                })
                .await?;
            println!("Created project #{} {}", project.id, project.name);
        }
        ProjectCommand::List { all } => {
            let clients = store.clients(true).await?;
            for project in store.projects(all).await? {
                let client = project
                    .client_id
                    .and_then(|id| clients.iter().find(|c| c.id == id))
                    .map(|c| c.name.as_str())
                    .unwrap_or("-");
                let tracked = store.project_total_tracked(project.id).await?;
                let archived = if project.archived { "\tarchived" } else { "" };
                println!(
                    "{}\t{}\t{}\t{client}\t{}/h\t{}{archived}",
                    project.id,
                    project.name,
                    project.color,
                    project.hourly_rate,
                    format_duration(tracked as f64)
                );
            }
        }
        ProjectCommand::Update {
            id,
            name,
            color,
            client,
            no_client,
            rate,
            billable,
        } => {
            let update = ProjectUpdate {
                name,
                color,
                client_id: if no_client { Some(None) } else { client.map(Some) },
                billable,
                hourly_rate: rate,
                archived: None,
            };
            let project = store
                .update_project(id, update)
                .await?
                .ok_or_else(|| missing("Project", id))?;
            println!("Updated project #{id} {}", project.name);
        }
        ProjectCommand::Archive { id } => archive_project(context, id, true).await?,
        ProjectCommand::Unarchive { id } => archive_project(context, id, false).await?,
        ProjectCommand::Delete { id } => {
            if !store.delete_project(id).await? {
                return Err(missing("Project", id));
            }
            println!("Deleted project #{id}");
        }
    }
    Ok(())
}

pub(crate) async fn process_tag_command(context: &AppContext, command: TagCommand) -> Result<()> {
    let store = &context.store;
    match command {
        TagCommand::Add { name } => {
            let tag = store.create_tag(&name).await?;
            println!("Created tag #{} {}", tag.id, tag.name);
        }
        TagCommand::List {} => {
            for tag in store.tags().await? {
                let used = store.tag_usage_count(tag.id).await?;
                println!("{}\t{}\t{used} entries", tag.id, tag.name);
            }
        }
        TagCommand::Rename { id, name } => {
            let tag = store
                .update_tag(id, &name)
                .await?
                .ok_or_else(|| missing("Tag", id))?;
            println!("Renamed tag #{id} to {}", tag.name);
        }
        TagCommand::Delete { id } => {
            if !store.delete_tag(id).await? {
                return Err(missing("Tag", id));
            }
            println!("Deleted tag #{id}");
        }
    }
    Ok(())
}

pub(crate) async fn process_setting_command(
    context: &AppContext,
    command: SettingCommand,
) -> Result<()> {
    let settings = context.settings();
    match command {
        SettingCommand::Get { key } => match settings.get(&key).await? {
            Some(value) => println!("{value}"),
            None => bail!("Setting {key} is not set and has no default"),
        },
        SettingCommand::Set { key, value } => {
            settings.set(&key, &value).await?;
        }
        SettingCommand::List {} => {
            for (key, value) in settings.all().await? {
                println!("{key}\t{value}");
            }
        }
        SettingCommand::Unset { key } => {
            if !settings.delete(&key).await? {
                println!("Setting {key} was not stored");
            }
        }
    }
    Ok(())
}
