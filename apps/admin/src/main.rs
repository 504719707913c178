use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use client_core::{
    load_settings_from,
    repositories::{base_query, search_query},
    required_fields, CollectionGateway, DeleteOutcome, Diagnostics, ListController, RecordBackend,
    RecordForm, RepositoryGateway, RestBackend,
};
use serde_json::Value;
use shared::domain::{Collection, Record, RecordId};
use tokio::sync::broadcast::error::TryRecvError;
use tracing_subscriber::EnvFilter;

mod demo;
mod dialog;

use dialog::TerminalDialog;

#[derive(Parser, Debug)]
#[command(about = "Manage club content on the hosted backend")]
struct Args {
    #[arg(long, default_value = client_core::config::DEFAULT_SETTINGS_FILE)]
    config: PathBuf,
    /// Work against built-in sample data instead of the backend.
    #[arg(long)]
    offline: bool,
    /// Answer yes to delete confirmations.
    #[arg(long, short)]
    yes: bool,
    #[arg(long, default_value = "teams")]
    collection: Collection,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    List {
        #[arg(long)]
        search: Option<String>,
        /// Reload as a pull-to-refresh after the initial load.
        #[arg(long)]
        refresh: bool,
    },
    Show {
        id: RecordId,
    },
    Create {
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, Value)>,
    },
    Update {
        id: RecordId,
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, Value)>,
    },
    Delete {
        id: RecordId,
    },
}

/// `key=value`; the value is read as JSON when it parses, as a plain string otherwise.
fn parse_field(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing field name in '{raw}'"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn label(record: &Record) -> String {
    ["name", "title", "competition", "opponent"]
        .iter()
        .find_map(|field| record.get(field).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| Value::Object(record.fields().clone()).to_string())
}

fn print_items(controller: &ListController) {
    let lines = controller.render(|record| format!("{:>8}  {}", record.id(), label(record)));
    if lines.is_empty() {
        println!("(nothing to show)");
    }
    for line in lines {
        println!("{line}");
    }
}

fn report_read_failures(failures: &mut tokio::sync::broadcast::Receiver<shared::protocol::ReadFailure>) {
    loop {
        match failures.try_recv() {
            Ok(failure) => eprintln!(
                "note: could not load {}: {}",
                failure.collection, failure.message
            ),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let backend: Arc<dyn RecordBackend> = if args.offline {
        Arc::new(demo::seeded_backend().await)
    } else {
        let settings = load_settings_from(&args.config, |name| std::env::var(name).ok());
        Arc::new(RestBackend::from_settings(&settings)?)
    };

    let diagnostics = Diagnostics::new();
    let mut failures = diagnostics.subscribe();
    let collection = args.collection;
    let gateway =
        CollectionGateway::with_diagnostics(backend, collection.as_str(), diagnostics).into_shared();
    let dialog = Arc::new(TerminalDialog::new(args.yes));

    let query = match &args.command {
        Command::List {
            search: Some(text), ..
        } => search_query(collection, text),
        _ => base_query(collection),
    };
    let joined: Vec<String> = query.joins.iter().map(|join| join.alias.clone()).collect();
    let controller = ListController::builder(gateway.clone(), dialog.clone())
        .query(query)
        .mount()
        .await;
    report_read_failures(&mut failures);

    let mut form = RecordForm::new(gateway.clone(), dialog)
        .required(required_fields(collection).iter().copied())
        .skip_on_populate(joined)
        .reload_on_save(controller.reload_handle());

    match args.command {
        Command::List { refresh, .. } => {
            if refresh {
                controller.reload(true).await;
                report_read_failures(&mut failures);
            }
            print_items(&controller);
        }
        Command::Show { id } => match gateway.get_by_id(&id).await {
            Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            None => {
                report_read_failures(&mut failures);
                bail!("no {collection} record with id {id}");
            }
        },
        Command::Create { fields } => {
            for (key, value) in fields {
                form.set(key, value);
            }
            if !form.submit().await.success {
                bail!("create failed");
            }
            print_items(&controller);
        }
        Command::Update { id, fields } => {
            let record = match controller.edit(&id) {
                Some(record) => record,
                None => match gateway.get_by_id(&id).await {
                    Some(record) => record,
                    None => bail!("no {collection} record with id {id}"),
                },
            };
            form.populate(&record);
            for (key, value) in fields {
                form.set(key, value);
            }
            if !form.submit().await.success {
                bail!("update failed");
            }
            print_items(&controller);
        }
        Command::Delete { id } => match controller.request_delete(&id).await {
            DeleteOutcome::Deleted => print_items(&controller),
            DeleteOutcome::Declined => println!("Nothing deleted."),
            DeleteOutcome::Failed(_) => bail!("delete failed"),
        },
    }

    Ok(())
}
