use std::path::Path;
use std::sync::{Arc, RwLock};

use anyhow::bail;
use clap::Parser;

mod app;
mod auth;
mod cli;
mod config;
mod eid;
mod lock;
mod notes;
mod semantic;
#[cfg(test)]
mod tests;
mod web;

use app::App;
use config::Config;
use notes::{NoteCreate, NoteManager, TextBlock, User};

fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let base_path = config::base_path();
    let config = Arc::new(RwLock::new(Config::load_with(&base_path)));

    // daemon and CLI exclude each other for the lifetime of the invocation
    let _lock = lock::FileLock::try_acquire(Path::new(&base_path))?;

    let app = App::open(config)?;

    match args.command {
        cli::Command::Daemon {} => {
            web::start_daemon(app);
        }

        cli::Command::Register { device_id } => {
            let user = app.register(&device_id)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "user_id": user.id,
                    "token": user.token,
                }))
                .unwrap()
            );
        }

        cli::Command::Add {
            user,
            text,
            title,
            source_uri,
        } => {
            let user = user_by_id(&app, user)?;
            let note = app.create_note(
                &user,
                NoteCreate {
                    title: title.unwrap_or_else(|| "Untitled".to_string()),
                    content: vec![TextBlock::plain(text)],
                    source_uri,
                    ..Default::default()
                },
            )?;
            println!("{}", serde_json::to_string_pretty(&note).unwrap());
        }

        cli::Command::Append { user, id, text } => {
            let user = user_by_id(&app, user)?;
            let note = app.append_block(&user, id, TextBlock::plain(text))?;
            println!("{}", serde_json::to_string_pretty(&note).unwrap());
        }

        cli::Command::Search {
            user,
            query,
            limit,
            threshold,
        } => {
            let user = user_by_id(&app, user)?;
            let matches = app.search_notes(&user, &query, limit, threshold)?;
            println!("{}", serde_json::to_string_pretty(&matches).unwrap());
        }

        cli::Command::List { user } => {
            let user = user_by_id(&app, user)?;
            let notes = app.list_notes(&user);
            println!("{}", serde_json::to_string_pretty(&notes).unwrap());
        }

        cli::Command::Delete { user, id } => {
            let user = user_by_id(&app, user)?;
            app.delete_note(&user, id)?;
            println!("deleted note {id}");
        }

        cli::Command::Reindex {} => {
            let summary = app.reindex_all()?;
            println!("{}", serde_json::to_string_pretty(&summary).unwrap());
        }
    }

    Ok(())
}

fn user_by_id(app: &App, user_id: u64) -> anyhow::Result<User> {
    match app.notes.user_by_id(user_id) {
        Some(user) => Ok(user),
        None => bail!("no user with id {user_id}; run `nota register` first"),
    }
}
