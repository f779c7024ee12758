use std::process;

use anyhow::{Context, Result, anyhow, bail};
use local_notes::models::iso8601;
use local_notes::view::filter_notes;
use local_notes::{
    Clock, Config, KeyValueStorage, NewNote, Note, NoteColor, NoteStore, NoteUpdate,
};

const USAGE: &str = "usage: local-notes <command>

commands:
  list                     show all notes
  add <title> [content]    create a note and print its id
  edit <id> <content>      replace a note's content
  title <id> <title>       rename a note
  color <id> <label>       set color (default, yellow, blue, green)
  pin <id>                 pin or unpin a note
  rm <id>                  delete a note
  search <term>            list notes whose title or content contains term
  export                   print all notes as JSON

<id> may be any unique prefix of a note id.";

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("local-notes: {err:#}");
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let command = args.next().unwrap_or_else(|| "list".to_string());
    if matches!(command.as_str(), "help" | "-h" | "--help") {
        println!("{USAGE}");
        return Ok(());
    }

    let config = Config::from_env().context("invalid configuration")?;
    let storage = config
        .open_storage()
        .context("failed to open note storage")?;
    let mut store = NoteStore::new(storage, config.storage_key.clone());

    match command.as_str() {
        "list" => print_notes(store.notes().iter()),
        "add" => {
            let title = required(args.next(), "title")?;
            let content = rest(args);
            let note = store.create(NewNote::new(title, content));
            println!("{}", note.id);
        }
        "edit" => {
            let note = resolve(&store, args.next())?;
            let content = rest(args);
            store.update(NoteUpdate {
                content,
                ..NoteUpdate::from(note).keep_image()
            });
        }
        "title" => {
            let note = resolve(&store, args.next())?;
            let title = rest(args);
            store.update(NoteUpdate {
                title,
                ..NoteUpdate::from(note).keep_image()
            });
        }
        "color" => {
            let note = resolve(&store, args.next())?;
            let color: NoteColor = required(args.next(), "color")?.parse()?;
            store.update(NoteUpdate {
                color,
                ..NoteUpdate::from(note).keep_image()
            });
        }
        "pin" => {
            let note = resolve(&store, args.next())?;
            store.toggle_pin(&note.id);
        }
        "rm" => {
            let note = resolve(&store, args.next())?;
            store.delete(&note.id);
        }
        "search" => {
            let term = rest(args);
            print_notes(filter_notes(store.notes(), &term).into_iter());
        }
        "export" => {
            let json = serde_json::to_string_pretty(store.notes())?;
            println!("{json}");
        }
        other => bail!("unknown command '{other}'\n\n{USAGE}"),
    }

    Ok(())
}

fn required(arg: Option<String>, name: &str) -> Result<String> {
    arg.ok_or_else(|| anyhow!("missing {name} argument\n\n{USAGE}"))
}

fn rest(args: impl Iterator<Item = String>) -> String {
    args.collect::<Vec<_>>().join(" ")
}

fn resolve<S: KeyValueStorage, C: Clock>(store: &NoteStore<S, C>, arg: Option<String>) -> Result<Note> {
    let prefix = required(arg, "id")?;
    if let Some(note) = store.get(&prefix) {
        return Ok(note.clone());
    }

    let mut matches = store.notes().iter().filter(|note| note.id.starts_with(&prefix));
    match (matches.next(), matches.next()) {
        (Some(note), None) => Ok(note.clone()),
        (Some(_), Some(_)) => bail!("id prefix '{prefix}' matches more than one note"),
        (None, _) => bail!("no note with id '{prefix}'"),
    }
}

fn print_notes<'a>(notes: impl Iterator<Item = &'a Note>) {
    for note in notes {
        let pin = if note.pinned { "*" } else { " " };
        let short_id = note.id.get(..8).unwrap_or(&note.id);
        let image = if note.image.is_some() { " [image]" } else { "" };
        println!(
            "{pin} {short_id}  {:<32} {:<8} {}{image}",
            note.title,
            note.color,
            iso8601::format(&note.updated_at)
        );
    }
}
