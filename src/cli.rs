use crate::config::Config;
use crate::engine::append_reminder;
use crate::error::{AppError, AppResult};
use crate::profile::Theme;
use crate::reminder::{EnrichedEntry, Urgency};
use crate::AppState;
use chrono::{Local, TimeZone};
use std::io::{self, BufRead};
use std::sync::Arc;

const USAGE: &str = "\
Usage: med-reminders <command>

Commands:
  list                                   Show reminders, soonest first
  add <name> [--dose DOSE] [--time HH:MM] Add a daily reminder
  quick [name] [--dose DOSE] [--time HH:MM]
                                         Add a reminder, defaulting to
                                         Vitamin D, 1000 IU at 08:00
  take <id>                              Mark a dose as taken now
  remove <id>                            Delete a reminder
  watch                                  Refresh the list until Enter is pressed
  profile [--name NAME]                  Show or set the display name
  theme [dark|light]                     Show or set the theme
  sign-out                               Clear all application data";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    List,
    Add {
        name: String,
        dose: String,
        time: Option<String>,
    },
    Quick {
        name: Option<String>,
        dose: Option<String>,
        time: Option<String>,
    },
    Take {
        id: String,
    },
    Remove {
        id: String,
    },
    Watch,
    Profile {
        name: Option<String>,
    },
    Theme(Option<Theme>),
    SignOut,
    Help,
}

impl Command {
    pub fn parse<I>(args: I) -> AppResult<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        let command = match args.next() {
            Some(command) => command,
            None => return Ok(Command::List),
        };
        let rest: Vec<String> = args.collect();

        match command.as_str() {
            "list" | "ls" => Ok(Command::List),
            "add" => parse_add(&rest),
            "quick" => parse_quick(&rest),
            "take" => Ok(Command::Take {
                id: single_arg(&rest, "take <id>")?,
            }),
            "remove" | "rm" => Ok(Command::Remove {
                id: single_arg(&rest, "remove <id>")?,
            }),
            "watch" => Ok(Command::Watch),
            "profile" => {
                let mut name = None;
                let mut iter = rest.iter();
                while let Some(arg) = iter.next() {
                    match arg.as_str() {
                        "--name" => name = Some(flag_value(iter.next(), "--name")?),
                        other => {
                            return Err(AppError::validation(format!("unexpected argument '{}'", other)))
                        }
                    }
                }
                Ok(Command::Profile { name })
            }
            "theme" => match rest.first().map(String::as_str) {
                None => Ok(Command::Theme(None)),
                Some("dark") => Ok(Command::Theme(Some(Theme::Dark))),
                Some("light") => Ok(Command::Theme(Some(Theme::Light))),
                Some(other) => Err(AppError::validation(format!("unknown theme '{}'", other))),
            },
            "sign-out" | "signout" => Ok(Command::SignOut),
            "help" | "--help" | "-h" => Ok(Command::Help),
            other => Err(AppError::validation(format!("unknown command '{}'\n\n{}", other, USAGE))),
        }
    }
}

fn parse_add(rest: &[String]) -> AppResult<Command> {
    let mut words = Vec::new();
    let mut dose = String::new();
    let mut time = None;

    let mut iter = rest.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--dose" => dose = flag_value(iter.next(), "--dose")?,
            "--time" => time = Some(flag_value(iter.next(), "--time")?),
            word => words.push(word.to_string()),
        }
    }

    Ok(Command::Add {
        name: words.join(" "),
        dose,
        time,
    })
}

fn parse_quick(rest: &[String]) -> AppResult<Command> {
    let mut words = Vec::new();
    let mut dose = None;
    let mut time = None;

    let mut iter = rest.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--dose" => dose = Some(flag_value(iter.next(), "--dose")?),
            "--time" => time = Some(flag_value(iter.next(), "--time")?),
            word => words.push(word.to_string()),
        }
    }

    let name = if words.is_empty() { None } else { Some(words.join(" ")) };
    Ok(Command::Quick { name, dose, time })
}

fn flag_value(value: Option<&String>, flag: &str) -> AppResult<String> {
    value
        .cloned()
        .ok_or_else(|| AppError::validation(format!("{} needs a value", flag)))
}

fn single_arg(rest: &[String], usage: &str) -> AppResult<String> {
    match rest {
        [id] => Ok(id.clone()),
        _ => Err(AppError::validation(format!("usage: med-reminders {}", usage))),
    }
}

/// One line per reminder: id, name, dose, daily time, next due and a tag
pub fn format_entry(entry: &EnrichedEntry) -> String {
    let next = Local
        .timestamp_millis_opt(entry.due_at)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "?".to_string());

    let tag = match entry.urgency() {
        Urgency::PastDue => " [PAST DUE]",
        Urgency::DueSoon => " [DUE SOON]",
        Urgency::Normal => "",
    };

    let dose = if entry.entry.dose.is_empty() {
        String::new()
    } else {
        format!(" • {}", entry.entry.dose)
    };

    format!(
        "{}  {}{}  Time: {} • Next: {}{}",
        entry.entry.id, entry.entry.name, dose, entry.entry.time, next, tag
    )
}

fn print_list(entries: &[EnrichedEntry]) {
    if entries.is_empty() {
        println!("No medicines added yet");
        return;
    }
    for entry in entries {
        println!("{}", format_entry(entry));
    }
}

pub fn execute(command: Command, state: &Arc<AppState>, config: &Config) -> AppResult<()> {
    match command {
        Command::List => print_list(&state.list_reminders()),
        // rejected input and unknown ids are reported, not errors
        Command::Add { name, dose, time } => match state.add_reminder(&name, &dose, time.as_deref()) {
            Some(id) => println!("Added {}", id),
            None => println!("Nothing added"),
        },
        Command::Quick { name, dose, time } => {
            let added = append_reminder(
                state.store().as_ref(),
                name.as_deref(),
                time.as_deref(),
                dose.as_deref(),
            );
            if added {
                state.lock_engine().reload();
                println!("Added");
            } else {
                println!("Nothing added");
            }
        }
        Command::Take { id } => {
            if state.mark_taken(&id) {
                println!("Marked {} taken", id);
            } else {
                println!("No reminder {}", id);
            }
        }
        Command::Remove { id } => {
            if state.remove_reminder(&id) {
                println!("Removed {}", id);
            } else {
                println!("No reminder {}", id);
            }
        }
        Command::Watch => watch(state, config)?,
        Command::Profile { name } => {
            let mut profile = state.lock_profile();
            if let Some(name) = name {
                profile.set_name(&name);
            }
            let initial = profile.initial().map(String::from).unwrap_or_default();
            let shown = if profile.name().is_empty() { "Profile" } else { profile.name() };
            println!("[{}] {}", initial, shown);
        }
        Command::Theme(theme) => {
            let profile = state.lock_profile();
            if let Some(theme) = theme {
                profile.set_theme(theme);
            }
            println!("{}", profile.theme().as_str());
        }
        Command::SignOut => {
            let removed = state.sign_out();
            println!("Signed out ({} keys cleared)", removed);
        }
        Command::Help => println!("{}", USAGE),
    }
    Ok(())
}

fn watch(state: &Arc<AppState>, config: &Config) -> AppResult<()> {
    print_list(&state.list_reminders());
    println!("-- refreshing every {}s, press Enter to stop --", config.refresh_interval.as_secs());

    let mut timer = state.start_refresh(config.refresh_interval, |entries| {
        println!();
        print_list(&entries);
    });

    let mut line = String::new();
    let result = io::stdin().lock().read_line(&mut line);
    timer.stop();
    result.map(|_| ()).map_err(AppError::from)
}
