use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Local, TimeZone};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use tracing_subscriber::EnvFilter;

use tribechat::chat::{self, DisplayItem, ReactionOutcome};
use tribechat::{ChatApi, ChatStore, Config, FileStore, HttpChatApi, KeyValueStore};

fn cli() -> Command {
    Command::new("tribechat")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Command-line client for the Tribechat message server")
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .global(true)
                .help("Config file (default: <config dir>/tribechat/config.toml)"),
        )
        .arg(
            Arg::new("base-url")
                .long("base-url")
                .value_name("URL")
                .global(true)
                .help("Chat server API root"),
        )
        .arg(
            Arg::new("data-dir")
                .long("data-dir")
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .global(true)
                .help("Where the local chat snapshot is kept"),
        )
        .arg(
            Arg::new("me")
                .long("me")
                .value_name("UUID")
                .global(true)
                .help("Participant id used for your own messages and reactions"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("messages")
                .about("Load messages and participants, then print the conversation")
                .arg(
                    Arg::new("latest")
                        .long("latest")
                        .action(ArgAction::SetTrue)
                        .help("Only load the most recent page"),
                ),
        )
        .subcommand(
            Command::new("older")
                .about("Load messages sent before the given message")
                .arg(Arg::new("uuid").required(true)),
        )
        .subcommand(
            Command::new("send")
                .about("Send a message")
                .arg(Arg::new("text").required(true))
                .arg(
                    Arg::new("reply-to")
                        .long("reply-to")
                        .value_name("UUID")
                        .help("Message this one replies to"),
                ),
        )
        .subcommand(
            Command::new("react")
                .about("React to a message with an emoji")
                .arg(Arg::new("uuid").required(true))
                .arg(Arg::new("emoji").required(true)),
        )
        .subcommand(
            Command::new("edit")
                .about("Edit a message locally")
                .arg(Arg::new("uuid").required(true))
                .arg(Arg::new("text").required(true)),
        )
        .subcommand(
            Command::new("participants")
                .about("Fetch and list participants")
                .arg(
                    Arg::new("merge")
                        .long("merge")
                        .action(ArgAction::SetTrue)
                        .help("Keep participants the server no longer lists"),
                ),
        )
        .subcommand(Command::new("sync").about("Fetch changes since the last sync"))
        .subcommand(Command::new("info").about("Show server session info"))
        .subcommand(Command::new("show").about("Print the locally stored conversation"))
        .subcommand(Command::new("reset").about("Forget all locally stored chat data"))
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tribechat=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(matches: &ArgMatches) -> Result<Config> {
    let mut config =
        Config::load(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))
            .context("loading configuration")?;

    if let Some(base_url) = matches.get_one::<String>("base-url") {
        config.base_url = base_url.clone();
    }
    if let Some(data_dir) = matches.get_one::<PathBuf>("data-dir") {
        config.data_dir = data_dir.clone();
    }
    if let Some(me) = matches.get_one::<String>("me") {
        config.local_participant_uuid = me.clone();
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let matches = cli().get_matches();
    let config = load_config(&matches)?;
    tracing::debug!(?config, "configuration loaded");

    let api = HttpChatApi::new(&config.base_url, config.request_timeout)
        .context("building HTTP client")?;
    let storage = FileStore::new(&config.data_dir);
    let mut store = ChatStore::open(api, storage, &config.local_participant_uuid)
        .await
        .context("opening local chat state")?;

    match matches.subcommand() {
        Some((name, sub)) => run(&mut store, name, sub).await,
        None => Ok(cli().print_help()?),
    }
}

fn arg<'a>(sub: &'a ArgMatches, id: &str) -> &'a str {
    sub.get_one::<String>(id).map(String::as_str).unwrap_or_default()
}

async fn run<A: ChatApi, S: KeyValueStore>(
    store: &mut ChatStore<A, S>,
    name: &str,
    sub: &ArgMatches,
) -> Result<()> {
    match name {
        "messages" => {
            if sub.get_flag("latest") {
                store.load_latest_messages().await?;
            } else {
                store.load_messages().await?;
            }
            store.refresh_users().await?;
            print_conversation(store);
        }
        "older" => {
            let added = store.load_older_messages(arg(sub, "uuid")).await?;
            println!("{added} older message(s) loaded\n");
            print_conversation(store);
        }
        "send" => {
            if let Some(reply_to) = sub.get_one::<String>("reply-to") {
                store.set_replying_to(Some(reply_to.clone()));
            }
            let message = store.add_message(arg(sub, "text")).await?;
            println!("sent {}", message.uuid);
        }
        "react" => match store.add_reaction_to_message(arg(sub, "uuid"), arg(sub, "emoji")).await? {
            ReactionOutcome::Added(reaction) => println!("reacted {}", reaction.value),
            ReactionOutcome::AlreadyReacted => println!("already reacted {}", arg(sub, "emoji")),
        },
        "edit" => {
            store.edit_message(arg(sub, "uuid"), arg(sub, "text")).await?;
            println!("edited {}", arg(sub, "uuid"));
        }
        "participants" => {
            if sub.get_flag("merge") {
                store.refresh_users().await?;
            } else {
                store.fetch_participants().await?;
            }
            print_participants(store);
        }
        "sync" => {
            let report = store.sync_updates().await?;
            println!(
                "{} new, {} updated message(s); {} participant(s) updated",
                report.messages_added, report.messages_updated, report.participants_updated
            );
        }
        "info" => {
            let info = store.session_info().await?;
            let version = info
                .api_version
                .map(|v| v.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            println!("session {} (api {version})", info.session_uuid);
        }
        "show" => print_conversation(store),
        "reset" => {
            store.reset().await?;
            println!("local chat data removed");
        }
        other => anyhow::bail!("unknown command {other}"),
    }
    Ok(())
}

fn print_conversation<A: ChatApi, S: KeyValueStore>(store: &ChatStore<A, S>) {
    let state = store.state();
    let me = store.local_participant_uuid();

    for item in chat::group_messages_local(state.messages()) {
        match item {
            DisplayItem::DateSeparator { label } => println!("\n--- {label} ---"),
            DisplayItem::Message {
                message,
                is_grouped,
            } => {
                let time = Local
                    .timestamp_millis_opt(message.sent_at)
                    .earliest()
                    .map(|dt| dt.format("%H:%M").to_string())
                    .unwrap_or_default();

                if is_grouped {
                    println!("{time:>5}   {}", message.text);
                } else {
                    let author = state.author_of(message);
                    println!("{time:>5} {}:\n        {}", author.name, message.text);
                }

                if let Some(target) = &message.reply_to_message_uuid {
                    match state.replied_message(message) {
                        Some(original) => println!(
                            "        > {}: {}",
                            state.author_of(original).name,
                            snippet(&original.text, 40)
                        ),
                        None => println!("        > (message {target} not found)"),
                    }
                }
                for image in message.images() {
                    println!("        [image] {}", image.url);
                }

                let reactions = chat::summarize(&message.reactions, me);
                if !reactions.is_empty() {
                    let line: Vec<String> = reactions
                        .iter()
                        .map(|r| {
                            let mark = if r.reacted_by_me { "*" } else { "" };
                            format!("{} {}{mark}", r.value, r.count)
                        })
                        .collect();
                    println!("        {}", line.join("  "));
                }
                if message.edited {
                    println!("        (edited)");
                }
            }
        }
    }
}

fn print_participants<A: ChatApi, S: KeyValueStore>(store: &ChatStore<A, S>) {
    let mut participants: Vec<_> = store.participants().values().collect();
    participants.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));

    for p in participants {
        let title = p.job_title.as_deref().unwrap_or("");
        let email = p.email.as_deref().unwrap_or("");
        println!("{:<36} {:<24} {:<24} {}", p.uuid, p.name, title, email);
    }
}

fn snippet(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{cut}…")
}
