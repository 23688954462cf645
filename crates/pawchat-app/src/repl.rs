use anyhow::{Context, Result};
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::Path;
use std::sync::Arc;

use pawchat_logging::TranscriptLogger;
use pawchat_media::{SimAudioSink, SimMicrophone};
use pawchat_session::{
    ConversationSession, MediaKind, ReplyPolicy, SessionConfig, SessionEvent,
};
use pawchat_store::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
use pawchat_types::{format_duration, CounterpartProfile, Message, MessageId, MessageStatus};

use crate::cli::Cli;

/// Run the interactive chat REPL.
pub async fn run_repl(cli: &Cli) -> Result<()> {
    println!("{}", "🐾 Pawchat - talk to your pet caretaker".bright_cyan().bold());
    println!(
        "{}",
        format!("Counterpart: {} ({})", cli.name, cli.counterpart).bright_black()
    );
    println!(
        "{}",
        "Type a message and press enter, or /help for commands\n".bright_black()
    );

    let adapter: Arc<dyn KeyValueStore> = if cli.ephemeral {
        println!("{}", "Ephemeral mode: nothing will be saved".yellow());
        Arc::new(MemoryKeyValueStore::new())
    } else {
        Arc::new(
            FileKeyValueStore::new(&cli.data_dir)
                .with_context(|| format!("opening data dir {}", cli.data_dir.display()))?,
        )
    };

    let policy = if cli.reply_always {
        ReplyPolicy::Always
    } else {
        ReplyPolicy::TextOnly
    };
    let config = SessionConfig::new(cli.collection.clone()).with_reply_policy(policy);
    let profile = CounterpartProfile::new(cli.counterpart.clone(), cli.name.clone());

    let session = Arc::new(ConversationSession::new(
        profile,
        adapter,
        Arc::new(SimMicrophone::new()),
        Arc::new(SimAudioSink::new()),
        config,
    ));

    // Transcript logging is best-effort; a failure just disables it
    let logger = match TranscriptLogger::new(&cli.data_dir).await {
        Ok(l) => Some(l),
        Err(e) => {
            eprintln!("Logging disabled: {}", e);
            None
        }
    };

    let existing = session.messages();
    if !existing.is_empty() {
        println!("{}", format!("-- {} earlier message(s) --", existing.len()).bright_black());
        for message in &existing {
            print_message(message, &cli.name);
        }
    }

    spawn_event_printer(&session, cli.name.clone(), cli.verbose, logger);

    let mut rl = DefaultEditor::new()?;
    loop {
        match rl.readline("you> ") {
            Ok(line) => {
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(&line);
                if line == "exit" || line == "quit" {
                    break;
                }
                if let Err(e) = handle_line(&session, &cli.name, &line).await {
                    eprintln!("{} {}", "⚠️".yellow(), e);
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {}", e);
                break;
            }
        }
    }

    session.close();
    println!("{}", "Bye! 🐾".bright_cyan());
    Ok(())
}

/// Prints counterpart replies, recorder progress and warnings as they
/// arrive, and feeds the transcript log.
fn spawn_event_printer(
    session: &Arc<ConversationSession>,
    counterpart_name: String,
    verbose: bool,
    mut logger: Option<TranscriptLogger>,
) {
    let mut events = session.subscribe();
    tokio::spawn(async move {
        let mut seen = 0usize;
        let mut first = true;
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::MessagesChanged(messages) => {
                    if first {
                        // Initial snapshot: history was already printed
                        seen = messages.len();
                        first = false;
                        continue;
                    }
                    for message in messages.iter().skip(seen) {
                        if !message.from_user {
                            println!(
                                "\n{} {}",
                                format!("{}>", counterpart_name).bright_magenta().bold(),
                                message.render_text()
                            );
                        }
                        if let Some(logger) = logger.as_mut() {
                            logger.log_message(message).await;
                        }
                    }
                    seen = seen.max(messages.len());
                }
                SessionEvent::RecorderChanged(snapshot) => {
                    if snapshot.is_recording && verbose {
                        println!(
                            "{}",
                            format!("● recording {}", format_duration(snapshot.elapsed_secs))
                                .red()
                        );
                    }
                }
                SessionEvent::Warning(warning) => {
                    eprintln!("{} {}", "⚠️".yellow(), warning);
                    if let Some(logger) = logger.as_mut() {
                        logger.log_warning(&warning).await;
                    }
                }
            }
        }
    });
}

async fn handle_line(session: &ConversationSession, name: &str, line: &str) -> Result<()> {
    let (command, rest) = match line.split_once(' ') {
        Some((c, r)) => (c, r.trim()),
        None => (line, ""),
    };

    if !command.starts_with('/') {
        session.send_text(line)?;
        return Ok(());
    }

    match command {
        "/help" => print_help(),
        "/history" => {
            for message in session.messages() {
                print_message(&message, name);
            }
        }
        "/image" | "/file" => {
            if rest.is_empty() {
                anyhow::bail!("usage: {} <path>", command);
            }
            let path = Path::new(rest);
            let bytes = std::fs::read(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| rest.to_string());
            let kind = if command == "/image" {
                MediaKind::Image
            } else {
                MediaKind::File
            };
            session.send_media(kind, &bytes, &file_name)?;
            println!("{}", format!("sent {} ({} bytes)", file_name, bytes.len()).bright_black());
        }
        "/record" => {
            session.start_recording().await?;
            println!("{}", "Recording... /stop when done, /cancel to abort".red());
        }
        "/stop" => {
            if !session.recorder_state().await.is_recording {
                println!("{}", "Not recording".bright_black());
                return Ok(());
            }
            match session.stop_recording().await? {
                Some(preview) => println!(
                    "{}",
                    format!(
                        "Recorded {} - /send to send, /play-preview to listen, /cancel to discard",
                        format_duration(preview.duration_secs)
                    )
                    .bright_black()
                ),
                None => println!("{}", "Too short, discarded".bright_black()),
            }
        }
        "/send" => {
            if !session.recorder_state().await.has_preview {
                println!("{}", "Nothing recorded".bright_black());
                return Ok(());
            }
            session.confirm_recording().await?;
            println!("{}", "Voice message sent".bright_black());
        }
        "/cancel" => {
            let snapshot = session.recorder_state().await;
            if !snapshot.is_recording && !snapshot.has_preview {
                println!("{}", "Nothing to cancel".bright_black());
                return Ok(());
            }
            session.cancel_recording().await?;
            println!("{}", "Recording discarded".bright_black());
        }
        "/play-preview" => {
            if !session.recorder_state().await.has_preview {
                println!("{}", "Nothing recorded".bright_black());
                return Ok(());
            }
            session.play_preview().await?;
        }
        "/play" => {
            let id = parse_id(rest).context("usage: /play <message-id>")?;
            session.play_audio(id)?;
        }
        "/delete" => {
            let (id_str, scope) = match rest.split_once(' ') {
                Some((i, s)) => (i, s.trim()),
                None => (rest, ""),
            };
            let id = parse_id(id_str).context("usage: /delete <message-id> [all]")?;
            session.delete_message(id, scope == "all")?;
            println!("{}", "Message deleted".bright_black());
        }
        "/read" => {
            let id = parse_id(rest).context("usage: /read <message-id>")?;
            session.update_status(id, MessageStatus::Read)?;
        }
        other => anyhow::bail!("unknown command: {} (try /help)", other),
    }
    Ok(())
}

fn parse_id(s: &str) -> Result<MessageId> {
    let raw: i64 = s.trim().parse().context("message id is a number")?;
    Ok(MessageId(raw))
}

fn print_message(message: &Message, counterpart_name: &str) {
    let who = if message.from_user {
        "you".bright_green()
    } else {
        counterpart_name.bright_magenta()
    };
    let status = if message.from_user {
        format!(" [{}]", message.status).bright_black().to_string()
    } else {
        String::new()
    };
    println!(
        "{} {} {}{}",
        format!("#{}", message.id).bright_black(),
        who,
        message.render_text(),
        status
    );
}

fn print_help() {
    println!(
        "{}",
        r#"Commands:
  /history                show the full conversation
  /image <path>           send an image
  /file <path>            send a file
  /record                 start a voice recording
  /stop                   stop recording (sub-second takes are discarded)
  /send                   send the recorded preview
  /play-preview           listen to the recorded preview
  /cancel                 discard the recording or preview
  /play <message-id>      play a voice message
  /delete <id> [all]      delete a message (optionally for everyone)
  /read <id>              mark a message as read
  exit                    quit"#
    );
}
