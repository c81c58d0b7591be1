//! Interactive question session over the processed video.

use super::process::progress_reporter;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::error::Result;
use crate::orchestrator::Orchestrator;
use crate::session::{Session, SessionEvent};
use crate::video_source::resolve_input;
use console::style;
use std::io::{self, BufRead, Write};

/// A line typed at the chat prompt.
#[derive(Debug, PartialEq)]
enum ChatInput<'a> {
    Empty,
    Exit,
    Help,
    Status,
    Cleanup,
    Process(&'a str),
    Question(&'a str),
}

fn parse_line(line: &str) -> ChatInput<'_> {
    let line = line.trim();
    if line.is_empty() {
        return ChatInput::Empty;
    }
    if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
        return ChatInput::Exit;
    }

    match line.split_once(char::is_whitespace) {
        Some(("/process", rest)) if !rest.trim().is_empty() => ChatInput::Process(rest.trim()),
        _ => match line {
            "/help" => ChatInput::Help,
            "/status" => ChatInput::Status,
            "/cleanup" => ChatInput::Cleanup,
            _ => ChatInput::Question(line),
        },
    }
}

fn print_help() {
    Output::list_item("/process <url or path>  index a different video");
    Output::list_item("/status                 show the current video");
    Output::list_item("/cleanup                remove frames, captions and the index");
    Output::list_item("exit                    leave the session");
}

/// Run the interactive chat command.
pub async fn run_chat(settings: Settings) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Ask) {
        Output::error(&format!("{}", e));
        Output::info("Run 'glimt doctor' for detailed diagnostics.");
        return Err(e);
    }

    let max_display_frames = settings.display.max_display_frames;
    let mut session = Session::restore(&settings)?;
    let mut orchestrator = Orchestrator::new(settings)?;

    println!("\n{}", style("Glimt Chat").bold().cyan());
    match session.video() {
        Some(video) => Output::video_info(video),
        None => Output::warning("No video processed yet. Use /process <url or path> first."),
    }
    println!(
        "{}\n",
        style("Type your questions, /help for commands, or 'exit' to quit.").dim()
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("{} ", style("You:").green().bold());
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        match parse_line(&line) {
            ChatInput::Empty => continue,
            ChatInput::Exit => {
                Output::info("Goodbye!");
                break;
            }
            ChatInput::Help => print_help(),
            ChatInput::Status => match session.video() {
                Some(video) => Output::video_info(video),
                None => Output::info("No video processed."),
            },
            ChatInput::Cleanup => match orchestrator.cleanup(&mut session) {
                Ok(report) => Output::success(&format!(
                    "Removed {} frames and {} caption files",
                    report.frames_removed, report.caption_files_removed
                )),
                Err(e) => Output::error(&format!("Cleanup failed: {}", e)),
            },
            ChatInput::Process(input) => {
                if let Err(e) = resolve_input(input) {
                    Output::warning(&e.to_string());
                    continue;
                }
                session.transition(SessionEvent::NewVideoSubmitted);

                let pb = Output::percent_bar("Processing video...");
                orchestrator.set_progress(Some(progress_reporter(pb.clone())));
                let result = orchestrator.process_video(input).await;
                orchestrator.set_progress(None);
                pb.finish_and_clear();

                match result {
                    Ok(result) => {
                        session.transition(result.session_event());
                        if let Err(e) = orchestrator.retire_stale_frames(&result) {
                            Output::warning(&format!("Could not remove old frames: {}", e));
                        }
                        Output::success("Video processed. Ask away.");
                        Output::video_info(&result.video);
                    }
                    Err(e) => Output::error(&format!("Processing failed: {}", e)),
                }
            }
            ChatInput::Question(query) => {
                let spinner = Output::spinner("Thinking...");
                let outcome = orchestrator.ask(&session, query).await;
                spinner.finish_and_clear();

                match outcome {
                    Ok(outcome) => {
                        println!("\n{} {}", style("Glimt:").cyan().bold(), outcome.answer.text);
                        Output::frames_used(&outcome.retrieval.images, max_display_frames);
                        println!();
                    }
                    Err(e) if e.is_user_correctable() => Output::warning(&e.to_string()),
                    Err(e) => Output::error(&format!("Error: {}", e)),
                }
            }
        }
    }

    Ok(())
}
