use std::io::{self, BufRead, ErrorKind, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use studio_contracts::chat::{parse_chat_input, ChatInput, Conversation, CHAT_HELP_COMMANDS};
use studio_contracts::generation::GenerationResult;
use studio_engine::{save_data_uri, ChatSession, GenerationEngine};
use tracing::warn;

const SPINNER_FRAMES: [char; 4] = ['|', '/', '-', '\\'];
const SPINNER_TICK: Duration = Duration::from_millis(120);

pub fn run_chat(
    engine: &GenerationEngine,
    mut session: ChatSession,
    out_dir: &Path,
    input: impl BufRead,
    mut output: impl Write,
) -> Result<()> {
    writeln!(
        output,
        "Image chat started ({} backend). Type /help for commands.",
        engine.backend_name()
    )?;

    let mut lines = input.lines();
    loop {
        write!(output, "> ")?;
        output.flush()?;

        let line = match lines.next() {
            Some(Ok(line)) => line,
            Some(Err(err)) if err.kind() == ErrorKind::Interrupted => continue,
            Some(Err(err)) => return Err(err.into()),
            None => break,
        };

        match parse_chat_input(&line) {
            ChatInput::Noop => continue,
            ChatInput::Help => {
                writeln!(output, "Commands: {}", CHAT_HELP_COMMANDS.join(" "))?;
            }
            ChatInput::Quit => break,
            ChatInput::History => print_history(session.conversation(), &mut output)?,
            ChatInput::SetModel(Some(selector)) => {
                session.set_model(Some(selector.clone()));
                writeln!(output, "Model set to {selector}")?;
            }
            ChatInput::SetModel(None) => {
                let current = session.model().unwrap_or(engine.image_model());
                writeln!(output, "Model: {current}")?;
            }
            ChatInput::Unknown { command, .. } => {
                writeln!(output, "Unknown command /{command}. Type /help for commands.")?;
            }
            ChatInput::Prompt(prompt) => {
                let spinner = Spinner::start(session.progress_flag());
                let result = session.submit(engine, &prompt);
                spinner.stop();
                if let Some(result) = result {
                    report_result(&result, session.conversation().len(), out_dir, &mut output)?;
                }
            }
        }
    }

    writeln!(output, "Bye.")?;
    Ok(())
}

pub fn run_chat_stdio(engine: &GenerationEngine, session: ChatSession, out_dir: &Path) -> Result<()> {
    let stdin = io::stdin();
    run_chat(engine, session, out_dir, stdin.lock(), io::stdout())
}

fn report_result(
    result: &GenerationResult,
    turn_index: usize,
    out_dir: &Path,
    output: &mut impl Write,
) -> Result<()> {
    let Some(image) = result.image.as_deref() else {
        writeln!(output, "{}", result.turn_text())?;
        return Ok(());
    };
    match save_data_uri(out_dir, turn_index, image) {
        Ok(path) => writeln!(output, "{} Saved to {}", result.status, path.display())?,
        Err(err) => {
            warn!(error = %format!("{err:#}"), "failed to save image");
            writeln!(output, "{} (image not saved: {err:#})", result.status)?;
        }
    }
    Ok(())
}

fn print_history(conversation: &Conversation, output: &mut impl Write) -> Result<()> {
    if conversation.is_empty() {
        writeln!(output, "No messages yet.")?;
        return Ok(());
    }
    for (index, turn) in conversation.turns().iter().enumerate() {
        let marker = if turn.has_image() { " [image]" } else { "" };
        writeln!(
            output,
            "{:>3}. {}: {}{}",
            index + 1,
            turn.role.as_str(),
            turn.content,
            marker
        )?;
    }
    Ok(())
}

/// Draws a spinner on stderr while the session's progress flag is set.
struct Spinner {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Spinner {
    fn start(progress: Arc<AtomicBool>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("chat-spinner".to_string())
            .spawn(move || {
                let mut frame = 0usize;
                let mut drawn = false;
                while !stop_flag.load(Ordering::SeqCst) {
                    if progress.load(Ordering::SeqCst) {
                        eprint!("\r{} generating...", SPINNER_FRAMES[frame % SPINNER_FRAMES.len()]);
                        let _ = io::stderr().flush();
                        frame += 1;
                        drawn = true;
                    }
                    thread::sleep(SPINNER_TICK);
                }
                if drawn {
                    eprint!("\r                \r");
                    let _ = io::stderr().flush();
                }
            })
            .ok();
        Self { stop, handle }
    }

    fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Cursor;

    use studio_engine::{DryrunBackend, EngineConfig};

    use super::*;

    fn dryrun_engine() -> GenerationEngine {
        GenerationEngine::new(Arc::new(DryrunBackend), &EngineConfig::default())
    }

    fn run_script(script: &str, out_dir: &Path) -> Result<String> {
        let mut output = Vec::new();
        run_chat(
            &dryrun_engine(),
            ChatSession::new(None),
            out_dir,
            Cursor::new(script.as_bytes().to_vec()),
            &mut output,
        )?;
        Ok(String::from_utf8(output)?)
    }

    #[test]
    fn prompts_save_images_and_history_lists_turns() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let text = run_script(
            "a paper boat\nmake it red\n/history\n/quit\nignored after quit\n",
            temp.path(),
        )?;

        assert!(text.contains("Image generated successfully! Saved to"), "{text}");
        assert!(text.contains("Image modified successfully! Saved to"), "{text}");
        assert!(text.contains("  1. user: a paper boat"), "{text}");
        assert!(text.contains("  2. assistant: Image generated successfully! [image]"), "{text}");
        assert!(text.contains("  3. user: make it red"), "{text}");
        assert!(!text.contains("ignored after quit"));

        let mut saved: Vec<String> = fs::read_dir(temp.path())?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .collect();
        saved.sort();
        assert_eq!(saved.len(), 2);
        assert!(saved[0].starts_with("turn-02-") && saved[0].ends_with(".png"));
        assert!(saved[1].starts_with("turn-04-") && saved[1].ends_with(".png"));
        Ok(())
    }

    #[test]
    fn commands_do_not_reach_the_backend() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let text = run_script("/help\n/model\n/model 2.5\n/model\n/bogus\n\n", temp.path())?;

        assert!(text.contains("Commands: /help /model /history /quit"));
        assert!(text.contains("Model: imagen-3.0-generate-001"));
        assert!(text.contains("Model set to 2.5"));
        assert!(text.contains("Model: 2.5"));
        assert!(text.contains("Unknown command /bogus."));
        assert!(text.ends_with("Bye.\n"));
        assert_eq!(fs::read_dir(temp.path())?.count(), 0);
        Ok(())
    }

    #[test]
    fn empty_history_is_reported() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let text = run_script("/history\n", temp.path())?;
        assert!(text.contains("No messages yet."));
        Ok(())
    }
}
