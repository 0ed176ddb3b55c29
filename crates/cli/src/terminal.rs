//! Terminal implementation of the host capabilities.
//!
//! Prompts read one line each. An empty answer skips an optional value
//! (or cancels a file choice); `!` cancels the whole workflow.
//!
//! Lines are read on a background thread so that a pending prompt gives up
//! as soon as the workflow's cancellation token fires.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use qcrbox_core::catalog::ParameterSpec;
use qcrbox_core::host::{
    Checkpoint, FileChoice, HostSession, Notifier, NotifyKind, ParameterSource, PromptReply,
};

const CANCEL_ANSWER: &str = "!";

/// How often a waiting prompt checks for cancellation.
const CANCEL_CHECK: Duration = Duration::from_millis(100);

pub struct TerminalHost {
    lines: Mutex<mpsc::Receiver<io::Result<String>>>,
    output: Mutex<Box<dyn Write + Send>>,
    structure: Option<PathBuf>,
    cancel: CancellationToken,
}

impl TerminalHost {
    pub fn stdio(structure: Option<PathBuf>, cancel: CancellationToken) -> Self {
        Self::with_io(io::BufReader::new(io::stdin()), io::stdout(), structure, cancel)
    }

    pub fn with_io(
        input: impl BufRead + Send + 'static,
        output: impl Write + Send + 'static,
        structure: Option<PathBuf>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            lines: Mutex::new(spawn_reader(input)),
            output: Mutex::new(Box::new(output)),
            structure,
            cancel,
        }
    }

    fn say(&self, text: &str) {
        if let Ok(mut out) = self.output.lock() {
            // A closed terminal only loses the message.
            let _ = writeln!(out, "{text}");
            let _ = out.flush();
        }
    }

    /// Print `question` and read one trimmed line. `None` on end of input
    /// or once the workflow is cancelled.
    fn ask(&self, question: &str) -> Option<String> {
        if let Ok(mut out) = self.output.lock() {
            let _ = write!(out, "{question} ");
            let _ = out.flush();
        }
        let lines = self.lines.lock().ok()?;
        loop {
            if self.cancel.is_cancelled() {
                return None;
            }
            match lines.recv_timeout(CANCEL_CHECK) {
                Ok(Ok(line)) => return Some(line.trim().to_string()),
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "Cannot read from terminal");
                    return None;
                }
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => return None,
            }
        }
    }
}

/// Forward lines from `input` until end of input or a read error.
fn spawn_reader(mut input: impl BufRead + Send + 'static) -> mpsc::Receiver<io::Result<String>> {
    let (sender, receiver) = mpsc::channel();
    std::thread::spawn(move || loop {
        let mut line = String::new();
        let next = match input.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => Ok(line),
            Err(e) => Err(e),
        };
        let failed = next.is_err();
        if sender.send(next).is_err() || failed {
            break;
        }
    });
    receiver
}

fn describe(spec: &ParameterSpec) -> String {
    let mut text = format!("{} ({})", spec.name, spec.dtype);
    if let Some(description) = &spec.description {
        text.push_str(&format!(" - {description}"));
    }
    if !spec.required {
        text.push_str(" [optional]");
    }
    text
}

impl ParameterSource for TerminalHost {
    fn prompt_value(&self, spec: &ParameterSpec) -> PromptReply {
        match self.ask(&format!("{}:", describe(spec))) {
            None => PromptReply::Cancel,
            Some(answer) if answer == CANCEL_ANSWER => PromptReply::Cancel,
            Some(answer) if answer.is_empty() => PromptReply::Skip,
            Some(answer) => PromptReply::Value(answer),
        }
    }

    fn prompt_for_file(&self, spec: &ParameterSpec) -> FileChoice {
        match self.ask(&format!("{} file path:", describe(spec))) {
            Some(answer) if !answer.is_empty() && answer != CANCEL_ANSWER => {
                FileChoice::Selected(PathBuf::from(answer))
            }
            _ => FileChoice::Cancelled,
        }
    }

    fn confirm(&self, checkpoint: &Checkpoint) -> bool {
        match self.ask(&format!("{checkpoint} [Y/n]")) {
            None => false,
            Some(answer) => matches!(answer.to_ascii_lowercase().as_str(), "" | "y" | "yes"),
        }
    }
}

impl Notifier for TerminalHost {
    fn notify(&self, message: &str, kind: NotifyKind) {
        let tag = match kind {
            NotifyKind::Info => "info",
            NotifyKind::Warning => "warning",
            NotifyKind::Error => "error",
        };
        self.say(&format!("[{tag}] {message}"));
    }
}

impl HostSession for TerminalHost {
    /// The terminal cannot display a structure; it points the user at it.
    fn open_file_in_host(&self, path: &Path) -> Result<(), String> {
        if !path.is_file() {
            return Err(format!("{} does not exist", path.display()));
        }
        self.say(&format!("Result structure: {}", path.display()));
        Ok(())
    }

    fn current_structure(&self) -> Option<PathBuf> {
        self.structure.clone()
    }
}
