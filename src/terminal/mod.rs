//! Line-oriented terminal front end
//!
//! Typed lines accumulate into the draft. `/send` submits it, `/clear` wipes
//! the conversation, `/quit` (or end of input) exits. The transcript is drawn
//! by [`TranscriptPrinter`], which is just another session listener.

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::conversation::{segments, Message, Role, SegmentKind};
use crate::core::{ConversationView, Listener, SessionController};

#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Send,
    Clear,
    Quit,
    Line(&'a str),
}

impl<'a> Command<'a> {
    fn parse(line: &'a str) -> Self {
        match line.trim() {
            "/send" => Command::Send,
            "/clear" => Command::Clear,
            "/quit" | "/exit" => Command::Quit,
            _ => Command::Line(line),
        }
    }
}

/// Read commands from stdin until `/quit` or EOF.
pub async fn run(controller: Arc<SessionController>) -> anyhow::Result<()> {
    println!("Paste your code, then type /send on its own line. /clear resets, /quit exits.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match Command::parse(&line) {
            Command::Send => {
                let view = controller.view();
                if view.is_pending {
                    println!("(still waiting on the previous hint)");
                } else if !view.can_submit {
                    println!("(nothing to send)");
                } else {
                    // Spawned so the draft stays editable while the request runs
                    let controller = controller.clone();
                    tokio::spawn(async move {
                        controller.submit().await;
                    });
                }
            }
            Command::Clear => {
                controller.clear().await;
                println!("-- conversation cleared --");
            }
            Command::Quit => break,
            Command::Line(text) => {
                let mut draft = controller.view().draft;
                if !draft.is_empty() {
                    draft.push('\n');
                }
                draft.push_str(text);
                controller.set_draft(draft);
            }
        }
    }

    Ok(())
}

#[derive(Default)]
struct Printed {
    revision: Option<u64>,
    messages: usize,
    pending: bool,
    error: Option<String>,
}

/// Prints what changed in the transcript since the last view
#[derive(Default)]
pub struct TranscriptPrinter {
    printed: Mutex<Printed>,
}

impl TranscriptPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    fn render(&self, view: &ConversationView) -> String {
        let mut printed = self.printed.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out = String::new();

        if printed.revision.is_some_and(|seen| view.revision <= seen) {
            return out;
        }
        printed.revision = Some(view.revision);

        if view.messages.len() < printed.messages {
            printed.messages = 0;
        }
        for message in &view.messages[printed.messages..] {
            out.push_str(&render_message(message));
        }
        printed.messages = view.messages.len();

        if view.is_pending && !printed.pending {
            out.push_str("... Processing\n");
        }
        printed.pending = view.is_pending;

        if view.error != printed.error {
            if let Some(error) = &view.error {
                out.push_str(&format!("!! {}\n", error));
            }
        }
        printed.error = view.error.clone();

        out
    }
}

impl Listener for TranscriptPrinter {
    fn on_change(&self, view: &ConversationView) {
        let out = self.render(view);
        if out.is_empty() {
            return;
        }
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = stdout.write_all(out.as_bytes()).and_then(|_| stdout.flush()) {
            tracing::warn!(error = %e, "Failed to write transcript");
        }
    }
}

fn render_message(message: &Message) -> String {
    let label = match message.role {
        Role::User => "you",
        Role::Assistant => "leetaid",
    };

    let mut out = format!("[{}]\n", label);
    for segment in segments(&message.content) {
        match segment.kind {
            SegmentKind::Text => out.push_str(segment.value),
            SegmentKind::Code => {
                if !out.ends_with('\n') {
                    out.push('\n');
                }
                for line in segment.value.trim_matches('\n').lines() {
                    out.push_str("  | ");
                    out.push_str(line);
                    out.push('\n');
                }
            }
        }
    }
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out.push('\n');
    out
}
