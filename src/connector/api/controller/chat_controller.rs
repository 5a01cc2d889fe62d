use std::io::{self, Write};

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

use crate::application::{ChatSession, MessageLog, SessionEvent};
use crate::domain::{Message, MessageFeedback, Sender, UserProfile};

use super::super::Container;

const HELP: &str = "Commands:
  /retry            regenerate the last reply
  /more             load older messages
  /like, /dislike   rate the last reply
  /report [reason]  report the last reply
  /history          show the conversation so far
  /clear            start over with an empty history
  /quit             leave";

/// One line of REPL input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Say(String),
    Retry,
    More,
    Like,
    Dislike,
    Report(Option<String>),
    History,
    Clear,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

pub fn parse_command(line: &str) -> ReplCommand {
    let line = line.trim();
    if line.is_empty() {
        return ReplCommand::Empty;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return ReplCommand::Say(line.to_string());
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, Some(arg.trim()).filter(|a| !a.is_empty())),
        None => (rest, None),
    };

    match name.to_lowercase().as_str() {
        "retry" => ReplCommand::Retry,
        "more" => ReplCommand::More,
        "like" => ReplCommand::Like,
        "dislike" => ReplCommand::Dislike,
        "report" => ReplCommand::Report(arg.map(str::to_string)),
        "history" => ReplCommand::History,
        "clear" => ReplCommand::Clear,
        "help" | "?" => ReplCommand::Help,
        "quit" | "exit" | "q" => ReplCommand::Quit,
        other => ReplCommand::Unknown(other.to_string()),
    }
}

pub struct ChatController<'a> {
    container: &'a Container,
}

impl<'a> ChatController<'a> {
    pub fn new(container: &'a Container) -> Self {
        Self { container }
    }

    /// Sends a single message and returns the reply. With `stream`, the reply
    /// is written to stdout as it arrives and the returned string is empty.
    pub async fn ask(&self, text: String, profile: UserProfile, stream: bool) -> Result<String> {
        let session = self.container.open_session(profile).await;
        let mut events = session.subscribe();

        if stream {
            stream_reply(&session, &text, &mut std::io::stdout()).await?;
        } else {
            session.send_message(&text).await;
        }

        if let Some(error) = drain_failure(&mut events) {
            return Err(anyhow::anyhow!("{}", error));
        }

        if stream {
            return Ok(String::new());
        }
        let messages = session.messages().await;
        Ok(messages
            .last()
            .filter(|m| m.is_from_assistant())
            .map(|m| m.text().to_string())
            .unwrap_or_default())
    }

    /// Interactive loop over stdin until `/quit` or end of input.
    pub async fn run(&self, profile: UserProfile, stream: bool) -> Result<String> {
        let session = self.container.open_session(profile).await;
        let mut events = session.subscribe();

        print!("{}", format_history(&session.messages().await));
        println!("(type /help for commands)\n");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("> ");
            std::io::stdout().flush()?;

            let Some(line) = lines.next_line().await? else {
                break;
            };

            match parse_command(&line) {
                ReplCommand::Empty => continue,
                ReplCommand::Quit => break,
                ReplCommand::Help => println!("{HELP}"),
                ReplCommand::Unknown(name) => println!("Unknown command /{name}. {HELP}"),
                ReplCommand::Say(text) => {
                    if stream {
                        stream_reply(&session, &text, &mut std::io::stdout()).await?;
                        println!();
                    } else {
                        session.send_message(&text).await;
                        if let Some(last) = session.messages().await.last() {
                            println!("{}\n", format_message(last));
                        }
                    }
                    report_failure(&mut events);
                }
                ReplCommand::Retry => {
                    let before = session.messages().await.last().map(|m| m.id());
                    session.retry_last_message().await;
                    let messages = session.messages().await;
                    match messages.last() {
                        Some(last) if Some(last.id()) != before => {
                            println!("{}\n", format_message(last))
                        }
                        _ => println!("Nothing to retry.\n"),
                    }
                    report_failure(&mut events);
                }
                ReplCommand::More => {
                    if !session.has_more().await {
                        println!("No older messages.\n");
                        continue;
                    }
                    let before = session.messages().await.len();
                    session.load_more_messages().await;
                    let messages = session.messages().await;
                    let added = messages.len() - before;
                    if added > 0 {
                        print!("{}", format_history(&messages[..added]));
                    }
                    println!("Loaded {added} older messages.\n");
                    report_failure(&mut events);
                }
                ReplCommand::Like => {
                    rate_last_reply(&session, MessageFeedback::liked()).await;
                }
                ReplCommand::Dislike => {
                    rate_last_reply(&session, MessageFeedback::disliked()).await;
                }
                ReplCommand::Report(reason) => {
                    rate_last_reply(&session, MessageFeedback::reported(reason)).await;
                }
                ReplCommand::History => {
                    print!("{}", format_history(&session.messages().await));
                }
                ReplCommand::Clear => {
                    session.clear_chat().await;
                    println!("Conversation cleared.\n");
                }
            }
        }

        Ok(format!(
            "Session {} ended with {} messages.",
            session.id(),
            session.messages().await.len()
        ))
    }

    /// Reports the active backend and session settings.
    pub async fn check(&self) -> Result<String> {
        let config = self.container.config();
        let context = match config.max_context_turns {
            0 => "unbounded".to_string(),
            n => format!("{n} messages"),
        };

        let mut output = format!(
            "Tufti Chat Configuration\n========================\nBackend:       {}\n",
            self.container.model_name()
        );
        if let Some(endpoint) = self.container.endpoint() {
            output.push_str(&format!("Endpoint:      {endpoint}\n"));
        }
        output.push_str(&format!("Timeout:       {}s\n", config.timeout_secs));
        output.push_str(&format!("Context:       {context}\n"));

        match (&config.history_file, self.container.message_log()) {
            (Some(path), Some(log)) => output.push_str(&format!(
                "History:       {} ({} messages)",
                path.display(),
                log.count().await?
            )),
            _ => output.push_str("History:       (none)"),
        }

        Ok(output)
    }
}

/// Writes the part of a cumulative reply that has not been written yet.
/// Write errors from inside the streaming callback are kept and returned by
/// [`StreamPrinter::finish`].
struct StreamPrinter<W: Write> {
    out: W,
    shown: String,
    error: Option<io::Error>,
}

impl<W: Write> StreamPrinter<W> {
    fn new(out: W) -> Self {
        Self {
            out,
            shown: String::new(),
            error: None,
        }
    }

    fn print(&mut self, cumulative: &str) {
        if self.error.is_none() {
            if let Err(e) = self.write_suffix(cumulative) {
                self.error = Some(e);
            }
        }
    }

    fn write_suffix(&mut self, cumulative: &str) -> io::Result<()> {
        let Some(suffix) = cumulative.strip_prefix(self.shown.as_str()) else {
            return Ok(());
        };
        if self.shown.is_empty() {
            write!(self.out, "[tufti] ")?;
        }
        write!(self.out, "{suffix}")?;
        self.out.flush()?;
        self.shown.push_str(suffix);
        Ok(())
    }

    /// Returns the text shown so far.
    fn finish(self) -> io::Result<String> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.shown),
        }
    }
}

/// Streams the reply to `text` into `out`. A stored reply that differs from
/// what was streamed (the apology after a failure, possibly mid-stream) is
/// written out in full.
async fn stream_reply<W: Write + Send>(
    session: &ChatSession,
    text: &str,
    out: &mut W,
) -> io::Result<()> {
    let before = session.messages().await.last().map(|m| m.id());

    let mut printer = StreamPrinter::new(&mut *out);
    session
        .send_message_streaming(text, &mut |partial: &str| printer.print(partial))
        .await;
    let shown = printer.finish()?;

    let messages = session.messages().await;
    if let Some(reply) = messages.last() {
        let is_new = Some(reply.id()) != before && reply.is_from_assistant();
        if is_new && reply.text() != shown {
            if !shown.is_empty() {
                writeln!(out)?;
            }
            write!(out, "{}", format_message(reply))?;
        }
    }
    writeln!(out)?;
    out.flush()
}

async fn rate_last_reply(session: &ChatSession, feedback: MessageFeedback) {
    let messages = session.messages().await;
    let Some(target) = messages.iter().rev().find(|m| m.is_from_assistant()) else {
        println!("No reply to rate yet.\n");
        return;
    };

    if session
        .update_message_feedback(target.id(), Some(feedback))
        .await
    {
        println!("Feedback recorded for message {}.\n", target.id());
    }
}

fn drain_failure(events: &mut broadcast::Receiver<SessionEvent>) -> Option<String> {
    let mut failure = None;
    while let Ok(event) = events.try_recv() {
        match event {
            SessionEvent::ResponseFailed { error, .. } => failure = Some(error),
            SessionEvent::PageLoadFailed { page, error } => {
                failure = Some(format!("could not load page {page}: {error}"))
            }
            _ => {}
        }
    }
    failure
}

fn report_failure(events: &mut broadcast::Receiver<SessionEvent>) {
    if let Some(error) = drain_failure(events) {
        eprintln!("warning: {error} (try /retry)\n");
    }
}

pub fn format_message(message: &Message) -> String {
    let label = match message.sender() {
        Sender::User => "you",
        Sender::Assistant => "tufti",
        Sender::System => "system",
    };

    let mut line = format!("[{label}] {}", message.text());
    if let Some(feedback) = message.feedback() {
        match feedback.liked {
            Some(true) => line.push_str(" (+)"),
            Some(false) => line.push_str(" (-)"),
            None => {}
        }
        if feedback.reported == Some(true) {
            line.push_str(" (reported)");
        }
    }
    line
}

pub fn format_history(messages: &[Message]) -> String {
    if messages.is_empty() {
        return "No messages yet.\n\n".to_string();
    }

    let mut output = String::new();
    for message in messages {
        output.push_str(&format_message(message));
        output.push_str("\n\n");
    }
    output
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::application::APOLOGY_TEXT;
    use crate::connector::adapter::{ChatClient, LlmChatService, MockChatClient};
    use crate::domain::{Completion, DomainError, GenerationParams, MessageId, Turn};

    /// Streams the first words of a reply, then drops the connection.
    struct CutOffClient;

    #[async_trait]
    impl ChatClient for CutOffClient {
        async fn complete(
            &self,
            _turns: &[Turn],
            _params: &GenerationParams,
        ) -> Result<Completion, DomainError> {
            Err(DomainError::transport("connection reset"))
        }

        async fn complete_streaming(
            &self,
            _turns: &[Turn],
            _params: &GenerationParams,
            on_partial: crate::application::PartialCallback<'_>,
        ) -> Result<Completion, DomainError> {
            on_partial("Ah, my");
            Err(DomainError::transport("connection reset"))
        }

        fn model_name(&self) -> &str {
            "cut-off"
        }
    }

    fn session_with(client: Arc<dyn ChatClient>) -> ChatSession {
        ChatSession::new(
            UserProfile::new("Alice"),
            Arc::new(LlmChatService::new(client)),
        )
    }

    async fn streamed_output(session: &ChatSession, text: &str) -> String {
        let mut out: Vec<u8> = Vec::new();
        stream_reply(session, text, &mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn test_streamed_reply_is_printed_once() {
        let session = session_with(Arc::new(MockChatClient::new()));
        let output = streamed_output(&session, "Where is my attention?").await;

        let messages = session.messages().await;
        let reply = messages.last().unwrap().text();
        assert!(output.starts_with("[tufti] "));
        assert_eq!(output.matches(reply).count(), 1);
        assert!(output.ends_with('\n'));
    }

    #[tokio::test]
    async fn test_failed_stream_prints_apology() {
        let session = session_with(Arc::new(MockChatClient::failing()));
        let output = streamed_output(&session, "hi").await;

        assert_eq!(output, format!("[tufti] {APOLOGY_TEXT}\n"));
    }

    #[tokio::test]
    async fn test_interrupted_stream_prints_apology_after_partial() {
        let session = session_with(Arc::new(CutOffClient));
        let output = streamed_output(&session, "hi").await;

        assert_eq!(output, format!("[tufti] Ah, my\n[tufti] {APOLOGY_TEXT}\n"));
        assert_eq!(session.messages().await.last().unwrap().text(), APOLOGY_TEXT);
    }

    #[test]
    fn test_printer_writes_only_new_text() {
        let mut out: Vec<u8> = Vec::new();
        let mut printer = StreamPrinter::new(&mut out);
        for partial in ["Ah,", "Ah, my", "Ah, my dear."] {
            printer.print(partial);
        }
        assert_eq!(printer.finish().unwrap(), "Ah, my dear.");
        assert_eq!(String::from_utf8(out).unwrap(), "[tufti] Ah, my dear.");
    }

    #[test]
    fn test_plain_text_is_said() {
        assert_eq!(
            parse_command("  What is the plait?  "),
            ReplCommand::Say("What is the plait?".to_string())
        );
        assert_eq!(parse_command("   "), ReplCommand::Empty);
    }

    #[test]
    fn test_commands_are_case_insensitive() {
        assert_eq!(parse_command("/RETRY"), ReplCommand::Retry);
        assert_eq!(parse_command("/exit"), ReplCommand::Quit);
        assert_eq!(parse_command("/more"), ReplCommand::More);
    }

    #[test]
    fn test_report_takes_optional_reason() {
        assert_eq!(parse_command("/report"), ReplCommand::Report(None));
        assert_eq!(
            parse_command("/report off topic "),
            ReplCommand::Report(Some("off topic".to_string()))
        );
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(
            parse_command("/dance"),
            ReplCommand::Unknown("dance".to_string())
        );
    }

    #[test]
    fn test_format_message_shows_feedback() {
        let mut message = Message::assistant(MessageId::new(1), "Step back.");
        assert_eq!(format_message(&message), "[tufti] Step back.");

        message.set_feedback(Some(MessageFeedback::liked()));
        assert_eq!(format_message(&message), "[tufti] Step back. (+)");

        message.set_feedback(Some(MessageFeedback::reported(None)));
        assert!(format_message(&message).ends_with("(reported)"));
    }

    #[test]
    fn test_format_empty_history() {
        assert_eq!(format_history(&[]), "No messages yet.\n\n");
    }
}
