//! Terminal mode: questions go to stdout, answers come from stdin.

use crate::api::chat::run_and_record;
use crate::api::SharedState;
use shopwise_core::channel::OutboundMessage;
use shopwise_core::pipeline::PromptCorrelator;
use shopwise_core::state::Product;
use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::sync::Arc;
use tokio::sync::mpsc;

pub async fn run_in_terminal(state: SharedState, query: String) -> anyhow::Result<()> {
    let (tx, rx) = mpsc::unbounded_channel::<OutboundMessage>();
    let correlator = Arc::new(PromptCorrelator::new(Arc::new(tx)));
    let console = tokio::spawn(console(rx, correlator.clone(), stdin_lines()));

    println!("🛒 Searching for: {}", query);
    let outcome = run_and_record(&state, correlator, &query).await;
    let _ = console.await;

    match outcome {
        Some(_) => Ok(()),
        None => anyhow::bail!("run did not complete"),
    }
}

/// Stdin lines, read on a plain thread so a pending read never holds up
/// runtime shutdown.
fn stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Print outbound messages and route typed lines to the oldest live
/// question. Returns the terminal `result` or `error` message.
async fn console(
    mut rx: mpsc::UnboundedReceiver<OutboundMessage>,
    correlator: Arc<PromptCorrelator>,
    mut lines: mpsc::UnboundedReceiver<String>,
) -> Option<OutboundMessage> {
    let mut pending: VecDeque<String> = VecDeque::new();
    loop {
        tokio::select! {
            message = rx.recv() => {
                let message = message?;
                match &message {
                    OutboundMessage::Question { id, text } => {
                        println!("\n? {}", text);
                        print!("> ");
                        let _ = std::io::stdout().flush();
                        pending.push_back(id.clone());
                        continue;
                    }
                    OutboundMessage::Result {
                        products,
                        recommended,
                        message: note,
                        flow,
                        steps,
                    } => print_result(products, recommended.as_ref(), note.as_deref(), flow, *steps),
                    OutboundMessage::Error { message: text } => eprintln!("\n❌ {}", text),
                    OutboundMessage::AnswerAck { .. } | OutboundMessage::Ack { .. } => continue,
                }
                return Some(message);
            }
            line = lines.recv(), if !pending.is_empty() => {
                // Closed stdin answers everything with an empty line
                let answer = line.unwrap_or_default();
                pending.retain(|id| correlator.is_pending(id));
                if let Some(id) = pending.pop_front() {
                    correlator.resolve(&id, &answer);
                }
            }
        }
    }
}

fn print_result(
    products: &[Product],
    recommended: Option<&Product>,
    message: Option<&str>,
    flow: &[String],
    steps: u32,
) {
    println!("\n── Flow ({} steps) ──", steps);
    for line in flow {
        println!("  {}", line);
    }

    println!("\n── Products ──");
    for (i, product) in products.iter().enumerate() {
        let marker = if Some(product) == recommended { "★" } else { " " };
        let rating = product
            .review
            .as_ref()
            .map(|r| format!("{:.1}", r.ratings))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{} {:>2}. {:<50} Rs. {:>8}  {:>3}  {}",
            marker,
            i + 1,
            truncate(&product.name, 50),
            product.price,
            rating,
            product.url
        );
    }

    if let Some(message) = message {
        println!("\n{}", message);
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;
    use tokio::time::timeout;

    fn error(text: &str) -> OutboundMessage {
        OutboundMessage::Error {
            message: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_error_after_unanswered_question_ends_console() {
        let (tx, rx) = mpsc::unbounded_channel();
        let correlator = Arc::new(PromptCorrelator::new(Arc::new(tx.clone())));
        let (_lines_tx, lines) = mpsc::unbounded_channel::<String>();

        tx.send(OutboundMessage::Question {
            id: "q-1".to_string(),
            text: "Which brand?".to_string(),
        })
        .unwrap();
        tx.send(error("Timed out waiting for an answer")).unwrap();

        let last = timeout(Duration::from_secs(5), console(rx, correlator, lines))
            .await
            .expect("console should not wait on stdin");
        assert!(matches!(last, Some(OutboundMessage::Error { .. })));
    }

    #[tokio::test]
    async fn test_typed_line_answers_question() {
        let (tx, rx) = mpsc::unbounded_channel();
        let correlator = Arc::new(PromptCorrelator::new(Arc::new(tx.clone())));
        let (lines_tx, lines) = mpsc::unbounded_channel::<String>();
        let console = tokio::spawn(console(rx, correlator.clone(), lines));

        let asker = correlator.clone();
        let ask = tokio::spawn(async move {
            asker.ask("Which color?", None, Some(Duration::from_secs(5))).await
        });
        lines_tx.send("black".to_string()).unwrap();

        let answer = ask.await.unwrap().unwrap();
        assert_eq!(answer.as_deref(), Some("black"));
        assert_eq!(correlator.outstanding(), 0);

        tx.send(error("done")).unwrap();
        let last = timeout(Duration::from_secs(5), console).await.unwrap().unwrap();
        assert!(matches!(last, Some(OutboundMessage::Error { .. })));
    }

    #[tokio::test]
    async fn test_closed_stdin_answers_empty() {
        let (tx, rx) = mpsc::unbounded_channel();
        let correlator = Arc::new(PromptCorrelator::new(Arc::new(tx.clone())));
        let (lines_tx, lines) = mpsc::unbounded_channel::<String>();
        drop(lines_tx);
        let console = tokio::spawn(console(rx, correlator.clone(), lines));

        let answer = correlator
            .ask("Which color?", None, Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(answer.as_deref(), Some(""));

        tx.send(error("done")).unwrap();
        console.await.unwrap();
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 50), "short");
        assert_eq!(truncate("abcdef", 3), "ab…");
    }
}
