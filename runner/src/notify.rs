//! User-facing progress messages.
//!
//! Every message is echoed to the console synchronously. When a chat sink
//! is configured, a copy is queued to a delivery worker thread; senders
//! never wait on delivery.

use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, warn};
use reqwest::blocking::Client;
use serde_json::json;

use crate::error::{Error, Result};

/// Destination for chat copies of progress messages.
pub trait ChatSink: Send {
    fn deliver(&mut self, text: &str) -> Result<()>;
}

/// Posts messages to a Discord channel webhook.
pub struct DiscordWebhook {
    client: Client,
    url: String,
}

/// Discord rejects longer message content.
const DISCORD_MAX_CHARS: usize = 2000;

impl DiscordWebhook {
    pub fn new(url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Delivery(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

impl ChatSink for DiscordWebhook {
    fn deliver(&mut self, text: &str) -> Result<()> {
        let content: String = text.chars().take(DISCORD_MAX_CHARS).collect();
        let resp = self
            .client
            .post(&self.url)
            .json(&json!({ "content": content }))
            .send()
            .map_err(|e| Error::Delivery(format!("webhook request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(Error::Delivery(format!("webhook returned {}", resp.status())));
        }
        Ok(())
    }
}

/// Collects messages in memory. Clones share the same buffer.
#[derive(Clone, Default)]
pub struct MemorySink(Arc<Mutex<Vec<String>>>);

impl MemorySink {
    pub fn messages(&self) -> Vec<String> {
        self.0.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

impl ChatSink for MemorySink {
    fn deliver(&mut self, text: &str) -> Result<()> {
        if let Ok(mut messages) = self.0.lock() {
            messages.push(text.to_string());
        }
        Ok(())
    }
}

/// Console echo plus optional fire-and-forget chat delivery.
pub struct Notifier {
    tx: Option<Sender<String>>,
    worker: Option<JoinHandle<()>>,
    echo: bool,
}

impl Notifier {
    /// Console only.
    pub fn console() -> Self {
        Self {
            tx: None,
            worker: None,
            echo: true,
        }
    }

    /// Console plus a delivery worker feeding `sink`.
    pub fn with_chat<S: ChatSink + 'static>(sink: S) -> Self {
        let (tx, worker) = spawn_worker(sink);
        Self {
            tx: Some(tx),
            worker: Some(worker),
            echo: true,
        }
    }

    /// Chat delivery only; used where console output would be noise.
    pub fn quiet<S: ChatSink + 'static>(sink: S) -> Self {
        let (tx, worker) = spawn_worker(sink);
        Self {
            tx: Some(tx),
            worker: Some(worker),
            echo: false,
        }
    }

    /// Echo `text` and queue it for chat delivery.
    pub fn send(&self, text: &str) {
        if self.echo {
            println!("{text}");
        }
        if let Some(tx) = &self.tx {
            if tx.send(text.to_string()).is_err() {
                debug!("delivery worker gone, dropping message");
            }
        }
    }

    /// Close the queue and wait for queued messages to be delivered.
    pub fn shutdown(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        self.tx = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("delivery worker panicked");
            }
        }
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        self.finish();
    }
}

fn spawn_worker<S: ChatSink + 'static>(mut sink: S) -> (Sender<String>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel::<String>();
    let worker = thread::spawn(move || {
        for text in rx {
            if let Err(e) = sink.deliver(&text) {
                warn!("chat delivery failed: {e}");
            }
        }
    });
    (tx, worker)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_arrive_in_order_after_shutdown() {
        let sink = MemorySink::default();
        let notifier = Notifier::quiet(sink.clone());
        notifier.send("one");
        notifier.send("two");
        notifier.send("three");
        notifier.shutdown();
        assert_eq!(sink.messages(), vec!["one", "two", "three"]);
    }

    struct FailingSink;

    impl ChatSink for FailingSink {
        fn deliver(&mut self, _text: &str) -> Result<()> {
            Err(Error::Delivery("down".into()))
        }
    }

    #[test]
    fn delivery_failure_does_not_reach_sender() {
        let notifier = Notifier::quiet(FailingSink);
        notifier.send("lost");
        notifier.shutdown();
    }

    #[test]
    fn console_only_has_no_worker() {
        let notifier = Notifier::console();
        assert!(notifier.worker.is_none());
        notifier.send("hello");
    }

    #[test]
    fn usable_from_scoped_threads() {
        let sink = MemorySink::default();
        let notifier = Notifier::quiet(sink.clone());
        thread::scope(|s| {
            s.spawn(|| notifier.send("a"));
            s.spawn(|| notifier.send("b"));
        });
        notifier.shutdown();
        let mut got = sink.messages();
        got.sort();
        assert_eq!(got, vec!["a", "b"]);
    }
}
