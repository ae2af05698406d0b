//! Outbound message model and the console transport
//!
//! Chat identifiers are user identifiers: every conversation is a private
//! chat with one user.

use crate::callback::Callback;
use crate::db::UserId;
use crate::runtime::Transport;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

pub type ChatId = UserId;
pub type MessageId = i64;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A labeled button whose payload is round-tripped verbatim on selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    pub payload: String,
}

impl Button {
    pub fn new(label: impl Into<String>, callback: &Callback) -> Self {
        Self {
            label: label.into(),
            payload: callback.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Markup {
    /// Buttons attached to the message, one inner vec per row
    Inline { rows: Vec<Vec<Button>> },
    /// The persistent main menu keyboard
    MainMenu { admin: bool },
}

impl Markup {
    pub fn inline(rows: Vec<Vec<Button>>) -> Self {
        Markup::Inline { rows }
    }

    /// One button per row
    pub fn column(buttons: impl IntoIterator<Item = Button>) -> Self {
        Markup::Inline {
            rows: buttons.into_iter().map(|b| vec![b]).collect(),
        }
    }

    pub fn buttons(&self) -> impl Iterator<Item = &Button> {
        let rows: &[Vec<Button>] = match self {
            Markup::Inline { rows } => rows,
            Markup::MainMenu { .. } => &[],
        };
        rows.iter().flatten()
    }
}

/// A message to send: text plus optional markup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub markup: Option<Markup>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markup: None,
        }
    }

    pub fn with_markup(mut self, markup: Markup) -> Self {
        self.markup = Some(markup);
        self
    }

    /// Attach a single cancel button
    pub fn with_cancel(self) -> Self {
        self.with_markup(Markup::inline(vec![vec![Button::new(
            "❌ Cancel",
            &Callback::EditCancel,
        )]]))
    }

    /// Attach skip and cancel buttons
    pub fn with_skip(self) -> Self {
        self.with_markup(Markup::inline(vec![vec![
            Button::new("⏭️ Skip", &Callback::EditSkip),
            Button::new("❌ Cancel", &Callback::EditCancel),
        ]]))
    }
}

// ============================================================================
// Console transport
// ============================================================================

/// One inbound update, decoded from a JSON line
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Update {
    pub user: UserId,
    #[serde(flatten)]
    pub kind: UpdateKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum UpdateKind {
    Callback {
        message_id: MessageId,
        callback: String,
    },
    Video {
        video: String,
    },
    Text {
        text: String,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Outbound<'a> {
    SendText {
        chat: ChatId,
        message_id: MessageId,
        text: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        markup: Option<&'a Markup>,
    },
    SendMedia {
        chat: ChatId,
        message_id: MessageId,
        media: &'a str,
    },
    EditMessage {
        chat: ChatId,
        message_id: MessageId,
        text: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        markup: Option<&'a Markup>,
    },
}

/// Development transport: writes every outbound operation as a JSON line.
pub struct ConsoleTransport<W> {
    out: Mutex<W>,
    next_message_id: AtomicI64,
}

impl ConsoleTransport<tokio::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W: AsyncWrite + Unpin + Send> ConsoleTransport<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            next_message_id: AtomicI64::new(1),
        }
    }

    fn allocate_id(&self) -> MessageId {
        self.next_message_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn emit(&self, op: &Outbound<'_>) -> Result<(), TransportError> {
        let mut line = serde_json::to_vec(op)?;
        line.push(b'\n');
        let mut out = self.out.lock().await;
        out.write_all(&line).await?;
        out.flush().await?;
        Ok(())
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> Transport for ConsoleTransport<W> {
    async fn send_text(
        &self,
        chat: ChatId,
        text: &str,
        markup: Option<&Markup>,
    ) -> Result<MessageId, TransportError> {
        let message_id = self.allocate_id();
        self.emit(&Outbound::SendText {
            chat,
            message_id,
            text,
            markup,
        })
        .await?;
        Ok(message_id)
    }

    async fn send_media(&self, chat: ChatId, media: &str) -> Result<MessageId, TransportError> {
        let message_id = self.allocate_id();
        self.emit(&Outbound::SendMedia {
            chat,
            message_id,
            media,
        })
        .await?;
        Ok(message_id)
    }

    async fn edit_message(
        &self,
        chat: ChatId,
        message_id: MessageId,
        text: &str,
        markup: Option<&Markup>,
    ) -> Result<(), TransportError> {
        self.emit(&Outbound::EditMessage {
            chat,
            message_id,
            text,
            markup,
        })
        .await
    }
}
