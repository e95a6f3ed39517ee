//! Product-upload conversation
//!
//! A seller uploads a product to the storefront through a short Telegram
//! dialogue. This module holds the transport-free state machine: it consumes
//! one input per message and says what happened. Sending replies, fetching
//! files and storing the product are the caller's job.

use std::fmt;

use serde::Serialize;

/// Command that aborts the conversation from any state
pub const CANCEL_COMMAND: &str = "/cancel";

/// Kind of media attached to a product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
    Document,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
            MediaKind::Document => "document",
        }
    }

    /// Parse a user's answer, ignoring case and surrounding whitespace
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "photo" | "image" => Some(MediaKind::Photo),
            "video" => Some(MediaKind::Video),
            "document" | "file" => Some(MediaKind::Document),
            _ => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conversation state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    AwaitingMediaType,
    AwaitingMedia,
    AwaitingTitle,
    AwaitingDescription,
    AwaitingPrice,
    AwaitingCategory,
    AwaitingStock,
    AwaitingConfirmation,
    Published,
    Cancelled,
}

impl UploadState {
    /// Question asked while in this state
    pub fn prompt(&self) -> &'static str {
        match self {
            UploadState::AwaitingMediaType => {
                "What are you uploading? Reply with photo, video or document."
            }
            UploadState::AwaitingMedia => "Send the file now.",
            UploadState::AwaitingTitle => "What is the product title?",
            UploadState::AwaitingDescription => "Send a short description.",
            UploadState::AwaitingPrice => "What is the price? Send a whole number, e.g. 499.",
            UploadState::AwaitingCategory => "Which category does it belong to?",
            UploadState::AwaitingStock => "How many units are in stock?",
            UploadState::AwaitingConfirmation => "Reply yes to publish or no to discard.",
            UploadState::Published => "Product published.",
            UploadState::Cancelled => "Upload cancelled.",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadState::Published | UploadState::Cancelled)
    }
}

/// One incoming message, reduced to what the conversation cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input<'a> {
    Text(&'a str),
    Media { kind: MediaKind, file_id: &'a str },
}

/// What a single input did to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Input accepted; the session moved to the given state
    Advanced(UploadState),
    /// Input rejected; the state is unchanged
    Rejected(String),
    /// The seller confirmed. The caller should publish, then call
    /// [`UploadSession::mark_published`]
    ReadyToPublish,
    /// The seller aborted
    Cancelled,
}

/// Fields collected so far
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductDraft {
    pub media_kind: Option<MediaKind>,
    pub file_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<u64>,
    pub category: Option<String>,
    pub stock: Option<u64>,
}

/// A draft with every field present
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedProduct {
    pub media_kind: MediaKind,
    pub file_id: String,
    pub title: String,
    pub description: String,
    pub price: u64,
    pub category: String,
    pub stock: u64,
}

impl ProductDraft {
    pub fn complete(&self) -> Option<CompletedProduct> {
        Some(CompletedProduct {
            media_kind: self.media_kind?,
            file_id: self.file_id.clone()?,
            title: self.title.clone()?,
            description: self.description.clone()?,
            price: self.price?,
            category: self.category.clone()?,
            stock: self.stock?,
        })
    }

    /// Human-readable recap shown before confirmation
    pub fn summary(&self) -> String {
        fn or_dash(v: &Option<String>) -> &str {
            v.as_deref().unwrap_or("-")
        }
        let number = |v: Option<u64>| v.map_or_else(|| "-".to_string(), |n| n.to_string());

        format!(
            "Title: {}\nDescription: {}\nPrice: {}\nCategory: {}\nStock: {}\nMedia: {}",
            or_dash(&self.title),
            or_dash(&self.description),
            number(self.price),
            or_dash(&self.category),
            number(self.stock),
            self.media_kind.map_or("-", |k| k.as_str()),
        )
    }
}

/// Per-user upload conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub state: UploadState,
    pub draft: ProductDraft,
}

impl Default for UploadSession {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadSession {
    pub fn new() -> Self {
        Self {
            state: UploadState::AwaitingMediaType,
            draft: ProductDraft::default(),
        }
    }

    /// Feed one message into the conversation
    pub fn step(&mut self, input: Input<'_>) -> Step {
        if self.state.is_terminal() {
            return Step::Rejected("This upload is already finished.".to_string());
        }

        if let Input::Text(text) = input {
            if text.trim().eq_ignore_ascii_case(CANCEL_COMMAND) {
                self.state = UploadState::Cancelled;
                return Step::Cancelled;
            }
        }

        match (self.state, input) {
            (UploadState::AwaitingMediaType, Input::Text(text)) => match MediaKind::parse(text) {
                Some(kind) => {
                    self.draft.media_kind = Some(kind);
                    self.advance(UploadState::AwaitingMedia)
                }
                None => reject("Please reply with photo, video or document."),
            },
            (UploadState::AwaitingMedia, Input::Media { kind, file_id }) => {
                match self.draft.media_kind {
                    Some(expected) if expected == kind => {
                        self.draft.file_id = Some(file_id.to_string());
                        self.advance(UploadState::AwaitingTitle)
                    }
                    Some(expected) => reject(&format!("Please send a {}, not a {}.", expected, kind)),
                    None => {
                        self.state = UploadState::AwaitingMediaType;
                        reject("Tell me the media type first.")
                    }
                }
            }
            (UploadState::AwaitingMedia, Input::Text(_)) => {
                let kind = self.draft.media_kind.map_or("file", |k| k.as_str());
                reject(&format!("Please send the {} itself.", kind))
            }
            (UploadState::AwaitingTitle, Input::Text(text)) => match non_empty(text) {
                Some(title) => {
                    self.draft.title = Some(title);
                    self.advance(UploadState::AwaitingDescription)
                }
                None => reject("The title cannot be empty."),
            },
            (UploadState::AwaitingDescription, Input::Text(text)) => match non_empty(text) {
                Some(description) => {
                    self.draft.description = Some(description);
                    self.advance(UploadState::AwaitingPrice)
                }
                None => reject("The description cannot be empty."),
            },
            (UploadState::AwaitingPrice, Input::Text(text)) => match parse_count(text) {
                Some(price) => {
                    self.draft.price = Some(price);
                    self.advance(UploadState::AwaitingCategory)
                }
                None => reject("The price must be a whole number of 0 or more."),
            },
            (UploadState::AwaitingCategory, Input::Text(text)) => match non_empty(text) {
                Some(category) => {
                    self.draft.category = Some(category);
                    self.advance(UploadState::AwaitingStock)
                }
                None => reject("The category cannot be empty."),
            },
            (UploadState::AwaitingStock, Input::Text(text)) => match parse_count(text) {
                Some(stock) => {
                    self.draft.stock = Some(stock);
                    self.advance(UploadState::AwaitingConfirmation)
                }
                None => reject("The stock must be a whole number of 0 or more."),
            },
            (UploadState::AwaitingConfirmation, Input::Text(text)) => {
                match text.trim().to_lowercase().as_str() {
                    "yes" | "y" | "confirm" | "publish" => Step::ReadyToPublish,
                    "no" | "n" => {
                        self.state = UploadState::Cancelled;
                        Step::Cancelled
                    }
                    _ => reject("Please reply yes or no."),
                }
            }
            (_, Input::Media { .. }) => reject("I was expecting text, not a file."),
            (UploadState::Published, _) | (UploadState::Cancelled, _) => {
                reject("This upload is already finished.")
            }
        }
    }

    /// Record that the caller published the product
    pub fn mark_published(&mut self) {
        self.state = UploadState::Published;
    }

    fn advance(&mut self, next: UploadState) -> Step {
        self.state = next;
        Step::Advanced(next)
    }
}

fn reject(reason: &str) -> Step {
    Step::Rejected(reason.to_string())
}

fn non_empty(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Non-negative whole number that still fits the stored integer type
fn parse_count(text: &str) -> Option<u64> {
    text.trim()
        .parse::<u64>()
        .ok()
        .filter(|n| i64::try_from(*n).is_ok())
}
