pub mod line;

/// A text message received from the chat platform
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    /// Platform-specific user ID, when the source exposes one
    pub user_id: Option<String>,
    /// One-time token for answering this delivery
    pub reply_token: String,
    /// The message text, untrimmed
    pub text: String,
    /// Set when the platform is retrying a delivery it already made
    pub is_redelivery: bool,
}
