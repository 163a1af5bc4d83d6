//! Mail backend that delivers messages through the Mailgun HTTP API
//! instead of SMTP.
//!
//! ```no_run
//! use mailgun_backend::{BackendOptions, EmailMessage, MailBackend, MailgunBackend};
//!
//! # fn main() -> Result<(), mailgun_backend::Error> {
//! let mut backend = MailgunBackend::from_env(BackendOptions::new())?;
//!
//! let mail = EmailMessage::new()
//!     .with_sender("Robot <robot@example.com>")
//!     .with_recipients(vec!["user@example.com"])
//!     .with_subject("Hello")
//!     .with_text("Hello there!")
//!     .with_alternative("<p>Hello there!</p>", "text/html");
//!
//! let sent = backend.send_messages(&[mail])?;
//! assert_eq!(sent, Some(1));
//! # Ok(())
//! # }
//! ```

pub mod address;
pub mod backend;
pub mod config;
pub mod error;
pub mod message;
pub mod request;
pub mod transport;

pub use backend::{MailBackend, MailgunBackend};
pub use crate::config::{load_settings, BackendOptions, Settings};
pub use error::Error;
pub use message::{Alternative, Attachment, ContentKind, EmailMessage};
pub use request::MessageRequest;
pub use transport::{ApiResponse, HttpTransport, Transport};

pub use reqwest::StatusCode;
