use crate::address::sanitize_address;
use crate::message::{Attachment, ContentKind, EmailMessage};
use crate::Error;

/// Sender used when neither the message nor the settings name one
pub const FALLBACK_FROM: &str = "webmaster@localhost";

/// A file part of a Mailgun `messages` request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilePart {
    pub filename: String,
    pub content: Vec<u8>,
    pub mimetype: String,
}

/// Form-encoded body of a single Mailgun `messages` request.
///
/// Fields keep their insertion order and may repeat (one `to` field per
/// recipient, and so on). Every file part is sent under the `attachment`
/// field name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageRequest {
    pub fields: Vec<(&'static str, String)>,
    pub files: Vec<FilePart>,
}

impl MessageRequest {
    /// Translate an `EmailMessage` into request fields and file parts.
    ///
    /// `default_from` is used when the message has no sender of its own.
    pub fn from_message(mail: &EmailMessage, default_from: Option<&str>) -> Result<Self, Error> {
        let from = mail
            .from_email
            .as_deref()
            .or(default_from)
            .unwrap_or(FALLBACK_FROM);

        let (text, html) = bodies(mail);

        let mut req = MessageRequest::new();

        req.push("from", sanitize_address(from)?);
        for &(name, addresses) in [("to", &mail.to), ("cc", &mail.cc), ("bcc", &mail.bcc)].iter() {
            for address in addresses {
                req.push(name, sanitize_address(address)?);
            }
        }
        req.push("subject", mail.subject.clone());

        if let Some(text) = text {
            req.push("text", text.to_string());
        }

        if let Some(html) = html {
            req.push("html", html.to_string());
        }

        for attachment in &mail.attachments {
            match attachment {
                Attachment::File {
                    filename,
                    content,
                    mimetype,
                } => req.files.push(FilePart {
                    filename: filename.clone(),
                    content: content.clone(),
                    mimetype: mimetype.clone(),
                }),
                Attachment::Mime { content_type, .. } => {
                    log::debug!("Skipping prebuilt MIME attachment ({})", content_type);
                }
            }
        }

        Ok(req)
    }

    pub fn new() -> Self {
        Default::default()
    }

    pub fn push(&mut self, name: &'static str, value: String) {
        self.fields.push((name, value));
    }

    /// First value of a field, if present
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    /// All values of a (possibly repeated) field, in order
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn num_recipients(&self) -> usize {
        self.fields
            .iter()
            .filter(|(k, _)| matches!(*k, "to" | "cc" | "bcc"))
            .count()
    }
}

/// Pick the text and HTML parts of a message.
///
/// The primary body fills the slot matching its kind. An HTML alternative
/// always takes the html slot (the last one wins); the text slot is only
/// ever filled from the primary body. Empty bodies leave their slot unset.
fn bodies(mail: &EmailMessage) -> (Option<&str>, Option<&str>) {
    let body = Some(mail.body.as_str()).filter(|b| !b.is_empty());

    let (text, mut html) = match mail.content_kind {
        ContentKind::Plain => (body, None),
        ContentKind::Html => (None, body),
    };

    for alternative in &mail.alternatives {
        if alternative.mimetype == "text/html" {
            html = Some(alternative.content.as_str());
        }
    }

    (text, html)
}
