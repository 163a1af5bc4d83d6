/// Generic email message handed to a mail backend.
///
/// Backends translate this into whatever their transport expects; a
/// message is never modified once it has been handed over.
#[derive(Clone, Debug, Default)]
pub struct EmailMessage {
    /// Sender address. Falls back to the backend's default sender.
    pub from_email: Option<String>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    /// Primary body, interpreted according to `content_kind`
    pub body: String,
    pub content_kind: ContentKind,
    /// Alternative renderings of the body (e.g. an HTML version)
    pub alternatives: Vec<Alternative>,
    pub attachments: Vec<Attachment>,
}

/// Kind of the primary message body
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentKind {
    Plain,
    Html,
}

impl Default for ContentKind {
    fn default() -> Self {
        ContentKind::Plain
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Alternative {
    pub content: String,
    pub mimetype: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Attachment {
    /// A named file: `(filename, content, mimetype)`
    File {
        filename: String,
        content: Vec<u8>,
        mimetype: String,
    },

    /// A prebuilt MIME part. Only meaningful to backends that send raw
    /// MIME; HTTP form backends skip it.
    Mime { content_type: String, raw: Vec<u8> },
}

impl EmailMessage {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_sender(mut self, from: impl Into<String>) -> Self {
        self.from_email = Some(from.into());
        self
    }

    pub fn with_recipients(mut self, to: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.to.extend(to.into_iter().map(Into::into));
        self
    }

    pub fn with_cc(mut self, cc: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.cc.extend(cc.into_iter().map(Into::into));
        self
    }

    pub fn with_bcc(mut self, bcc: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.bcc.extend(bcc.into_iter().map(Into::into));
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Set a plain text primary body
    pub fn with_text(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self.content_kind = ContentKind::Plain;
        self
    }

    /// Set an HTML primary body
    pub fn with_html(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self.content_kind = ContentKind::Html;
        self
    }

    pub fn with_alternative(mut self, content: impl Into<String>, mimetype: impl Into<String>) -> Self {
        self.alternatives.push(Alternative {
            content: content.into(),
            mimetype: mimetype.into(),
        });
        self
    }

    pub fn with_attachment(
        mut self,
        filename: impl Into<String>,
        content: impl Into<Vec<u8>>,
        mimetype: impl Into<String>,
    ) -> Self {
        self.attachments.push(Attachment::File {
            filename: filename.into(),
            content: content.into(),
            mimetype: mimetype.into(),
        });
        self
    }

    /// All recipients: to, then cc, then bcc
    pub fn recipients(&self) -> Vec<&str> {
        self.to
            .iter()
            .chain(self.cc.iter())
            .chain(self.bcc.iter())
            .map(String::as_str)
            .collect()
    }

    pub fn has_recipients(&self) -> bool {
        !(self.to.is_empty() && self.cc.is_empty() && self.bcc.is_empty())
    }
}
