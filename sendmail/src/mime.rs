use mailparse::{addrparse, DispositionType, MailAddr, MailHeaderMap, MailParseError, ParsedMail};

use mailgun_backend::{Attachment, EmailMessage};

/// Bodies and attachments collected while walking the MIME tree
#[derive(Default, Debug)]
struct Parts {
    text: Option<String>,
    html: Option<String>,
    attachments: Vec<Attachment>,
}

/// Convert a raw RFC 5322 message into an `EmailMessage`.
///
/// Recipients are taken from the `To`, `Cc` and `Bcc` headers; callers
/// that get their recipients elsewhere should replace them.
pub fn from_mime(content: &[u8]) -> Result<EmailMessage, MailParseError> {
    let parsed = mailparse::parse_mail(content)?;

    let mut mail = EmailMessage::new();
    mail.from_email = header_addresses(&parsed, "From").into_iter().next();
    mail.subject = parsed.headers.get_first_value("Subject").unwrap_or_default();
    mail.to = header_addresses(&parsed, "To");
    mail.cc = header_addresses(&parsed, "Cc");
    mail.bcc = header_addresses(&parsed, "Bcc");

    let mut parts = Parts::default();
    walk(&parsed, &mut parts)?;

    // Plain text is the primary body when there is one
    mail = match (parts.text, parts.html) {
        (Some(text), Some(html)) => mail.with_text(text).with_alternative(html, "text/html"),
        (Some(text), None) => mail.with_text(text),
        (None, Some(html)) => mail.with_html(html),
        (None, None) => mail,
    };
    mail.attachments = parts.attachments;

    Ok(mail)
}

/// All mailboxes in the named header. Values that do not parse are logged
/// and skipped, since `-f` and command line recipients replace them.
fn header_addresses(parsed: &ParsedMail, name: &str) -> Vec<String> {
    let mut out = Vec::new();

    for value in parsed.headers.get_all_values(name) {
        match addresses(&value) {
            Ok(found) => out.extend(found),
            Err(e) => log::warn!("Skipping unparsable {} header {:?}: {}", name, value, e),
        }
    }

    out
}

/// Split an address header into individual mailboxes, flattening groups
fn addresses(value: &str) -> Result<Vec<String>, MailParseError> {
    let mut out = Vec::new();

    for addr in addrparse(value)?.iter() {
        match addr {
            MailAddr::Single(info) => out.push(format_mailbox(info)),
            MailAddr::Group(group) => out.extend(group.addrs.iter().map(format_mailbox)),
        }
    }

    Ok(out)
}

fn format_mailbox(info: &mailparse::SingleInfo) -> String {
    match &info.display_name {
        Some(name) if !name.is_empty() => format!(
            "\"{}\" <{}>",
            name.replace('\\', "\\\\").replace('"', "\\\""),
            info.addr
        ),
        _ => info.addr.clone(),
    }
}

/// Recursively walk the MIME parts: first text/plain and text/html parts
/// are the bodies, anything with an attachment disposition is collected.
fn walk(part: &ParsedMail, parts: &mut Parts) -> Result<(), MailParseError> {
    if let Some(attachment) = attachment_from(part)? {
        parts.attachments.push(attachment);
        return Ok(());
    }

    let mimetype = part.ctype.mimetype.as_str();

    if mimetype == "text/plain" {
        if parts.text.is_none() {
            parts.text = Some(part.get_body()?);
        }
    } else if mimetype == "text/html" {
        if parts.html.is_none() {
            parts.html = Some(part.get_body()?);
        }
    } else if mimetype.starts_with("multipart/") {
        for subpart in &part.subparts {
            walk(subpart, parts)?;
        }
    } else {
        log::debug!("Skipping {} part without disposition", mimetype);
    }

    Ok(())
}

/// Inspect part headers to determine if this is an attachment.
/// Inline text parts are treated as body, not attachments.
fn attachment_from(part: &ParsedMail) -> Result<Option<Attachment>, MailParseError> {
    if part.headers.get_first_value("Content-Disposition").is_none() {
        return Ok(None);
    }

    let disposition = part.get_content_disposition();
    let mimetype = &part.ctype.mimetype;

    match disposition.disposition {
        DispositionType::Attachment => (),
        DispositionType::Inline if !mimetype.starts_with("text/") => (),
        _ => return Ok(None),
    }

    let filename = disposition
        .params
        .get("filename")
        .or_else(|| part.ctype.params.get("name"))
        .cloned()
        .unwrap_or_else(|| "attachment".to_string());

    Ok(Some(Attachment::File {
        filename,
        content: part.get_body_raw()?,
        mimetype: mimetype.clone(),
    }))
}
