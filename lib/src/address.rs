use base64::{engine::general_purpose::STANDARD, Engine as _};
use mailparse::{addrparse, MailAddr, SingleInfo};

use crate::Error;

/// Charset label used for RFC 2047 encoded words
const HEADER_CHARSET: &str = "utf-8";

/// Longest encoded word RFC 2047 allows
const MAX_WORD_LEN: usize = 75;

/// Characters that force a display name to be quoted
const NAME_SPECIALS: &[char] = &['(', ')', '<', '>', '@', ',', ':', ';', '.', '"', '[', ']', '\\'];

/// Local part of an address, as written in the input
#[derive(Debug, PartialEq)]
enum LocalPart<'a> {
    Atom(&'a str),
    /// Content of a quoted string, escapes removed
    Quoted(String),
}

/// Normalize `Name <local@domain>` or a bare `local@domain` into the form
/// expected in a mail header.
///
/// Non-ASCII display names and local parts become RFC 2047 encoded words,
/// non-ASCII domains are converted to their IDNA form and names with
/// special characters are quoted.
pub fn sanitize_address(raw: &str) -> Result<String, Error> {
    if raw.contains('\r') || raw.contains('\n') {
        return Err(Error::InvalidAddress(format!(
            "address parts cannot contain newlines: {:?}",
            raw
        )));
    }

    let (name, spec) = match split_quoted_mailbox(raw) {
        Some((name_part, spec)) => (display_name_of(name_part, raw)?, spec.to_string()),
        None => {
            let single = single_mailbox(raw, raw)?;
            (single.display_name, single.addr)
        }
    };

    let (local, domain) = split_addr_spec(&spec, raw)?;
    let addr_spec = format!("{}@{}", encode_local_part(&local), encode_domain(domain, raw)?);

    let name = name.as_deref().map(str::trim).unwrap_or("");
    if name.is_empty() {
        return Ok(addr_spec);
    }

    Ok(format!("{} <{}>", encode_display_name(name), addr_spec))
}

fn single_mailbox(input: &str, raw: &str) -> Result<SingleInfo, Error> {
    let parsed = addrparse(input).map_err(|e| Error::InvalidAddress(format!("{}: {}", raw, e)))?;

    let mut mailboxes = parsed.iter();
    match (mailboxes.next(), mailboxes.next()) {
        (Some(MailAddr::Single(info)), None) => Ok(info.clone()),
        (Some(MailAddr::Group(_)), None) => {
            Err(Error::InvalidAddress(format!("groups are not allowed: {}", raw)))
        }
        (Some(_), Some(_)) => Err(Error::InvalidAddress(format!("expected a single address: {}", raw))),
        (None, _) => Err(Error::InvalidAddress(format!("empty address: {:?}", raw))),
    }
}

/// Split off an addr-spec with a quoted local part, which `addrparse`
/// does not understand. Returns the text before the address and the
/// addr-spec itself.
fn split_quoted_mailbox(raw: &str) -> Option<(&str, &str)> {
    let trimmed = raw.trim();

    if trimmed.starts_with('"') {
        let close = closing_quote(trimmed)?;
        if trimmed[close + 1..].starts_with('@') {
            return Some(("", trimmed));
        }
    }

    if trimmed.ends_with('>') {
        let open = trimmed.rfind("<\"")?;
        return Some((&trimmed[..open], &trimmed[open + 1..trimmed.len() - 1]));
    }

    None
}

/// Display name in front of an angle-bracket address, if any
fn display_name_of(name_part: &str, raw: &str) -> Result<Option<String>, Error> {
    let name_part = name_part.trim();
    if name_part.is_empty() {
        return Ok(None);
    }

    let placeholder = format!("{} <name@example.invalid>", name_part);
    Ok(single_mailbox(&placeholder, raw)?.display_name)
}

/// Byte index of the quote closing the quoted string `s` starts with
fn closing_quote(s: &str) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in s.char_indices().skip(1) {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => return Some(i),
            _ => (),
        }
    }
    None
}

fn split_addr_spec<'a>(spec: &'a str, raw: &str) -> Result<(LocalPart<'a>, &'a str), Error> {
    let invalid = || Error::InvalidAddress(format!("not a valid mailbox: {}", raw));

    let (local, domain) = if spec.starts_with('"') {
        let close = closing_quote(spec).ok_or_else(invalid)?;
        let domain = spec[close + 1..].strip_prefix('@').ok_or_else(invalid)?;
        (LocalPart::Quoted(unescape_quoted(&spec[1..close])), domain)
    } else {
        let (local, domain) = spec.split_once('@').ok_or_else(invalid)?;
        if !is_dot_atom(local) {
            return Err(invalid());
        }
        (LocalPart::Atom(local), domain)
    };

    let bad_domain_char = |c: char| c.is_whitespace() || "()<>@,:;\"\\".contains(c);
    if domain.is_empty() || domain.contains(bad_domain_char) {
        return Err(invalid());
    }

    Ok((local, domain))
}

/// `atext` runs separated by single dots; non-ASCII text counts as atext
fn is_dot_atom(s: &str) -> bool {
    !s.is_empty()
        && s.split('.').all(|atom| {
            !atom.is_empty() && !atom.contains(|c: char| c.is_whitespace() || c.is_control() || NAME_SPECIALS.contains(&c))
        })
}

fn encode_display_name(name: &str) -> String {
    if !name.is_ascii() {
        return encode_word(name);
    }

    if name.contains(NAME_SPECIALS) {
        format!("\"{}\"", escape_quoted(name))
    } else {
        name.to_string()
    }
}

fn encode_local_part(local: &LocalPart) -> String {
    let text = match local {
        LocalPart::Atom(text) => *text,
        LocalPart::Quoted(text) => text.as_str(),
    };

    if !text.is_ascii() {
        return encode_word(text);
    }

    if is_dot_atom(text) {
        text.to_string()
    } else {
        format!("\"{}\"", escape_quoted(text))
    }
}

fn encode_domain(domain: &str, raw: &str) -> Result<String, Error> {
    if domain.is_ascii() {
        return Ok(domain.to_string());
    }

    match url::Host::parse(domain) {
        Ok(url::Host::Domain(ascii)) => Ok(ascii),
        _ => Err(Error::InvalidAddress(format!("bad domain in {}", raw))),
    }
}

fn escape_quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '\\' || c == '"' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn unescape_quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            c => out.push(c),
        }
    }
    out
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum WordEncoding {
    Q,
    B,
}

impl WordEncoding {
    fn label(self) -> char {
        match self {
            WordEncoding::Q => 'q',
            WordEncoding::B => 'b',
        }
    }

    fn encoded_len(self, bytes: &[u8]) -> usize {
        match self {
            WordEncoding::Q => bytes.iter().map(|&b| if is_q_safe(b) || b == b' ' { 1 } else { 3 }).sum(),
            WordEncoding::B => (bytes.len() + 2) / 3 * 4,
        }
    }

    fn word(self, bytes: &[u8]) -> String {
        let payload = match self {
            WordEncoding::Q => q_encode(bytes),
            WordEncoding::B => STANDARD.encode(bytes),
        };
        format!("=?{}?{}?{}?=", HEADER_CHARSET, self.label(), payload)
    }
}

/// RFC 2047 encoded words, picking whichever of the Q and B encodings is
/// shorter (Q on ties). Long text is split on character boundaries into
/// several space separated words of at most 75 characters each.
fn encode_word(text: &str) -> String {
    let bytes = text.as_bytes();

    let encoding = if WordEncoding::B.encoded_len(bytes) < WordEncoding::Q.encoded_len(bytes) {
        WordEncoding::B
    } else {
        WordEncoding::Q
    };

    // "=?" charset "?x?" payload "?="
    let budget = MAX_WORD_LEN - HEADER_CHARSET.len() - 7;

    let mut words = Vec::new();
    let mut start = 0;
    let mut end = 0;
    for (i, c) in text.char_indices() {
        let next = i + c.len_utf8();
        if end > start && encoding.encoded_len(&bytes[start..next]) > budget {
            words.push(encoding.word(&bytes[start..end]));
            start = end;
        }
        end = next;
    }
    if end > start {
        words.push(encoding.word(&bytes[start..end]));
    }

    words.join(" ")
}

fn is_q_safe(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"-!*+/".contains(&b)
}

fn q_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for &b in bytes {
        if b == b' ' {
            out.push('_');
        } else if is_q_safe(b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("={:02X}", b));
        }
    }
    out
}
