use chrono::{DateTime, Utc};
use log::warn;
use mailparse::{DispositionType, MailHeaderMap, MailParseError, ParsedMail};

use crate::domain::email::{Attachment, ParsedMessage};
use crate::error::ParseError;

/// Turns a raw RFC 822 buffer into a [`ParsedMessage`].
pub trait MessageParser: Send + Sync {
    fn parse(&self, raw: &[u8]) -> Result<ParsedMessage, ParseError>;
}

/// Parser backed by the `mailparse` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct MailparseParser;

impl MessageParser for MailparseParser {
    fn parse(&self, raw: &[u8]) -> Result<ParsedMessage, ParseError> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Err(ParseError::Empty);
        }

        let parsed = mailparse::parse_mail(raw)?;
        if parsed.headers.is_empty() {
            return Err(ParseError::NoHeaders);
        }

        let from = parsed
            .headers
            .get_first_value("From")
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        let subject = parsed
            .headers
            .get_first_value("Subject")
            .map(|s| s.trim().to_string());
        let date = parsed
            .headers
            .get_first_value("Date")
            .and_then(|d| mailparse::dateparse(&d).ok())
            .and_then(|epoch| DateTime::<Utc>::from_timestamp(epoch, 0));

        let mut attachments = Vec::new();
        collect_attachments(&parsed, &mut attachments);

        Ok(ParsedMessage {
            from,
            subject,
            date,
            attachments,
        })
    }
}

// Depth-first, document order.
fn collect_attachments(part: &ParsedMail, out: &mut Vec<Attachment>) {
    if !part.subparts.is_empty() {
        for sp in &part.subparts {
            collect_attachments(sp, out);
        }
        return;
    }

    let disposition = part.get_content_disposition();
    let filename = disposition
        .params
        .get("filename")
        .or_else(|| part.ctype.params.get("name"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    let mime = part.ctype.mimetype.to_ascii_lowercase();

    let is_attachment = matches!(disposition.disposition, DispositionType::Attachment)
        || filename.is_some()
        || !(mime.starts_with("text/") || mime.starts_with("multipart/"));
    if !is_attachment {
        return;
    }

    let Some(content) = decoded_or_skip(filename.as_deref(), &mime, part.get_body_raw()) else {
        return;
    };
    out.push(Attachment {
        filename,
        content_type: Some(mime),
        content,
    });
}

/// A part whose transfer encoding cannot be decoded is dropped, not the message.
fn decoded_or_skip(
    filename: Option<&str>,
    mime: &str,
    body: Result<Vec<u8>, MailParseError>,
) -> Option<Vec<u8>> {
    match body {
        Ok(content) => Some(content),
        Err(e) => {
            warn!(
                "Skipping undecodable {} part {}: {e}",
                mime,
                filename.unwrap_or("(unnamed)")
            );
            None
        }
    }
}
