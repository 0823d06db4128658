//! Decides whether a message is a report and which attachments are PDFs.
//!
//! Pure predicates, no I/O.

use crate::domain::email::Attachment;

const REPORT_KEYWORD: &str = "report";
const PDF_MIME: &str = "application/pdf";
const PDF_EXTENSION: &str = ".pdf";

/// True iff the subject is present and contains "report" in any case.
pub fn is_report_email(subject: Option<&str>) -> bool {
    match subject {
        Some(s) => s.to_lowercase().contains(REPORT_KEYWORD),
        None => false,
    }
}

pub fn is_pdf_attachment(attachment: &Attachment) -> bool {
    let by_type = attachment
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.trim().eq_ignore_ascii_case(PDF_MIME));
    let by_name = attachment
        .filename
        .as_deref()
        .is_some_and(|name| name.to_lowercase().ends_with(PDF_EXTENSION));
    by_type || by_name
}

/// Qualifying attachments, in message order.
pub fn select_pdf_attachments(attachments: &[Attachment]) -> Vec<&Attachment> {
    attachments.iter().filter(|a| is_pdf_attachment(a)).collect()
}
