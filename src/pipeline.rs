//! Raw message in, [`ProcessingOutcome`] out.

use log::{error, info};

use crate::classify::{is_report_email, select_pdf_attachments};
use crate::domain::email::ParsedMessage;
use crate::domain::report::{ProcessingOutcome, SkipReason};
use crate::error::ParseError;
use crate::mail::parser::MessageParser;
use crate::store::repo::ReportRepository;

pub struct IngestionPipeline {
    parser: Box<dyn MessageParser>,
    store: Box<dyn ReportRepository>,
}

impl IngestionPipeline {
    pub fn new(
        parser: impl MessageParser + 'static,
        store: impl ReportRepository + 'static,
    ) -> Self {
        Self {
            parser: Box::new(parser),
            store: Box::new(store),
        }
    }

    /// Decode, classify and persist one message. Parse failures propagate.
    pub fn process(&self, raw: &[u8]) -> Result<ProcessingOutcome, ParseError> {
        let parsed = self.parser.parse(raw).inspect_err(|e| {
            error!("Error processing email: {e}");
        })?;
        Ok(self.process_parsed(&parsed))
    }

    pub fn process_parsed(&self, message: &ParsedMessage) -> ProcessingOutcome {
        let subject = message.subject.as_deref();
        info!(
            "Processing email - From: {}, Subject: {}",
            message.from,
            subject.unwrap_or("(none)")
        );

        if !is_report_email(subject) {
            info!(
                "Email subject {:?} does not contain \"report\" - skipping",
                subject.unwrap_or_default()
            );
            return ProcessingOutcome::skipped(SkipReason::SubjectMismatch);
        }

        let pdfs = select_pdf_attachments(&message.attachments);
        if pdfs.is_empty() {
            info!("No PDF attachments found in email");
            return ProcessingOutcome::skipped(SkipReason::NoPdfAttachments);
        }

        let email_info = message.info();
        let mut saved_files = Vec::with_capacity(pdfs.len());
        for attachment in pdfs {
            match self.store.save(attachment, &email_info) {
                Ok(saved) => saved_files.push(saved),
                Err(e) => error!(
                    "Failed to save attachment {}: {e}",
                    attachment.filename.as_deref().unwrap_or("(unnamed)")
                ),
            }
        }

        info!("Successfully processed {} PDF attachments", saved_files.len());
        ProcessingOutcome::Processed {
            saved_files,
            email_info,
        }
    }
}
