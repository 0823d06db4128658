use crate::domain::email::{Attachment, EmailInfo};
use crate::domain::report::SavedFile;
use crate::error::StorageError;

/// Durable destination for selected report attachments.
pub trait ReportRepository: Send + Sync {
    /// Persist one attachment. Must never overwrite an existing report.
    fn save(&self, attachment: &Attachment, message: &EmailInfo) -> Result<SavedFile, StorageError>;
}

impl<T: ReportRepository + ?Sized> ReportRepository for std::sync::Arc<T> {
    fn save(&self, attachment: &Attachment, message: &EmailInfo) -> Result<SavedFile, StorageError> {
        (**self).save(attachment, message)
    }
}
