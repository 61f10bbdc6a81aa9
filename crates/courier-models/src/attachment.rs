use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: i64,
    pub filename: Option<String>,
    pub mime_type: Option<String>,
    pub transfer_name: Option<String>,
    #[serde(default)]
    pub total_bytes: i64,
}

impl Attachment {
    /// Name suitable for display: the original transfer name, else the
    /// last path component of the stored file.
    pub fn display_name(&self) -> Option<&str> {
        self.transfer_name.as_deref().or_else(|| {
            self.filename
                .as_deref()
                .and_then(|f| f.rsplit('/').next())
                .filter(|f| !f.is_empty())
        })
    }
}
