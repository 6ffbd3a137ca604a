use hermes_core::{ChangedFile, HermesError};
use serde::Serialize;

use crate::llm::ChatMessage;

const REVIEW_INSTRUCTIONS: &str = "\
You are a senior software developer. Analyze the changes made to the repository \
in this pull request and answer in two sections.

## Summary
A concise, direct statement of what the changes achieve for the project, \
covering the integrations and logic they execute.

## Changes of concern
For each concern, give the file name, then the line of code in question, then \
on the next line explain why that logic might be flawed. Be quantitative and \
specific. If nothing is concerning, say so.";

/// One changed file flattened for the prompt.
///
/// # Examples
///
/// ```
/// use hermes_core::ChangedFile;
/// use hermes_review::prompt::FileRecord;
///
/// let file = ChangedFile {
///     filename: "a.go".into(),
///     status: "modified".into(),
///     changes: 3,
///     patch: None,
/// };
/// let record = FileRecord::from(&file);
/// assert_eq!(record.file_info, "a.go (modified)");
/// assert!(record.patch.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord<'a> {
    /// `"<filename> (<status>)"`.
    #[serde(rename = "File Info")]
    pub file_info: String,
    /// Number of changed lines.
    #[serde(rename = "Changes")]
    pub changes: u64,
    /// Unified diff, `null` for binary or oversized files.
    #[serde(rename = "Patch")]
    pub patch: Option<&'a str>,
}

impl<'a> From<&'a ChangedFile> for FileRecord<'a> {
    fn from(file: &'a ChangedFile) -> Self {
        Self {
            file_info: format!("{} ({})", file.filename, file.status),
            changes: file.changes,
            patch: file.patch.as_deref(),
        }
    }
}

/// Serialize the changed files as a JSON array of [`FileRecord`]s, in order.
///
/// # Errors
///
/// Returns [`HermesError::Serialization`] if serialization fails.
pub fn serialize_changes(files: &[ChangedFile]) -> Result<String, HermesError> {
    let records: Vec<FileRecord<'_>> = files.iter().map(FileRecord::from).collect();
    Ok(serde_json::to_string_pretty(&records)?)
}

/// Build the single-turn prompt asking for a summary and a list of concerns.
///
/// # Errors
///
/// Returns [`HermesError::Serialization`] if the file list cannot be serialized.
///
/// # Examples
///
/// ```
/// use hermes_core::ChangedFile;
/// use hermes_review::prompt::build_review_messages;
///
/// let files = vec![ChangedFile {
///     filename: "src/lib.rs".into(),
///     status: "added".into(),
///     changes: 10,
///     patch: Some("@@ -0,0 +1,10 @@".into()),
/// }];
/// let messages = build_review_messages(&files).unwrap();
/// assert_eq!(messages.len(), 1);
/// assert!(messages[0].content.contains("src/lib.rs (added)"));
/// ```
pub fn build_review_messages(files: &[ChangedFile]) -> Result<Vec<ChatMessage>, HermesError> {
    let changes = serialize_changes(files)?;
    let content = format!(
        "{REVIEW_INSTRUCTIONS}\n\nHere are all the changes made in the pull request:\n\n```json\n{changes}\n```\n"
    );
    Ok(vec![ChatMessage::user(content)])
}
