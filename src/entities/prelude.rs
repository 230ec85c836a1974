pub use super::case_files::Entity as CaseFiles;
pub use super::draft_files::Entity as DraftFiles;
