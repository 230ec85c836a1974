pub mod prelude;

pub mod case_files;
pub mod draft_files;
