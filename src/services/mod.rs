pub mod chat;
pub mod classify;
pub mod context;
pub mod draft;
pub mod edit_parse;
pub mod persistence;
pub mod range_edit;
pub mod router;
