//! plainboard core: boards, columns, tasks and agenda items stored as
//! markdown files with YAML front-matter, kept in sync with external edits
//! by a polling snapshot watcher.

pub mod config;
pub mod engine;
pub mod frontmatter;
pub mod fs;
pub mod layout;
pub mod slug;
pub mod storage;
pub mod types;
pub mod watcher;

pub use engine::Engine;
