//! Mail search and side effects (spec §6 `MailStore`). The real Gmail/IMAP
//! glue is out of scope (SPEC_FULL §0); [`InMemoryMailStore`] is the
//! reference implementation used in tests and local development.

pub mod error;
pub mod query;
pub mod store;

pub use error::MailError;
pub use query::MailQuery;
pub use store::{InMemoryMailStore, LabelTarget, MailMessage, MailStore, MailThread};
