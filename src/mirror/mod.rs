//! Incident mirroring: rendering, reconciliation against the feed, and
//! archiving of the local mapping.

pub mod archiver;
pub mod formatter;
pub mod reconciler;

pub use archiver::{ArchiveReport, Archiver};
pub use formatter::embed_from_incident;
pub use reconciler::{CheckReport, Reconciler};
