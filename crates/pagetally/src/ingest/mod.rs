//! Print-event and user-roster ingestion.

pub mod error;
pub mod importer;
pub mod reconciler;
pub mod record;
pub mod report;
pub mod resolver;
pub mod roster;

pub use error::{
    IngestError, ParseError, PayloadError, RosterFileError, RosterRowError, ValidationError,
};
pub use importer::RosterImporter;
pub use reconciler::EventReconciler;
pub use record::{
    decode_time_created, ComputerKey, EndpointKey, LooseValue, ParsedPrintEvent, PortKey,
    PrinterKey, RawPrintEvent,
};
pub use report::ImportReport;
pub use resolver::IdentityResolver;
pub use roster::{RosterEntry, RosterRow};
