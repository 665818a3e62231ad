pub mod anchor;
pub mod directory;
pub mod ledger;
pub mod mission;



pub use anchor::AnchorService;
pub use directory::{match_score, DirectoryError, DirectoryService};
pub use ledger::{LedgerError, LedgerService};
pub use mission::{capabilities_satisfy, MissionError, MissionService};
