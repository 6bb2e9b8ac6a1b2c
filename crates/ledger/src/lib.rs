//! Points ledger domain (family records, child ledgers, balances, history).
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod balance;
pub mod entry;
pub mod export;
pub mod family;
pub mod history;
pub mod ledger;

pub use balance::Balance;
pub use entry::{Deed, EntryKind, LedgerEntry, Redemption, StoredEntry};
pub use export::{history_to_csv, ExportError, CSV_HEADER};
pub use family::{Child, DeedType, DollarRate, Parent, MAX_DOLLAR_PER_POINT};
pub use history::{History, HistoryEntry, HistoryIter};
pub use ledger::{resolve_points, ChildLedger, LedgerCommand, RecordDeed, RedeemPoints};
