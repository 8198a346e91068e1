//! Credit Ledger (C3): per-key enabled flag, quota, and atomic debit on
//! accepted requests (spec §4.3).

mod ledger;

pub use ledger::{Authorization, CreditLedger, DebitOutcome};
