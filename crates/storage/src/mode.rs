//! Transaction mode and options (§4.H/§6): chosen when a transaction begins,
//! ported from jogasaki's `transaction_option`/`transaction_type` pairing
//! (occ / long / read-only, each with optional write-preserve and read-area
//! declarations).

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionMode {
    /// Optimistic concurrency control.
    Occ,
    /// Long (pessimistic) transaction, requires write-preserve declarations
    /// for every storage it intends to write.
    Ltx,
    /// Read-only transaction.
    Rtx,
}

#[derive(Debug, Clone, Default)]
pub struct TransactionOptions {
    pub write_preserve: Vec<String>,
    pub read_area_inclusive: Vec<String>,
    pub read_area_exclusive: Vec<String>,
    /// Lower numbers are prioritized ahead of higher numbers when two LTXs
    /// conflict (S4's "low-priority tx" / "higher-priority tx" scenario).
    pub priority: i32,
}
