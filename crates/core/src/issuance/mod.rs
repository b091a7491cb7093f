//! Ticket issuance.

mod issuer;
mod voucher;

pub use issuer::{IssueError, IssueOutcome, TicketIssuer};
pub use voucher::{FsVoucherWriter, Voucher, VoucherError, VoucherWriter};
