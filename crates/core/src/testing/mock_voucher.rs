//! Mock voucher writer for testing.

use std::sync::{Mutex, MutexGuard};

use crate::issuance::{Voucher, VoucherError, VoucherWriter};
use crate::registry::Ticket;

#[derive(Default)]
struct Inner {
    written: Vec<Voucher>,
    fail: bool,
}

/// Records vouchers in memory. `set_fail(true)` makes every write fail.
#[derive(Default)]
pub struct MockVoucherWriter {
    inner: Mutex<Inner>,
}

impl MockVoucherWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_fail(&self, fail: bool) {
        self.lock().fail = fail;
    }

    pub fn written(&self) -> Vec<Voucher> {
        self.lock().written.clone()
    }
}

impl VoucherWriter for MockVoucherWriter {
    fn write(&self, ticket: &Ticket, voucher: &Voucher) -> Result<String, VoucherError> {
        let mut inner = self.lock();
        if inner.fail {
            return Err(VoucherError::Write("mock printer jammed".to_string()));
        }
        inner.written.push(voucher.clone());
        Ok(format!("mock://{}/{}", ticket.date, ticket.sequence_number))
    }
}
