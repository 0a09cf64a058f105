//! Memoryless integrity verification.
//!
//! A value written in check mode was derived entirely from its key id,
//! so the expected bytes can be regenerated on read-back instead of
//! being remembered. A detected mismatch means the server corrupted
//! data and the whole run is worthless, so it is fatal.

use log::error;

use crate::error::ClientError;
use crate::protocol::Reply;
use crate::rc4::Rc4;

/// Re-derive the exact value check-mode synthesis produced for `key`.
pub fn expected_value(key: u64, datasize_min: u64, datasize_max: u64) -> Vec<u8> {
    let mut rc4 = Rc4::new(key);
    let len = rc4.between(datasize_min, datasize_max) as usize;
    let mut buf = vec![0u8; len];
    rc4.fill(&mut buf);
    buf
}

/// Verify the reply of a completed read against the regenerated
/// content. `Nil` means the key does not exist: by default that is
/// nothing to check (the key may simply never have been written),
/// unless `fail_on_missing` upgrades it to a finding.
pub fn verify_read(
    key: u64,
    reply: &Reply,
    datasize_min: u64,
    datasize_max: u64,
    fail_on_missing: bool,
) -> Result<(), ClientError> {
    match reply {
        Reply::Bulk(actual) => {
            let expected = expected_value(key, datasize_min, datasize_max);
            if actual.len() != expected.len() {
                error!(
                    "len mismatch for key string:{}: {} instead of {}",
                    key,
                    actual.len(),
                    expected.len()
                );
                return Err(ClientError::Corrupt {
                    key,
                    expected_len: expected.len(),
                    actual_len: actual.len(),
                });
            }
            if *actual != expected {
                error!("data mismatch for key string:{}", key);
                return Err(ClientError::Corrupt {
                    key,
                    expected_len: expected.len(),
                    actual_len: actual.len(),
                });
            }
            Ok(())
        }
        Reply::Nil if fail_on_missing => Err(ClientError::Missing { key }),
        _ => Ok(()),
    }
}
