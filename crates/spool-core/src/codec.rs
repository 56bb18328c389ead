//! Wire format of ready-queue entries and timer-event members.
//!
//! An entry is `{tries: u16}{len: u16}{job_id bytes}`, little-endian, so the
//! store-side scripts can read and write the same bytes with
//! `struct.pack("HHc0", tries, #job_id, job_id)`.

use crate::error::EngineError;

/// Pack `(remaining_tries, job_id)` into an entry.
pub fn pack_entry(tries: u16, job_id: &str) -> Vec<u8> {
    let id = job_id.as_bytes();
    debug_assert!(id.len() <= u16::MAX as usize);
    let mut buf = Vec::with_capacity(4 + id.len());
    buf.extend_from_slice(&tries.to_le_bytes());
    buf.extend_from_slice(&(id.len() as u16).to_le_bytes());
    buf.extend_from_slice(id);
    buf
}

/// Unpack an entry back into `(remaining_tries, job_id)`.
pub fn unpack_entry(data: &[u8]) -> Result<(u16, String), EngineError> {
    if data.len() < 4 {
        return Err(EngineError::Corrupted("entry shorter than its header"));
    }
    let tries = u16::from_le_bytes([data[0], data[1]]);
    let len = u16::from_le_bytes([data[2], data[3]]) as usize;
    let id = &data[4..];
    if id.len() != len {
        return Err(EngineError::Corrupted("entry length mismatch"));
    }
    let id = std::str::from_utf8(id).map_err(|_| EngineError::Corrupted("job id not utf-8"))?;
    Ok((tries, id.to_string()))
}
