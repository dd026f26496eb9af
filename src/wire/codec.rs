//! Primitive encodings shared by all downcalls and upcalls. Everything is in network byte order:
//!
//! ```ascii
//! int:     4 bytes, big-endian two's complement
//! bool:    int 0 or 1 (any non-zero value decodes as true)
//! string:  int length, followed by that many raw bytes - no padding, no terminator. An empty
//!           string is encoded as length 0, and there is no way to tell 'empty' from 'absent'
//! array:   int count, followed by that many encoded elements
//! ```

use bytes::{Buf, BufMut, Bytes};

use crate::client::error::{ClientError, ClientResult};
use crate::util::safe_converter::PrecheckedCast;

pub const INT_SIZE: usize = size_of::<i32>();

pub fn write_int(buf: &mut impl BufMut, value: i32) {
    buf.put_i32(value);
}

pub fn write_bool(buf: &mut impl BufMut, value: bool) {
    write_int(buf, if value { 1 } else { 0 });
}

pub fn write_byte_string(buf: &mut impl BufMut, bytes: &[u8]) {
    if bytes.is_empty() {
        write_int(buf, 0);
    }
    else {
        write_int(buf, bytes.len().prechecked_cast());
        buf.put_slice(bytes);
    }
}

pub fn write_c_string(buf: &mut impl BufMut, text: &str) {
    write_byte_string(buf, text.as_bytes());
}

pub fn write_int_array(buf: &mut impl BufMut, values: &[i32]) {
    write_int(buf, values.len().prechecked_cast());
    for &v in values {
        write_int(buf, v);
    }
}

pub fn write_string_array<S: AsRef<str>>(buf: &mut impl BufMut, values: &[S]) {
    write_int(buf, values.len().prechecked_cast());
    for v in values {
        write_c_string(buf, v.as_ref());
    }
}


pub fn read_int(buf: &mut impl Buf) -> ClientResult<i32> {
    if buf.remaining() < INT_SIZE {
        return Err(ClientError::Protocol(format!("header underflow: expected an int, {} bytes left", buf.remaining())));
    }
    Ok(buf.get_i32())
}

pub fn read_bool(buf: &mut impl Buf) -> ClientResult<bool> {
    Ok(read_int(buf)? != 0)
}

/// Reads a length-prefixed byte string, rejecting it *before* touching its body if the declared
///  length exceeds `max_size`.
pub fn read_byte_string(buf: &mut impl Buf, max_size: usize) -> ClientResult<Bytes> {
    let declared = read_int(buf)?;
    let len = usize::try_from(declared)
        .map_err(|_| ClientError::Protocol(format!("negative string length {}", declared)))?;

    if len > max_size {
        return Err(ClientError::Protocol(format!("string of {} bytes exceeds its maximum of {} bytes", len, max_size)));
    }
    if buf.remaining() < len {
        return Err(ClientError::Protocol(format!("header underflow: string of {} bytes, {} bytes left", len, buf.remaining())));
    }
    Ok(buf.copy_to_bytes(len))
}

pub fn read_string(buf: &mut impl Buf, max_size: usize) -> ClientResult<String> {
    let raw = read_byte_string(buf, max_size)?;
    String::from_utf8(raw.to_vec())
        .map_err(|e| ClientError::Protocol(format!("string is not valid UTF-8: {}", e)))
}

/// Reads an array of strings whose element count is known in advance (e.g. from a view's member
///  count) - a different count on the wire means the peers disagree on the message layout.
pub fn read_string_array(buf: &mut impl Buf, expected_len: usize, max_size: usize) -> ClientResult<Vec<String>> {
    let declared = read_int(buf)?;
    if usize::try_from(declared).ok() != Some(expected_len) {
        return Err(ClientError::Protocol(format!("array has {} elements, expected {}", declared, expected_len)));
    }

    // every element takes at least its length prefix
    let mut result = Vec::with_capacity(expected_len.min(buf.remaining() / INT_SIZE));
    for _ in 0..expected_len {
        result.push(read_string(buf, max_size)?);
    }
    Ok(result)
}
