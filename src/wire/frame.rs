//! Framing of messages on the daemon connection. Every message, in both directions, is
//!
//! ```ascii
//! 0: header length (u32 BE)
//! 4: bulk data length (u32 BE)
//! 8: header - a sequence of primitive encoded fields, layout depending on the message kind
//! *: bulk data - raw bytes, present only if the bulk data length is not zero
//! ```
//!
//! The bulk data is kept separate from the header so that message bodies are never copied into
//!  an intermediate buffer: outgoing bodies are sent from the caller's slice, and incoming bodies
//!  are read straight into the caller's buffer once the header has told how big they are.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::client::error::{ClientError, ClientResult};
use crate::util::safe_converter::{PrecheckedCast, SafeCast};
use crate::wire::codec;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Precursor {
    pub header_len: u32,
    pub bulk_len: u32,
}

impl Precursor {
    pub const SERIALIZED_LEN: usize = 2 * size_of::<u32>();

    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_u32(self.header_len);
        buf.put_u32(self.bulk_len);
    }

    pub fn to_bytes(&self) -> [u8; Self::SERIALIZED_LEN] {
        let mut result = [0u8; Self::SERIALIZED_LEN];
        self.ser(&mut result.as_mut_slice());
        result
    }

    pub fn deser(buf: &mut impl Buf) -> ClientResult<Precursor> {
        if buf.remaining() < Self::SERIALIZED_LEN {
            return Err(ClientError::Protocol("incomplete precursor".to_string()));
        }
        Ok(Precursor {
            header_len: buf.get_u32(),
            bulk_len: buf.get_u32(),
        })
    }

    pub fn total_len(&self) -> usize {
        Self::SERIALIZED_LEN + self.header_len.safe_cast() + self.bulk_len.safe_cast()
    }
}


/// Header buffers grow as needed. To bound steady-state memory, a buffer that grew beyond
///  `shrink_threshold` (typically due to an occasional big view) is replaced by a fresh one
///  after the message is done.
#[derive(Clone, Copy, Debug)]
pub struct BufferPolicy {
    pub initial_capacity: usize,
    pub shrink_threshold: usize,
    pub shrink_capacity: usize,
}

impl Default for BufferPolicy {
    fn default() -> Self {
        BufferPolicy {
            initial_capacity: 512,
            shrink_threshold: 64 * 1024,
            shrink_capacity: 4 * 1024,
        }
    }
}

impl BufferPolicy {
    fn new_buffer(&self) -> BytesMut {
        BytesMut::with_capacity(self.initial_capacity)
    }

    fn shrink_if_needed(&self, buf: &mut BytesMut) {
        if buf.capacity() > self.shrink_threshold {
            trace!("shrinking header buffer from {} bytes", buf.capacity());
            *buf = BytesMut::with_capacity(self.shrink_capacity);
        }
    }
}


/// The sending half of a daemon connection. A message is built with [FrameWriter::begin_write],
///  followed by writing fields into the returned header buffer, and transmitted by
///  [FrameWriter::end_write].
///
/// If the future returned by `end_write` is dropped before it completes, an unknown part of the
///  frame is on the wire. The daemon would misread everything sent after that, so all further
///  frames are rejected.
pub struct FrameWriter<W> {
    writer: W,
    header: BytesMut,
    in_frame: bool,
    policy: BufferPolicy,
}

impl <W: AsyncWrite + Unpin + Send> FrameWriter<W> {
    pub fn new(writer: W, policy: BufferPolicy) -> FrameWriter<W> {
        FrameWriter {
            writer,
            header: policy.new_buffer(),
            in_frame: false,
            policy,
        }
    }

    /// Resets the header, discarding anything left over from a message that was built but never
    ///  passed to `end_write`.
    pub fn begin_write(&mut self) -> ClientResult<&mut BytesMut> {
        if self.in_frame {
            return Err(ClientError::Protocol("an earlier message was not sent completely, the connection is out of sync".to_string()));
        }
        self.header.clear();
        Ok(&mut self.header)
    }

    /// true if a frame was started on the wire but not completed
    pub fn is_desynchronized(&self) -> bool {
        self.in_frame
    }

    /// Sends precursor, header and `bulk` in that order as a single gathered write. The bulk
    ///  data is referenced rather than copied.
    ///
    /// The caller is responsible for keeping `bulk` within a range that fits the precursor.
    pub async fn end_write(&mut self, bulk: &[u8]) -> ClientResult<Precursor> {
        let precursor = Precursor {
            header_len: self.header.len().prechecked_cast(),
            bulk_len: bulk.len().prechecked_cast(),
        };
        trace!(header_len = precursor.header_len, bulk_len = precursor.bulk_len, "writing frame");

        let precursor_buf = precursor.to_bytes();
        let mut frame = Buf::chain(precursor_buf.as_slice(), &self.header[..])
            .chain(bulk);

        self.in_frame = true;
        let result = self.writer.write_all_buf(&mut frame).await;

        self.header.clear();
        self.policy.shrink_if_needed(&mut self.header);

        result?;
        self.writer.flush().await?;
        self.in_frame = false;
        Ok(precursor)
    }

    pub fn writer_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    #[cfg(test)]
    pub fn header_capacity(&self) -> usize {
        self.header.capacity()
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.writer
    }
}


/// The receiving half of a daemon connection.
///
/// A frame is read in steps: [FrameReader::begin_read] reads precursor and header, field readers
///  consume the header in the order it was written, the bulk data (if any) is read explicitly, and
///  [FrameReader::end_read] verifies that everything was consumed.
///
/// A frame that is not completed - because of an error or because the reading future was dropped -
///  leaves the stream at an unknown position. All subsequent frames are rejected in that case.
pub struct FrameReader<R> {
    reader: R,
    header: BytesMut,
    pos: usize,
    bulk_len: usize,
    bulk_done: bool,
    in_frame: bool,
    max_part_len: usize,
    policy: BufferPolicy,
}

impl <R: AsyncRead + Unpin + Send> FrameReader<R> {
    pub fn new(reader: R, max_part_len: usize, policy: BufferPolicy) -> FrameReader<R> {
        FrameReader {
            reader,
            header: policy.new_buffer(),
            pos: 0,
            bulk_len: 0,
            bulk_done: true,
            in_frame: false,
            max_part_len,
            policy,
        }
    }

    pub fn reader_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// true if a frame was started but not completed
    pub fn is_desynchronized(&self) -> bool {
        self.in_frame
    }

    pub fn bulk_len(&self) -> usize {
        self.bulk_len
    }

    /// Blocks until a complete precursor and header were received. The bulk data is left in the
    ///  stream.
    pub async fn begin_read(&mut self) -> ClientResult<Precursor> {
        if self.in_frame {
            return Err(ClientError::Protocol("an earlier message was not read completely, the connection is out of sync".to_string()));
        }
        self.in_frame = true;

        let mut precursor_buf = [0u8; Precursor::SERIALIZED_LEN];
        self.reader.read_exact(&mut precursor_buf).await?;
        let precursor = Precursor::deser(&mut precursor_buf.as_slice())?;

        let header_len: usize = precursor.header_len.safe_cast();
        let bulk_len: usize = precursor.bulk_len.safe_cast();
        if header_len > self.max_part_len || bulk_len > self.max_part_len {
            return Err(ClientError::Protocol(format!("frame exceeds the configured maximum of {} bytes: header {}, bulk {}", self.max_part_len, header_len, bulk_len)));
        }

        self.header.clear();
        self.header.resize(header_len, 0);
        self.reader.read_exact(&mut self.header[..]).await?;

        self.pos = 0;
        self.bulk_len = bulk_len;
        self.bulk_done = bulk_len == 0;

        trace!(header_len, bulk_len, "received frame header");
        Ok(precursor)
    }

    /// Consumes data from the current position in the header. `f` must not read beyond the
    ///  remainder of the header, which is enforced by handing it only that remainder.
    pub fn read<T>(&mut self, f: impl FnOnce(&mut &[u8]) -> ClientResult<T>) -> ClientResult<T> {
        if !self.in_frame {
            return Err(ClientError::Protocol("reading a header field outside of a message".to_string()));
        }

        let mut remainder = &self.header[self.pos..];
        let before = remainder.len();
        let result = f(&mut remainder)?;
        self.pos += before - remainder.len();
        Ok(result)
    }

    pub fn read_int(&mut self) -> ClientResult<i32> {
        self.read(|buf| codec::read_int(buf))
    }

    pub fn read_bool(&mut self) -> ClientResult<bool> {
        self.read(|buf| codec::read_bool(buf))
    }

    pub fn read_string(&mut self, max_size: usize) -> ClientResult<String> {
        self.read(|buf| codec::read_string(buf, max_size))
    }

    /// Reads the complete bulk data into the start of `buf`, which must be big enough.
    pub async fn read_bulk_into(&mut self, buf: &mut [u8]) -> ClientResult<usize> {
        self.check_bulk_pending()?;
        if buf.len() < self.bulk_len {
            return Err(ClientError::Precondition(format!("receive buffer of {} bytes is too small for a message of {} bytes", buf.len(), self.bulk_len)));
        }

        self.reader.read_exact(&mut buf[..self.bulk_len]).await?;
        self.bulk_done = true;
        Ok(self.bulk_len)
    }

    pub async fn read_bulk(&mut self) -> ClientResult<Bytes> {
        let mut buf = vec![0u8; self.bulk_len];
        self.read_bulk_into(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    /// Reads and discards the bulk data, keeping the stream in sync.
    pub async fn skip_bulk(&mut self) -> ClientResult<()> {
        self.check_bulk_pending()?;

        let expected = self.bulk_len as u64;
        let skipped = tokio::io::copy(&mut AsyncReadExt::take(&mut self.reader, expected), &mut tokio::io::sink()).await?;
        if skipped != expected {
            return Err(ClientError::Transport(std::io::ErrorKind::UnexpectedEof.into()));
        }
        self.bulk_done = true;
        Ok(())
    }

    /// Discards the unread rest of the current frame, header and bulk data, and completes it.
    pub async fn skip_remainder(&mut self) -> ClientResult<()> {
        self.read(|buf| {
            *buf = &[];
            Ok(())
        })?;
        if !self.bulk_done {
            self.skip_bulk().await?;
        }
        self.end_read()
    }

    fn check_bulk_pending(&self) -> ClientResult<()> {
        if !self.in_frame {
            return Err(ClientError::Protocol("reading bulk data outside of a message".to_string()));
        }
        // an empty body can be 'read' any number of times
        if self.bulk_done && self.bulk_len > 0 {
            return Err(ClientError::Protocol("bulk data was already read".to_string()));
        }
        Ok(())
    }

    /// Completes a frame. The header must have been consumed exactly, and bulk data must have been
    ///  read - otherwise the peers disagree on the message layout.
    pub fn end_read(&mut self) -> ClientResult<()> {
        if !self.in_frame {
            return Err(ClientError::Protocol("end of a message that was not started".to_string()));
        }
        if self.pos != self.header.len() {
            return Err(ClientError::Protocol(format!("header length mismatch: read {} of {} bytes", self.pos, self.header.len())));
        }
        if !self.bulk_done {
            return Err(ClientError::Protocol(format!("{} bytes of bulk data were not read", self.bulk_len)));
        }

        self.in_frame = false;
        self.pos = 0;
        self.bulk_len = 0;
        self.policy.shrink_if_needed(&mut self.header);
        Ok(())
    }
}
