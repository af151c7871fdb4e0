//! multipart/form-data body encoding

use crate::boundary::Boundary;
use crate::cancel::CancelHandle;
use crate::error::cancelled_io;
use crate::field::{Field, Payload};
use std::io::{self, ErrorKind, Read, Write};

/// Largest chunk copied from a streaming field in one read/write cycle
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Writes fields as multipart parts straight into an output stream.
///
/// Every part opens with the same boundary; [`MultipartWriter::finish`]
/// writes the closing delimiter and flushes.
pub struct MultipartWriter<'a, W: Write> {
    out: W,
    boundary: &'a Boundary,
    cancel: Option<&'a CancelHandle>,
    chunk: Vec<u8>,
}

impl<'a, W: Write> MultipartWriter<'a, W> {
    /// Create a writer for `boundary` over `out`
    pub fn new(out: W, boundary: &'a Boundary) -> Self {
        Self {
            out,
            boundary,
            cancel: None,
            chunk: Vec::new(),
        }
    }

    /// Stop between fields and chunks once `cancel` fires
    pub fn with_cancel(mut self, cancel: &'a CancelHandle) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Write one part.
    ///
    /// Streaming payloads are drained to end of stream, so a field can only
    /// be written once.
    pub fn write_field(&mut self, field: &mut Field) -> io::Result<()> {
        self.check_cancelled()?;

        match field {
            Field::Plain {
                name,
                mime_type,
                content,
            } => {
                self.write_part_header(name, mime_type, None)?;
                self.out.write_all(content)?;
            }
            Field::File {
                name,
                mime_type,
                file_name,
                payload,
            } => {
                self.write_part_header(name, mime_type, Some(file_name.as_str()))?;
                match payload {
                    Payload::Buffered(content) => self.out.write_all(content)?,
                    Payload::Streaming(reader) => self.copy_stream(reader)?,
                }
            }
        }

        self.out.write_all(b"\r\n")
    }

    /// Write the closing delimiter, flush and hand back the output
    pub fn finish(mut self) -> io::Result<W> {
        self.check_cancelled()?;
        self.out
            .write_all(self.boundary.close_delimiter().as_bytes())?;
        self.out.flush()?;
        Ok(self.out)
    }

    fn write_part_header(
        &mut self,
        name: &str,
        mime_type: &str,
        file_name: Option<&str>,
    ) -> io::Result<()> {
        let mut head = self.boundary.delimiter();
        head.push_str("Content-Disposition: form-data; name=\"");
        head.push_str(name);
        head.push('"');
        if let Some(file_name) = file_name {
            head.push_str("; filename=\"");
            head.push_str(file_name);
            head.push('"');
        }
        head.push_str("\r\nContent-Type: ");
        head.push_str(mime_type);
        head.push_str("\r\n\r\n");

        self.out.write_all(head.as_bytes())
    }

    fn copy_stream(&mut self, reader: &mut (dyn Read + Send)) -> io::Result<()> {
        if self.chunk.is_empty() {
            self.chunk = vec![0; MAX_CHUNK_SIZE];
        }

        let mut copied = 0u64;
        loop {
            self.check_cancelled()?;

            let read = match reader.read(&mut self.chunk) {
                Ok(0) => break,
                Ok(read) => read,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };

            self.out.write_all(&self.chunk[..read])?;
            copied += read as u64;
            tracing::trace!(chunk = read, copied, "Copied stream chunk");
        }

        Ok(())
    }

    fn check_cancelled(&self) -> io::Result<()> {
        match self.cancel {
            Some(cancel) if cancel.is_cancelled() => Err(cancelled_io()),
            _ => Ok(()),
        }
    }
}
