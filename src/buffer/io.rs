//! `std::io` adapters over [`Buffer`].
//!
//! [`BufWriter`] appends to the buffer's tail so the `rmp` family of
//! encoders can emit MessagePack straight into the segmented storage.
//! [`BufReader`] reads from a shadow position without consuming buffer
//! bytes; the caller decides afterwards how far the real cursor advances,
//! which is what makes frame decoding re-entrant on short input.

use std::io::{self, Read, Write};

use super::{Buffer, BufferIter, Pos};

pub(crate) struct BufWriter<'a> {
    buf: &'a mut Buffer,
}

impl<'a> BufWriter<'a> {
    pub(crate) fn new(buf: &'a mut Buffer) -> Self {
        BufWriter { buf }
    }
}

impl Write for BufWriter<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.add_back(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub(crate) struct BufReader<'a> {
    buf: &'a Buffer,
    pos: Pos,
    consumed: usize,
}

impl<'a> BufReader<'a> {
    /// Reader starting at `itr`; the cursor itself is not touched.
    pub(crate) fn new_at(buf: &'a Buffer, itr: &BufferIter) -> Self {
        BufReader {
            pos: buf.pos(itr),
            buf,
            consumed: 0,
        }
    }

    /// Bytes handed out since creation.
    pub(crate) fn consumed(&self) -> usize {
        self.consumed
    }
}

impl Read for BufReader<'_> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let available = self.buf.distance_pos(self.pos, self.buf.end_pos());
        let n = out.len().min(available);
        if n > 0 {
            self.buf.get_at(self.pos, &mut out[..n]);
            self.pos = Buffer::pos_advanced(self.pos, n);
            self.consumed += n;
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_appends_reader_reads_back() {
        let mut buf = Buffer::new();
        {
            let mut w = BufWriter::new(&mut buf);
            rmp::encode::write_array_len(&mut w, 2).unwrap();
            rmp::encode::write_uint(&mut w, 666).unwrap();
            rmp::encode::write_str(&mut w, "111").unwrap();
        }

        let begin = buf.begin();
        let mut r = BufReader::new_at(&buf, &begin);
        assert_eq!(rmp::decode::read_array_len(&mut r).unwrap(), 2);
        let n: u64 = rmp::decode::read_int(&mut r).unwrap();
        assert_eq!(n, 666);
        let value = rmpv::decode::read_value(&mut r).unwrap();
        assert_eq!(value, rmpv::Value::from("111"));
        assert_eq!(r.consumed(), buf.len());
        buf.release_iter(begin);
    }

    #[test]
    fn reader_does_not_consume_buffer() {
        let mut buf = Buffer::new();
        buf.add_back(&[1, 2, 3]);
        let begin = buf.begin();
        for _ in 0..2 {
            let mut r = BufReader::new_at(&buf, &begin);
            let mut out = [0u8; 3];
            r.read_exact(&mut out).unwrap();
            assert_eq!(out, [1, 2, 3]);
        }
        buf.release_iter(begin);
    }

    #[test]
    fn reader_reports_eof_at_end() {
        let mut buf = Buffer::new();
        buf.add_back(&[1]);
        let begin = buf.begin();
        let mut r = BufReader::new_at(&buf, &begin);
        let mut out = [0u8; 4];
        assert_eq!(r.read(&mut out).unwrap(), 1);
        assert_eq!(r.read(&mut out).unwrap(), 0);
        buf.release_iter(begin);
    }
}
