//! Block and vocabulary dump format. All integers little-endian.
//!
//! ```text
//! block file:  i64 doc_count
//!              i64 offsets[doc_count + 1]     (in i32 units into the buffer)
//!              i32 buffer[offsets[doc_count]] (per doc: cursor, w0, t0, w1, t1, ...)
//!
//! vocab file:  i32 vocab_size
//!              i32 word_ids[vocab_size]
//!              i32 global_tf[vocab_size]
//!              i32 local_tf[vocab_size]
//! ```

use std::io::{self, Read, Write};

use crate::meta::LocalVocab;

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

fn read_i64<R: Read>(r: &mut R) -> io::Result<i64> {
    let mut b = [0u8; 8];
    r.read_exact(&mut b)?;
    Ok(i64::from_le_bytes(b))
}

fn read_i32<R: Read>(r: &mut R) -> io::Result<i32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(i32::from_le_bytes(b))
}

// Grows as data arrives so a lying header fails at EOF instead of allocating.
fn read_i32s<R: Read>(r: &mut R, n: usize) -> io::Result<Vec<i32>> {
    let mut out = Vec::with_capacity(n.min(1 << 16));
    for _ in 0..n {
        out.push(read_i32(r)?);
    }
    Ok(out)
}

fn write_i32s<W: Write>(w: &mut W, xs: &[i32]) -> io::Result<()> {
    for x in xs {
        w.write_all(&x.to_le_bytes())?;
    }
    Ok(())
}

pub fn write_block<W: Write>(w: &mut W, offsets: &[i64], buf: &[i32]) -> io::Result<()> {
    let doc_count = offsets.len().saturating_sub(1) as i64;
    w.write_all(&doc_count.to_le_bytes())?;
    for off in offsets {
        w.write_all(&off.to_le_bytes())?;
    }
    write_i32s(w, buf)?;
    w.flush()
}

/// Returns `(offsets, buffer)`. Offsets must start at 0 and never decrease.
pub fn read_block<R: Read>(r: &mut R) -> io::Result<(Vec<i64>, Vec<i32>)> {
    let doc_count = read_i64(r)?;
    if doc_count < 0 {
        return Err(invalid(format!("negative document count {doc_count}")));
    }
    let mut offsets = Vec::with_capacity((doc_count as usize + 1).min(1 << 16));
    for _ in 0..=doc_count {
        offsets.push(read_i64(r)?);
    }
    if offsets[0] != 0 {
        return Err(invalid(format!("first offset is {}, expected 0", offsets[0])));
    }
    if offsets.windows(2).any(|o| o[1] < o[0]) {
        return Err(invalid("offsets decrease"));
    }
    let len = offsets[doc_count as usize];
    let buf = read_i32s(r, len as usize)?;
    Ok((offsets, buf))
}

pub fn write_vocab<W: Write>(w: &mut W, vocab: &LocalVocab) -> io::Result<()> {
    w.write_all(&(vocab.len() as i32).to_le_bytes())?;
    write_i32s(w, vocab.words())?;
    write_i32s(w, vocab.global_tf())?;
    write_i32s(w, vocab.local_tf())?;
    w.flush()
}

pub fn read_vocab<R: Read>(r: &mut R) -> io::Result<LocalVocab> {
    let size = read_i32(r)?;
    if size < 0 {
        return Err(invalid(format!("negative vocabulary size {size}")));
    }
    let n = size as usize;
    let words = read_i32s(r, n)?;
    let global_tf = read_i32s(r, n)?;
    let local_tf = read_i32s(r, n)?;
    LocalVocab::from_parts(words, global_tf, local_tf).map_err(|e| invalid(e.to_string()))
}
