//! Block-at-a-time document storage.
//!
//! Blocks are kept in their serialized form (see [`crate::binary`]) and only
//! materialised into [`DataBlock`]s between [`DocumentStore::load`] and
//! [`DocumentStore::unload`]. At most one block is resident at any time.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;

use tracing::{debug, info};

use crate::binary;
use crate::block::{BlockBuffer, DataBlock};
use crate::error::{InferError, Result};
use crate::meta::LocalVocab;
use crate::types::{block_file_name, vocab_file_name};

#[derive(Debug, Default)]
pub struct DocumentStore {
    blocks: Vec<BlockBuffer>,
    vocabs: Vec<LocalVocab>,
    resident: Option<usize>,
}

impl DocumentStore {
    pub fn new(blocks: Vec<BlockBuffer>, vocabs: Vec<LocalVocab>) -> Result<Self> {
        if blocks.len() != vocabs.len() {
            return Err(InferError::CorruptBlock(format!(
                "{} blocks but {} vocabularies",
                blocks.len(),
                vocabs.len()
            )));
        }
        Ok(DocumentStore { blocks, vocabs, resident: None })
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn num_docs(&self, block: usize) -> usize {
        self.blocks[block].num_docs()
    }

    pub fn vocab(&self, block: usize) -> &LocalVocab {
        &self.vocabs[block]
    }

    pub fn vocabs(&self) -> &[LocalVocab] {
        &self.vocabs
    }

    pub fn is_resident(&self) -> bool {
        self.resident.is_some()
    }

    /// Materialises `block`. Fails if another block is still loaded.
    pub fn load(&mut self, block: usize) -> Result<DataBlock> {
        if let Some(resident) = self.resident {
            return Err(InferError::BlockResident { requested: block, resident });
        }
        let buf = self.blocks.get(block).ok_or_else(|| {
            InferError::CorruptBlock(format!("block {block} of {} does not exist", self.blocks.len()))
        })?;
        let data = buf.decode(block)?;
        self.resident = Some(block);
        debug!(block, docs = data.size(), "block loaded");
        Ok(data)
    }

    /// Writes the block's documents back and releases it.
    pub fn unload(&mut self, data: DataBlock) -> Result<()> {
        let block = data.index();
        if self.resident != Some(block) {
            return Err(InferError::BlockNotResident(block));
        }
        self.blocks[block] = BlockBuffer::encode(&data);
        self.resident = None;
        debug!(block, "block unloaded");
        Ok(())
    }

    /// Persists every block as `block.N` / `vocab.N` under `dir`.
    pub fn write_dir(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).map_err(|e| InferError::io(dir, e))?;
        for (i, (block, vocab)) in self.blocks.iter().zip(&self.vocabs).enumerate() {
            let path = dir.join(block_file_name(i));
            let f = File::create(&path).map_err(|e| InferError::io(&path, e))?;
            binary::write_block(&mut BufWriter::new(f), block.offsets(), block.buf())
                .map_err(|e| InferError::io(&path, e))?;

            let path = dir.join(vocab_file_name(i));
            let f = File::create(&path).map_err(|e| InferError::io(&path, e))?;
            binary::write_vocab(&mut BufWriter::new(f), vocab).map_err(|e| InferError::io(&path, e))?;
        }
        info!(dir = %dir.display(), blocks = self.blocks.len(), "document store written");
        Ok(())
    }

    pub fn read_dir(dir: &Path, num_blocks: usize) -> Result<Self> {
        let mut blocks = Vec::with_capacity(num_blocks);
        let mut vocabs = Vec::with_capacity(num_blocks);
        for i in 0..num_blocks {
            let path = dir.join(block_file_name(i));
            let f = File::open(&path).map_err(|e| InferError::io(&path, e))?;
            let (offsets, buf) =
                binary::read_block(&mut BufReader::new(f)).map_err(|e| InferError::io(&path, e))?;
            blocks.push(BlockBuffer::from_parts(offsets, buf)?);

            let path = dir.join(vocab_file_name(i));
            let f = File::open(&path).map_err(|e| InferError::io(&path, e))?;
            vocabs.push(binary::read_vocab(&mut BufReader::new(f)).map_err(|e| InferError::io(&path, e))?);
        }
        DocumentStore::new(blocks, vocabs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> DocumentStore {
        let mut b0 = BlockBuffer::new();
        b0.push_doc(&[0, 1, 0, 1, 0, 3, 0]);
        let mut b1 = BlockBuffer::new();
        b1.push_doc(&[0, 2, 0]);
        b1.push_doc(&[0]);
        let v0 = LocalVocab::from_parts(vec![1, 3], vec![9, 9], vec![2, 1]).unwrap();
        let v1 = LocalVocab::from_parts(vec![2], vec![4], vec![1]).unwrap();
        DocumentStore::new(vec![b0, b1], vec![v0, v1]).unwrap()
    }

    #[test]
    fn only_one_block_is_resident() {
        let mut s = store();
        let b0 = s.load(0).unwrap();
        assert!(matches!(s.load(1), Err(InferError::BlockResident { requested: 1, resident: 0 })));
        s.unload(b0).unwrap();
        let b1 = s.load(1).unwrap();
        assert_eq!(b1.size(), 2);
        s.unload(b1).unwrap();
        assert!(!s.is_resident());
    }

    #[test]
    fn unload_persists_topic_changes() {
        let mut s = store();
        let mut b = s.load(0).unwrap();
        b.get_one_doc_mut(0).set_topic(2, 5);
        s.unload(b).unwrap();
        let b = s.load(0).unwrap();
        assert_eq!(b.get_one_doc(0).topic(2), 5);
        s.unload(b).unwrap();
    }

    #[test]
    fn unload_of_foreign_block_is_rejected() {
        let mut s = store();
        let b = DataBlock::new(1, Vec::new());
        assert!(matches!(s.unload(b), Err(InferError::BlockNotResident(1))));
    }

    #[test]
    fn directory_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let s = store();
        s.write_dir(dir.path()).unwrap();
        let back = DocumentStore::read_dir(dir.path(), 2).unwrap();
        assert_eq!(back.num_blocks(), 2);
        assert_eq!(back.num_docs(1), 2);
        assert_eq!(back.vocabs(), s.vocabs());
        assert_eq!(back.blocks, s.blocks);
    }

    #[test]
    fn missing_block_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(DocumentStore::read_dir(dir.path(), 1), Err(InferError::Io { .. })));
    }
}
