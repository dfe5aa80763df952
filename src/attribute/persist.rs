use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use chrono::{DateTime, Utc};
use crc32fast::Hasher;
use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use crate::attribute::vector::AttributeVector;
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{DocId, Value};

const MAGIC: u32 = 0x4154_5452; // "ATTR"
const VERSION: u16 = 1;

/// Precedes the compressed payload of a saved attribute
#[derive(Debug, Serialize, Deserialize)]
pub struct SaveHeader {
    pub magic: u32,
    pub version: u16,
    pub name: String,
    pub config: Config,
    pub num_docs: DocId,
    pub saved_at: DateTime<Utc>,
    pub payload_len: u64,
    pub checksum: u32,
}

// [ HEADER (bincode) ]
// [ PAYLOAD: lz4(bincode(Vec<Vec<(Value, weight)>>)) ]
impl AttributeVector {
    /// Writes the committed documents. Pending changes are not included.
    pub fn save<W: Write>(&self, mut writer: W) -> Result<SaveHeader> {
        let num_docs = self.committed_doc_id_limit();
        let docs: Vec<Vec<(Value, i32)>> = (0..num_docs).map(|doc| self.get_values(doc)).collect();
        let encoded = bincode::serialize(&docs)?;
        let payload = lz4_flex::compress_prepend_size(&encoded);

        let mut hasher = Hasher::new();
        hasher.update(&payload);
        let header = SaveHeader {
            magic: MAGIC,
            version: VERSION,
            name: self.name().to_string(),
            config: self.config().clone(),
            num_docs,
            saved_at: Utc::now(),
            payload_len: payload.len() as u64,
            checksum: hasher.finalize(),
        };
        bincode::serialize_into(&mut writer, &header)?;
        writer.write_all(&payload)?;
        writer.flush()?;
        log::debug!(
            "saved attribute '{}': {} docs, {} payload bytes ({} uncompressed)",
            header.name,
            num_docs,
            payload.len(),
            encoded.len()
        );
        Ok(header)
    }

    /// Rebuilds an attribute from [`save`](Self::save) output; everything loaded is committed.
    pub fn load<R: Read>(mut reader: R) -> Result<AttributeVector> {
        let header: SaveHeader = bincode::deserialize_from(&mut reader)?;
        if header.magic != MAGIC {
            return Err(Error::new(ErrorKind::Parse, format!("bad attribute magic {:#x}", header.magic)));
        }
        if header.version != VERSION {
            return Err(Error::new(
                ErrorKind::Parse,
                format!("unsupported attribute save version {}", header.version),
            ));
        }
        let mut payload = vec![0u8; header.payload_len as usize];
        reader.read_exact(&mut payload)?;

        let mut hasher = Hasher::new();
        hasher.update(&payload);
        let checksum = hasher.finalize();
        if checksum != header.checksum {
            return Err(Error::new(
                ErrorKind::ChecksumMismatch,
                format!(
                    "attribute '{}': expected {:#010x}, got {:#010x}",
                    header.name, header.checksum, checksum
                ),
            ));
        }
        let encoded = lz4_flex::decompress_size_prepended(&payload)
            .map_err(|e| Error::new(ErrorKind::Parse, format!("attribute payload: {}", e)))?;
        let docs: Vec<Vec<(Value, i32)>> = bincode::deserialize(&encoded)?;
        if docs.len() != header.num_docs as usize {
            return Err(Error::new(
                ErrorKind::Parse,
                format!("header says {} docs, payload has {}", header.num_docs, docs.len()),
            ));
        }

        let attr = AttributeVector::new(header.name, header.config)?;
        if header.num_docs > 0 {
            attr.add_docs(header.num_docs)?;
        }
        for (doc, values) in docs.iter().enumerate() {
            if !values.is_empty() {
                attr.set_values(doc as DocId, values)?;
            }
        }
        attr.commit()?;
        log::debug!("loaded attribute '{}' with {} docs", attr.name(), attr.num_docs());
        Ok(attr)
    }

    pub fn save_file(&self, path: impl AsRef<Path>) -> Result<SaveHeader> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        let header = self.save(&mut writer)?;
        writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
        Ok(header)
    }

    pub fn load_file(path: impl AsRef<Path>) -> Result<AttributeVector> {
        let file = File::open(path.as_ref())?;
        let mmap = unsafe { Mmap::map(&file)? };
        AttributeVector::load(&mmap[..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{BasicType, CollectionType};

    fn weighted_tags() -> AttributeVector {
        let config = Config::new(BasicType::String, CollectionType::WeightedSet).with_fast_search(true);
        let attr = AttributeVector::new("tags", config).unwrap();
        attr.add_docs(3).unwrap();
        attr.append(0, "red", 3).unwrap();
        attr.append(0, "blue", -1).unwrap();
        attr.append(2, "red", 7).unwrap();
        attr.commit().unwrap();
        attr
    }

    #[test]
    fn save_and_load_in_memory() {
        let attr = weighted_tags();
        let mut buf = Vec::new();
        let header = attr.save(&mut buf).unwrap();
        assert_eq!(header.num_docs, 3);

        let loaded = AttributeVector::load(&buf[..]).unwrap();
        assert_eq!(loaded.name(), "tags");
        assert_eq!(loaded.committed_doc_id_limit(), 3);
        for doc in 0..3 {
            assert_eq!(loaded.get_values(doc), attr.get_values(doc));
        }
        assert!(loaded.find_enum("red").is_some());
    }

    #[test]
    fn pending_changes_are_not_saved() {
        let attr = weighted_tags();
        attr.append(1, "green", 1).unwrap();
        let mut buf = Vec::new();
        attr.save(&mut buf).unwrap();
        let loaded = AttributeVector::load(&buf[..]).unwrap();
        assert_eq!(loaded.value_count(1), 0);
    }

    #[test]
    fn corrupted_payload_is_detected() {
        let attr = weighted_tags();
        let mut buf = Vec::new();
        attr.save(&mut buf).unwrap();
        let last = buf.len() - 1;
        buf[last] ^= 0xff;
        let err = AttributeVector::load(&buf[..]).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ChecksumMismatch);
    }

    #[test]
    fn truncated_input_is_an_io_error() {
        let attr = weighted_tags();
        let mut buf = Vec::new();
        attr.save(&mut buf).unwrap();
        buf.truncate(buf.len() - 4);
        let err = AttributeVector::load(&buf[..]).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
