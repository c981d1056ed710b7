//! # Filesystem Block Persistence
//!
//! An append-only `blocks` file. Layout:
//!
//! ```text
//! header: magic "FLBK" | format version u32 | network id u32 | virtual chain id u32
//! frames: len u32 | payload (bincode BlockPair) | crc32 u32 | zero-pad to 4
//! ```
//!
//! All integers are big-endian; the CRC is CRC-32/ISO-HDLC over the
//! payload bytes. The writer holds an exclusive advisory OS lock for
//! the life of the process.
//!
//! Opening scans every frame. The first bad CRC or truncated frame
//! marks the end of the valid prefix: the file is truncated back to
//! that boundary with a warning and the node carries on. A header that
//! disagrees with this node's identity is fatal. CRC failures on reads
//! after open are fatal too — at that point the file was valid at scan
//! time, so corruption means the storage is actively rotting.

use crate::errors::BlockStorageError;
use crate::ports::{BlockPersistence, ScanCursor, WriteStatus};
use fs2::FileExt;
use shared_types::{BlockHeight, BlockPair, BlockTracker, Hash, TimestampNano};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::{info, warn};

const MAGIC: &[u8; 4] = b"FLBK";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: u64 = 16;

/// Identity stamped into the file header.
#[derive(Clone, Debug)]
pub struct BlockFileConfig {
    pub dir: PathBuf,
    pub network_id: u32,
    pub virtual_chain_id: u32,
    pub tracker_grace_distance: u64,
}

struct FsInner {
    file: File,
    /// Byte offset of each block's frame, indexed by height - 1.
    offsets: Vec<u64>,
    end_offset: u64,
    last_block: Option<BlockPair>,
}

pub struct FilesystemBlockPersistence {
    inner: RwLock<FsInner>,
    tracker: BlockTracker,
}

impl FilesystemBlockPersistence {
    /// Open (or create) the block file, validate the header, scan and
    /// repair the frame sequence, and take the exclusive lock.
    pub fn open(config: &BlockFileConfig) -> Result<Self, BlockStorageError> {
        std::fs::create_dir_all(&config.dir)?;
        let path = config.dir.join("blocks");
        let mut file = OpenOptions::new().read(true).write(true).create(true).open(&path)?;
        file.try_lock_exclusive()
            .map_err(|e| BlockStorageError::Locked(e.to_string()))?;

        let file_len = file.metadata()?.len();
        if file_len == 0 {
            write_header(&mut file, config)?;
        } else {
            validate_header(&mut file, config)?;
        }

        let (offsets, end_offset, last_block) = scan_frames(&mut file)?;
        info!(
            path = %path.display(),
            blocks = offsets.len(),
            "block file opened"
        );

        let tracker = BlockTracker::new(offsets.len() as BlockHeight, config.tracker_grace_distance);
        Ok(Self {
            inner: RwLock::new(FsInner { file, offsets, end_offset, last_block }),
            tracker,
        })
    }

    fn lock_inner(&self) -> std::sync::RwLockWriteGuard<'_, FsInner> {
        // Reads seek the shared handle, so every file operation takes
        // the write side.
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl BlockPersistence for FilesystemBlockPersistence {
    fn write_next_block(&self, block: &BlockPair) -> Result<WriteStatus, BlockStorageError> {
        let height = block.height();
        let mut inner = self.lock_inner();
        let next_desired = inner.offsets.len() as BlockHeight + 1;
        if height > next_desired {
            return Err(BlockStorageError::OutOfOrder { received: height, next_desired });
        }
        if height < next_desired {
            info!(height, next_desired, "ignoring write of stale block");
            return Ok(WriteStatus::Ignored);
        }

        let payload =
            bincode::serialize(block).map_err(|e| BlockStorageError::Io(e.to_string()))?;
        let frame = encode_frame(&payload);

        let offset = inner.end_offset;
        inner.file.seek(SeekFrom::Start(offset))?;
        inner.file.write_all(&frame)?;
        inner.file.sync_data()?;

        inner.offsets.push(offset);
        inner.end_offset = offset + frame.len() as u64;
        inner.last_block = Some(block.clone());
        // Advance under the lock so concurrent writers cannot reorder
        // the tracker.
        self.tracker.increment_to(height);
        Ok(WriteStatus::Written)
    }

    fn get_last_block(&self) -> Result<Option<BlockPair>, BlockStorageError> {
        Ok(self.lock_inner().last_block.clone())
    }

    fn get_last_block_height(&self) -> Result<BlockHeight, BlockStorageError> {
        Ok(self.lock_inner().offsets.len() as BlockHeight)
    }

    fn get_block_pair(&self, height: BlockHeight) -> Result<BlockPair, BlockStorageError> {
        let mut inner = self.lock_inner();
        read_block_at(&mut inner, height)
    }

    fn get_blocks(
        &self,
        first: BlockHeight,
        last: BlockHeight,
    ) -> Result<Vec<BlockPair>, BlockStorageError> {
        let mut inner = self.lock_inner();
        if first == 0 || first > last || last > inner.offsets.len() as BlockHeight {
            return Err(BlockStorageError::NotFound(last));
        }
        (first..=last).map(|h| read_block_at(&mut inner, h)).collect()
    }

    fn scan_blocks(
        &self,
        mut from: BlockHeight,
        page_size: u8,
        cursor: &mut ScanCursor<'_>,
    ) -> Result<(), BlockStorageError> {
        let mut inner = self.lock_inner();
        let total = inner.offsets.len() as BlockHeight;
        let page = page_size.max(1) as BlockHeight;

        let mut wants_more = true;
        while from <= total && wants_more {
            let to = std::cmp::min(from + page - 1, total);
            let blocks: Vec<BlockPair> =
                (from..=to).map(|h| read_block_at(&mut inner, h)).collect::<Result<_, _>>()?;
            wants_more = cursor(from, &blocks);
            from = to + 1;
        }
        Ok(())
    }

    fn get_block_by_tx(
        &self,
        txhash: Hash,
        min_ts: TimestampNano,
        max_ts: TimestampNano,
    ) -> Result<Option<(BlockPair, usize)>, BlockStorageError> {
        let mut inner = self.lock_inner();
        let total = inner.offsets.len() as BlockHeight;
        for height in 1..=total {
            let block = read_block_at(&mut inner, height)?;
            let block_ts = block.transactions_block.header.timestamp;
            if block_ts <= min_ts || block_ts >= max_ts {
                continue;
            }
            for (index, receipt) in block.results_block.transaction_receipts.iter().enumerate() {
                if receipt.txhash == txhash {
                    return Ok(Some((block.clone(), index)));
                }
            }
        }
        Ok(None)
    }

    fn block_tracker(&self) -> &BlockTracker {
        &self.tracker
    }
}

fn write_header(file: &mut File, config: &BlockFileConfig) -> Result<(), BlockStorageError> {
    let mut header = Vec::with_capacity(HEADER_LEN as usize);
    header.extend_from_slice(MAGIC);
    header.extend_from_slice(&FORMAT_VERSION.to_be_bytes());
    header.extend_from_slice(&config.network_id.to_be_bytes());
    header.extend_from_slice(&config.virtual_chain_id.to_be_bytes());
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&header)?;
    file.sync_data()?;
    Ok(())
}

fn validate_header(file: &mut File, config: &BlockFileConfig) -> Result<(), BlockStorageError> {
    let mut header = [0u8; HEADER_LEN as usize];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut header).map_err(|_| BlockStorageError::FormatMismatch {
        field: "header length",
        expected: HEADER_LEN as u32,
        actual: 0,
    })?;

    if &header[0..4] != MAGIC {
        return Err(BlockStorageError::FormatMismatch {
            field: "magic",
            expected: u32::from_be_bytes(*MAGIC),
            actual: u32::from_be_bytes([header[0], header[1], header[2], header[3]]),
        });
    }
    let checks: [(&'static str, u32, u32); 3] = [
        ("format version", FORMAT_VERSION, read_u32_at(&header, 4)),
        ("network id", config.network_id, read_u32_at(&header, 8)),
        ("virtual chain id", config.virtual_chain_id, read_u32_at(&header, 12)),
    ];
    for (field, expected, actual) in checks {
        if expected != actual {
            return Err(BlockStorageError::FormatMismatch { field, expected, actual });
        }
    }
    Ok(())
}

fn read_u32_at(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn padding_len(len: u32) -> u64 {
    ((4 - len % 4) % 4) as u64
}

fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let len = payload.len() as u32;
    let crc = crc32fast::hash(payload);
    let mut frame = Vec::with_capacity(payload.len() + 8 + padding_len(len) as usize);
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    frame.extend_from_slice(&crc.to_be_bytes());
    frame.extend(std::iter::repeat(0u8).take(padding_len(len) as usize));
    frame
}

enum FrameRead {
    Block(BlockPair, u64),
    /// End of file exactly at a frame boundary.
    Eof,
    /// Truncated or corrupt tail starting at this offset.
    Bad(&'static str),
}

fn read_frame_at(file: &mut File, offset: u64) -> Result<FrameRead, BlockStorageError> {
    let file_len = file.metadata()?.len();
    if offset == file_len {
        return Ok(FrameRead::Eof);
    }
    if offset + 4 > file_len {
        return Ok(FrameRead::Bad("truncated frame length"));
    }

    file.seek(SeekFrom::Start(offset))?;
    let mut len_buf = [0u8; 4];
    file.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf);

    let frame_end = offset + 4 + len as u64 + 4 + padding_len(len);
    if frame_end > file_len {
        return Ok(FrameRead::Bad("truncated frame payload"));
    }

    let mut payload = vec![0u8; len as usize];
    file.read_exact(&mut payload)?;
    let mut crc_buf = [0u8; 4];
    file.read_exact(&mut crc_buf)?;
    if crc32fast::hash(&payload) != u32::from_be_bytes(crc_buf) {
        return Ok(FrameRead::Bad("crc mismatch"));
    }

    match bincode::deserialize::<BlockPair>(&payload) {
        Ok(block) => Ok(FrameRead::Block(block, frame_end)),
        Err(_) => Ok(FrameRead::Bad("undecodable payload")),
    }
}

/// Walk every frame from the header onward. Returns the valid offsets,
/// the end of the valid prefix, and the last decoded block. A bad tail
/// is truncated away.
fn scan_frames(
    file: &mut File,
) -> Result<(Vec<u64>, u64, Option<BlockPair>), BlockStorageError> {
    let mut offsets = Vec::new();
    let mut offset = HEADER_LEN;
    let mut last_block = None;

    loop {
        match read_frame_at(file, offset)? {
            FrameRead::Eof => break,
            FrameRead::Block(block, next_offset) => {
                let expected_height = offsets.len() as BlockHeight + 1;
                if block.height() != expected_height {
                    warn!(
                        found = block.height(),
                        expected = expected_height,
                        offset,
                        "block file height sequence broken, truncating"
                    );
                    file.set_len(offset)?;
                    file.sync_data()?;
                    break;
                }
                offsets.push(offset);
                last_block = Some(block);
                offset = next_offset;
            }
            FrameRead::Bad(reason) => {
                warn!(offset, reason, "bad frame in block file, truncating to last valid boundary");
                file.set_len(offset)?;
                file.sync_data()?;
                break;
            }
        }
    }
    Ok((offsets, offset, last_block))
}

fn read_block_at(inner: &mut FsInner, height: BlockHeight) -> Result<BlockPair, BlockStorageError> {
    if height == 0 || height > inner.offsets.len() as BlockHeight {
        return Err(BlockStorageError::NotFound(height));
    }
    let offset = inner.offsets[(height - 1) as usize];
    match read_frame_at(&mut inner.file, offset)? {
        FrameRead::Block(block, _) => Ok(block),
        // The frame was valid at open time; any failure now is fatal.
        FrameRead::Eof => Err(BlockStorageError::Corrupt {
            offset,
            reason: "frame vanished after open".into(),
        }),
        FrameRead::Bad(reason) => {
            Err(BlockStorageError::Corrupt { offset, reason: reason.into() })
        }
    }
}
