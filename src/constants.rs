//! Centralized format and configuration constants.
//!
//! This module consolidates the on-disk batch layout and the parser/reader
//! limits used throughout the crate. Having them in one place makes it easier
//! to:
//!
//! - Understand the format constraints
//! - Update values consistently
//! - Document the rationale for each constant
//!
//! # Categories
//!
//! - **Batch Format Constants**: record batch header layout and limits
//! - **Reader Constants**: segment/log reader buffering and chunking
//! - **Placement Constants**: shard placement hashing

// =============================================================================
// Batch Format Constants
// =============================================================================

/// Size of a record batch header.
///
/// This is the fixed overhead for each record batch, consisting of:
/// - base_offset (8 bytes)
/// - batch_length (4 bytes)
/// - crc (4 bytes)
/// - attributes (2 bytes)
/// - batch_type (1 byte)
/// - last_offset_delta (4 bytes)
/// - first_timestamp (8 bytes)
/// - max_timestamp (8 bytes)
/// - record_count (4 bytes)
///
/// Total: 43 bytes
pub const RECORD_BATCH_HEADER_SIZE: usize = 43;

// -----------------------------------------------------------------------------
// Record Batch Header Field Offsets
// -----------------------------------------------------------------------------
// Byte offsets for each header field. The CRC covers the records section only
// (bytes after the header), so rewriting base_offset when a batch is appended
// does not invalidate it.

/// Offset of the base_offset field (8 bytes, i64 big-endian).
pub const BATCH_BASE_OFFSET: usize = 0;

/// Offset of the batch_length field (4 bytes, u32 big-endian).
/// batch_length is the byte length of the records section after the header.
pub const BATCH_LENGTH_OFFSET: usize = 8;

/// Offset of the CRC field (4 bytes, u32 big-endian).
pub const BATCH_CRC_OFFSET: usize = 12;

/// Offset of the attributes field (2 bytes, i16 big-endian).
/// Bit 0 marks the batch payload as compressed.
pub const BATCH_ATTRIBUTES_OFFSET: usize = 16;

/// Offset of the batch_type tag (1 byte, i8).
pub const BATCH_TYPE_OFFSET: usize = 18;

/// Offset of the last_offset_delta field (4 bytes, i32 big-endian).
pub const BATCH_LAST_OFFSET_DELTA_OFFSET: usize = 19;

/// Fixed per-record framing overhead: timestamp_delta (4), offset_delta (4),
/// key_len (4) and value_len (4). A record's size_bytes field counts
/// everything after itself, so size_bytes = 16 + key_len + value_len.
pub const RECORD_FRAMING_OVERHEAD: usize = 16;

/// Maximum accepted records section length for a single batch.
///
/// This prevents memory exhaustion from malformed headers that claim
/// multi-gigabyte payloads. Metadata batches are small; 100 MB is generous
/// but bounded.
pub const MAX_BATCH_PAYLOAD_SIZE: usize = 100 * 1024 * 1024;

/// Maximum accepted record count for a single batch.
pub const MAX_BATCH_RECORD_COUNT: i32 = 100_000;

// =============================================================================
// Reader Constants
// =============================================================================

/// Upper bound on decoded batches buffered inside a segment reader.
///
/// Once the buffered batches exceed this many bytes, parsing pauses until the
/// caller drains the buffer. This bounds memory growth on segments with
/// many small batches.
pub const MAX_READER_BUFFER_SIZE: usize = 32 * 1024;

/// Byte span requested from a segment per read.
pub const SEGMENT_READ_CHUNK_SIZE: usize = 8 * 1024;

// =============================================================================
// Placement Constants
// =============================================================================

/// Virtual nodes per shard on the consistent hash ring used for
/// deterministic shard placement of partitions.
pub const VIRTUAL_NODES_PER_SHARD: usize = 16;
