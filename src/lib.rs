/// Common error types: decoding, framing, unsupported encodings.
pub mod error;
/// Guarded byte interception over the source stream (mirror / capture / discard).
pub mod guard;
/// RDB primitives: opcodes and type codes, length/string decoding, encoding, skip paths.
pub mod rdb;
/// Transcoding engine: filter, type dispatcher, snapshot driver, backup mode, RESP emitter.
pub mod transcode;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// Operation errors and result alias.
pub use error::{RdbError, RdbResult};
/// Interception layer: guard modes, guarded reader, CRC64 sink.
pub use guard::{crc64, CrcWriter, Guard, GuardedReader};
/// RDB value types and primitive codecs.
pub use rdb::{encode_length, RdbType};
/// Transcoding engine surface.
pub use transcode::{
    emit_command, emit_keyed_command, BackupOptions, BackupVisitor, DefaultHook, Dispatcher,
    Filter, KeyFilter, MatchAll, MatchInfo, Record, SessionContext, SnapshotTranscoder,
    TranscodeHook, TranscodeSummary, TranscodeVisitor, ValueRecord,
};
