/// Uploaded file handling
///
/// This module turns user-selected files into the text payloads stored in
/// the audit record:
/// - Reading files and encoding them as data URIs (encode.rs)
/// - Sniffing MIME types and checking them against a media slot
/// - Joining a multi-file upload into a single batch result

pub mod encode;

pub use encode::{
    decode_data_uri, encode_batch, encode_file, encode_for_slot, read_text, EncodedBatch, EncodedFile, FileSource,
    MediaSlot, SkippedFile,
};
