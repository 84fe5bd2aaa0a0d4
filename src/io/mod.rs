mod decompress;
mod file_source;
mod http_source;
mod s3_source;
mod source;

pub use decompress::{Decompress, DefaultDecompressor};
pub use file_source::FileSource;
pub use http_source::{HttpSource, ReloadState};
pub use s3_source::{create_s3_client, S3Source};
pub use source::{
    cancellable, etag_mismatch, range_header, strong_etag, RangeResponse, Source,
};
