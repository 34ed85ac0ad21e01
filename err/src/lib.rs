//! Error types shared by every `stratafs` crate.

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("I/O: {0}")]
    Io(#[from] IoError),
    #[error("corruption: {0}")]
    Corruption(#[from] CorruptionKind),
    #[error("no space")]
    NoSpace,
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

/// A sector-map read or write failed. The medium itself is assumed opaque;
/// `stratafs` never inspects the cause beyond "the call did not succeed".
#[derive(thiserror::Error, Debug)]
pub enum IoError {
    #[error("sector read failed")]
    Read,
    #[error("sector write failed")]
    Write,
    #[error("allocator exhausted")]
    AllocatorExhausted,
}

/// An on-media invariant (spec §3) was violated. Once observed, the mount
/// that produced it is left read-only (spec §7).
#[derive(thiserror::Error, Debug)]
pub enum CorruptionKind {
    #[error("write target was not erased (0xFF)")]
    NotErased,
    #[error("record length decodes to the erased sentinel")]
    BadVarint,
    #[error("sector header does not match the expected chain kind")]
    UnexpectedSectorKind,
    #[error("chain head/tail pair fails the validity invariant")]
    DanglingChain,
    #[error("directory record referenced an unknown file id")]
    UnknownFileId,
    #[error("mount is read-only after an earlier corruption was observed")]
    MountReadOnly,
}

pub type Result<T> = core::result::Result<T, Error>;
