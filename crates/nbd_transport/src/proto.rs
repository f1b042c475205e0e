//! crates/nbd_transport/src/proto.rs
//!
//! Wire constants for the subset of the NBD protocol this crate speaks:
//! fixed-newstyle handshake, `EXPORT_NAME`/`GO`/`SET_META_CONTEXT` (and,
//! behind the `tls` feature, `STARTTLS`) option negotiation, and the
//! simple/structured reply transmission phase for `READ`, `WRITE` and
//! `BLOCK_STATUS`.

/// Initial magic sent by the server: ASCII `NBDMAGIC`.
pub(crate) const NBDMAGIC: u64 = 0x4e42_444d_4147_4943;
/// Second magic sent by the server in newstyle negotiation: `IHAVEOPT`.
pub(crate) const IHAVEOPT: u64 = 0x4948_4156_454f_5054;
/// Magic prefixing every option reply during the handshake.
pub(crate) const OPTION_REPLY_MAGIC: u64 = 0x0003_e889_0455_65a9;

/// Server handshake flag: server supports fixed newstyle negotiation.
pub(crate) const NBD_FLAG_FIXED_NEWSTYLE: u16 = 1 << 0;
/// Server handshake flag: server will not send the 124 zero-padding bytes
/// historically sent after `NBD_OPT_EXPORT_NAME`.
pub(crate) const NBD_FLAG_NO_ZEROES: u16 = 1 << 1;

/// Client handshake flag acknowledging fixed newstyle.
pub(crate) const NBD_FLAG_C_FIXED_NEWSTYLE: u32 = 1 << 0;
/// Client handshake flag acknowledging `NBD_FLAG_NO_ZEROES`.
pub(crate) const NBD_FLAG_C_NO_ZEROES: u32 = 1 << 1;

/// Negotiate the size/flags of the default export and end negotiation.
pub(crate) const NBD_OPT_EXPORT_NAME: u32 = 1;
/// Request TLS; the connection becomes a TLS session on success.
pub(crate) const NBD_OPT_STARTTLS: u32 = 5;
/// Like `EXPORT_NAME` but replies with structured `NBD_REP_INFO` chunks
/// before the final ack, carrying export size and transmission flags.
pub(crate) const NBD_OPT_GO: u32 = 7;
/// Negotiate a metadata context (e.g. a dirty bitmap) for later
/// `BLOCK_STATUS` queries.
pub(crate) const NBD_OPT_SET_META_CONTEXT: u32 = 10;

/// Option succeeded with no further data.
pub(crate) const NBD_REP_ACK: u32 = 1;
/// One `NBD_INFO_*` chunk of an `NBD_OPT_GO` reply.
pub(crate) const NBD_REP_INFO: u32 = 3;
/// One negotiated metadata context id/name pair.
pub(crate) const NBD_REP_META_CONTEXT: u32 = 4;
/// High bit set on every `NBD_REP_ERR_*` reply type.
pub(crate) const NBD_REP_FLAG_ERROR: u32 = 1 << 31;

/// `NBD_INFO_EXPORT` chunk type: carries export size and transmission flags.
pub(crate) const NBD_INFO_EXPORT: u16 = 0;

/// Request header magic.
pub(crate) const NBD_REQUEST_MAGIC: u32 = 0x2560_9513;
/// Simple reply magic (used for `READ`/`WRITE`).
pub(crate) const NBD_SIMPLE_REPLY_MAGIC: u32 = 0x6744_6698;
/// Structured reply magic (used for `BLOCK_STATUS`).
pub(crate) const NBD_STRUCTURED_REPLY_MAGIC: u32 = 0x668e_33e4;

/// Read `length` bytes from `offset`.
pub(crate) const NBD_CMD_READ: u16 = 0;
/// Write the request payload at `offset`.
pub(crate) const NBD_CMD_WRITE: u16 = 1;
/// Cleanly end the session.
pub(crate) const NBD_CMD_DISC: u16 = 2;
/// Query whether `[offset, offset+length)` is allocated/dirty per the
/// negotiated metadata context(s).
pub(crate) const NBD_CMD_BLOCK_STATUS: u16 = 7;

/// Structured reply flag: this is the final chunk for the request.
pub(crate) const NBD_REPLY_FLAG_DONE: u16 = 1 << 0;
/// Structured reply chunk type carrying block-status descriptors.
pub(crate) const NBD_REPLY_TYPE_BLOCK_STATUS: u16 = 5;
/// Structured reply chunk type: an empty/no-op chunk (used to mark the
/// final chunk of an otherwise-empty reply).
pub(crate) const NBD_REPLY_TYPE_NONE: u16 = 0;

/// Transmission flag: server supports `NBD_CMD_BLOCK_STATUS`.
pub(crate) const NBD_FLAG_SEND_BLOCK_STATUS: u16 = 1 << 7;
