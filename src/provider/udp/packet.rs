//! Datagram codec for the connectionless asset transport
//!
//! All integers are big-endian.
//!
//! ```text
//! Request   : 0x01 | asset uuid (16) | asset type (u8)
//! Fragment  : 0x02 | asset uuid (16) | index (u32) | flags (u8) | [total (u64)] | payload
//! Not found : 0x03 | asset uuid (16)
//! ```
//!
//! The total size is present only when `flags & FLAG_HAS_SIZE` is set; a
//! server sends it on exactly one fragment per transfer (normally index 0).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::CodecError;
use crate::types::{AssetId, AssetType};

/// Client → server asset request
pub const KIND_REQUEST: u8 = 0x01;
/// Server → client asset fragment
pub const KIND_FRAGMENT: u8 = 0x02;
/// Server → client "asset unknown"
pub const KIND_NOT_FOUND: u8 = 0x03;

/// Fragment carries the declared total size
pub const FLAG_HAS_SIZE: u8 = 0x01;

const UUID_LEN: usize = 16;

/// Encoded length of a request datagram
pub const REQUEST_LEN: usize = 1 + UUID_LEN + 1;
/// Encoded length of a fragment header without the size field
pub const FRAGMENT_HEADER_LEN: usize = 1 + UUID_LEN + 4 + 1;
const NOT_FOUND_LEN: usize = 1 + UUID_LEN;

/// Smallest datagram able to carry a sized fragment with one payload byte
pub const MIN_DATAGRAM_SIZE: usize = FRAGMENT_HEADER_LEN + 8 + 1;

/// One indexed piece of an asset
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fragment {
    /// Asset the fragment belongs to
    pub asset_id: AssetId,
    /// Zero-based chunk index
    pub index: u32,
    /// Declared total asset size (header fragment only)
    pub total_size: Option<u64>,
    /// Raw payload bytes
    pub payload: Bytes,
}

/// A decoded datagram
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Datagram {
    /// Ask the server to stream an asset
    Request {
        /// Asset to stream
        asset_id: AssetId,
        /// Requested type
        asset_type: AssetType,
    },
    /// Asset payload fragment
    Fragment(Fragment),
    /// The server does not have the asset
    NotFound {
        /// Asset that was requested
        asset_id: AssetId,
    },
}

impl Datagram {
    /// Message kind byte
    pub fn kind(&self) -> u8 {
        match self {
            Datagram::Request { .. } => KIND_REQUEST,
            Datagram::Fragment(_) => KIND_FRAGMENT,
            Datagram::NotFound { .. } => KIND_NOT_FOUND,
        }
    }

    /// Asset the datagram refers to
    pub fn asset_id(&self) -> AssetId {
        match self {
            Datagram::Request { asset_id, .. } | Datagram::NotFound { asset_id } => *asset_id,
            Datagram::Fragment(fragment) => fragment.asset_id,
        }
    }

    /// Serialize to wire bytes
    pub fn encode(&self) -> Bytes {
        match self {
            Datagram::Request {
                asset_id,
                asset_type,
            } => {
                let mut buf = BytesMut::with_capacity(REQUEST_LEN);
                buf.put_u8(KIND_REQUEST);
                buf.put_slice(asset_id.as_bytes());
                buf.put_u8(asset_type.code());
                buf.freeze()
            }
            Datagram::Fragment(fragment) => {
                let size_len = if fragment.total_size.is_some() { 8 } else { 0 };
                let mut buf =
                    BytesMut::with_capacity(FRAGMENT_HEADER_LEN + size_len + fragment.payload.len());
                buf.put_u8(KIND_FRAGMENT);
                buf.put_slice(fragment.asset_id.as_bytes());
                buf.put_u32(fragment.index);
                match fragment.total_size {
                    Some(total) => {
                        buf.put_u8(FLAG_HAS_SIZE);
                        buf.put_u64(total);
                    }
                    None => buf.put_u8(0),
                }
                buf.put_slice(&fragment.payload);
                buf.freeze()
            }
            Datagram::NotFound { asset_id } => {
                let mut buf = BytesMut::with_capacity(NOT_FOUND_LEN);
                buf.put_u8(KIND_NOT_FOUND);
                buf.put_slice(asset_id.as_bytes());
                buf.freeze()
            }
        }
    }

    /// Parse wire bytes; the payload of a fragment shares `data`'s allocation
    pub fn decode(mut data: Bytes) -> Result<Self, CodecError> {
        let actual = data.len();
        if data.is_empty() {
            return Err(CodecError::Truncated { needed: 1, actual });
        }

        match data[0] {
            KIND_REQUEST => {
                ensure_len(actual, REQUEST_LEN)?;
                data.advance(1);
                let asset_id = read_asset_id(&mut data);
                let asset_type = AssetType::from_code(data.get_u8());
                Ok(Datagram::Request {
                    asset_id,
                    asset_type,
                })
            }
            KIND_FRAGMENT => {
                ensure_len(actual, FRAGMENT_HEADER_LEN)?;
                data.advance(1);
                let asset_id = read_asset_id(&mut data);
                let index = data.get_u32();
                let flags = data.get_u8();
                let total_size = if flags & FLAG_HAS_SIZE != 0 {
                    ensure_len(actual, FRAGMENT_HEADER_LEN + 8)?;
                    Some(data.get_u64())
                } else {
                    None
                };
                Ok(Datagram::Fragment(Fragment {
                    asset_id,
                    index,
                    total_size,
                    payload: data,
                }))
            }
            KIND_NOT_FOUND => {
                ensure_len(actual, NOT_FOUND_LEN)?;
                data.advance(1);
                Ok(Datagram::NotFound {
                    asset_id: read_asset_id(&mut data),
                })
            }
            other => Err(CodecError::UnknownKind(other)),
        }
    }
}

fn ensure_len(actual: usize, needed: usize) -> Result<(), CodecError> {
    if actual < needed {
        return Err(CodecError::Truncated { needed, actual });
    }
    Ok(())
}

fn read_asset_id(data: &mut Bytes) -> AssetId {
    let mut raw = [0u8; UUID_LEN];
    data.copy_to_slice(&mut raw);
    AssetId::from_bytes(raw)
}

/// Split an asset into fragments of at most `chunk_size` payload bytes
///
/// Fragment 0 carries the total size. Used by servers and test fixtures;
/// an empty asset yields no fragments.
pub fn fragment_asset(asset_id: AssetId, data: &Bytes, chunk_size: usize) -> Vec<Datagram> {
    let chunk_size = chunk_size.max(1);
    let total = data.len() as u64;
    (0..data.len())
        .step_by(chunk_size)
        .enumerate()
        .map(|(index, start)| {
            let end = (start + chunk_size).min(data.len());
            Datagram::Fragment(Fragment {
                asset_id,
                index: index as u32,
                total_size: (index == 0).then_some(total),
                payload: data.slice(start..end),
            })
        })
        .collect()
}
