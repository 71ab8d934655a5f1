//! Low-level binary protocol for the GUI daemon link.
//!
//! This module defines the C-compatible structures carried over the
//! inter-domain channel to the remote GUI daemon.
//!
//! # Protocol Overview
//!
//! Every message is `MsgHeader` followed immediately by a kind-specific
//! payload, with no padding between the two and no trailing bytes. The
//! header's `untrusted_len` always equals the exact payload size for that
//! kind; the `Payload` trait derives it from the payload type so it can
//! never be computed by hand at a call site. All integers are little-endian
//! on the wire and messages are produced by casting the packed structs
//! directly, so big-endian hosts are rejected at compile time.

use std::mem;

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};

#[cfg(target_endian = "big")]
compile_error!("the wire protocol is little-endian and encoded by struct cast");

pub const MSG_CREATE: u32 = 0x82;
pub const MSG_DESTROY: u32 = 0x83;
pub const MSG_MAP: u32 = 0x84;
pub const MSG_UNMAP: u32 = 0x85;
pub const MSG_CONFIGURE: u32 = 0x86;
pub const MSG_SHMIMAGE: u32 = 0x88;
pub const MSG_WINDOW_FLAGS: u32 = 0x91;
pub const MSG_WINDOW_DUMP: u32 = 0x93;

/// Shared-memory grants are page granular.
pub const PAGE_SIZE: usize = 4096;
/// One grant-table reference on the wire.
pub const SIZEOF_GRANT_REF: usize = 4;
/// `WindowDumpHdr::dump_type` for a grant-reference table.
pub const WINDOW_DUMP_TYPE_GRANT_REFS: u32 = 0;
/// Color depth announced in WINDOW_DUMP (32-bit pixels, 24 bits of color).
pub const WINDOW_DUMP_BPP: u32 = 24;

/// Largest window geometry the daemon accepts.
pub const MAX_WINDOW_WIDTH: u32 = 16384;
pub const MAX_WINDOW_HEIGHT: u32 = 6144;

/// Common header preceding every message.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct MsgHeader {
    /// Message kind tag
    pub kind: u32,
    /// Target window identifier
    pub window: u32,
    /// Declared payload length; named after the receiving side's view of it
    pub untrusted_len: u32,
}

pub const HEADER_SIZE: usize = mem::size_of::<MsgHeader>();

/// Announces a new window. `parent` is always 0: sub-window parenting is
/// unsupported in this bridge.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Create {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub parent: u32,
    pub override_redirect: u8,
}

/// Resize/reposition notification. The daemon ignores `override_redirect`
/// in this message, so it is always sent as 0.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Configure {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub override_redirect: u8,
}

/// Maps a window. `transient_for` is a stub for future transient-window
/// semantics and is currently always 0.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct MapInfo {
    pub transient_for: u32,
    pub override_redirect: u8,
}

/// One damaged rectangle of the committed buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct ShmImage {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Window manager flag transition: bits to set and bits to clear.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct WindowFlags {
    pub flags_set: u32,
    pub flags_unset: u32,
}

/// Fixed part of a WINDOW_DUMP payload; followed on the wire by one grant
/// reference per page of the buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct WindowDumpHdr {
    pub dump_type: u32,
    pub bpp: u32,
    pub width: u32,
    pub height: u32,
}

bitflags! {
    /// Window manager flags understood by the daemon, used in WINDOW_FLAGS.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WindowFlag: u32 {
        const FULLSCREEN        = 1 << 0;
        const DEMANDS_ATTENTION = 1 << 1;
        const MINIMIZE          = 1 << 2;
    }
}

/// A fixed-size message payload with its associated kind tag.
pub trait Payload: Pod {
    const KIND: u32;
}

impl Payload for Create {
    const KIND: u32 = MSG_CREATE;
}
impl Payload for Configure {
    const KIND: u32 = MSG_CONFIGURE;
}
impl Payload for MapInfo {
    const KIND: u32 = MSG_MAP;
}
impl Payload for ShmImage {
    const KIND: u32 = MSG_SHMIMAGE;
}
impl Payload for WindowFlags {
    const KIND: u32 = MSG_WINDOW_FLAGS;
}

// Wire-compatibility contract: declared sizes match the daemon's structs.
const _: () = assert!(mem::size_of::<MsgHeader>() == 12);
const _: () = assert!(mem::size_of::<Create>() == 21);
const _: () = assert!(mem::size_of::<Configure>() == 17);
const _: () = assert!(mem::size_of::<MapInfo>() == 5);
const _: () = assert!(mem::size_of::<ShmImage>() == 16);
const _: () = assert!(mem::size_of::<WindowFlags>() == 8);
const _: () = assert!(mem::size_of::<WindowDumpHdr>() == 16);

/// Frame a payload-carrying message for the given window.
pub fn encode<P: Payload>(window: u32, payload: &P) -> Vec<u8> {
    let header = MsgHeader {
        kind: P::KIND,
        window,
        untrusted_len: mem::size_of::<P>() as u32,
    };
    let mut buf = Vec::with_capacity(HEADER_SIZE + mem::size_of::<P>());
    buf.extend_from_slice(bytemuck::bytes_of(&header));
    buf.extend_from_slice(bytemuck::bytes_of(payload));
    buf
}

/// Frame a message with an empty payload (UNMAP, DESTROY).
pub fn encode_empty(kind: u32, window: u32) -> Vec<u8> {
    let header = MsgHeader {
        kind,
        window,
        untrusted_len: 0,
    };
    bytemuck::bytes_of(&header).to_vec()
}

/// Number of whole pages needed to cover `bytes`.
pub const fn num_pages(bytes: usize) -> usize {
    bytes.div_ceil(PAGE_SIZE)
}

/// Payload length of a WINDOW_DUMP for a buffer of `bytes` bytes.
pub const fn window_dump_len(bytes: usize) -> usize {
    mem::size_of::<WindowDumpHdr>() + num_pages(bytes) * SIZEOF_GRANT_REF
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_of(msg: &[u8]) -> MsgHeader {
        bytemuck::pod_read_unaligned(&msg[..HEADER_SIZE])
    }

    #[test]
    fn declared_length_matches_payload_size() {
        let msg = encode(
            7,
            &Create {
                x: -3,
                y: 4,
                width: 800,
                height: 600,
                parent: 0,
                override_redirect: 1,
            },
        );
        let header = header_of(&msg);
        assert_eq!(header.kind, MSG_CREATE);
        assert_eq!(header.window, 7);
        assert_eq!(header.untrusted_len as usize, msg.len() - HEADER_SIZE);
        assert_eq!(header.untrusted_len, 21);

        let msg = encode(7, &MapInfo { transient_for: 0, override_redirect: 0 });
        assert_eq!(header_of(&msg).untrusted_len, 5);

        let msg = encode(7, &ShmImage { x: 0, y: 0, width: 1, height: 1 });
        assert_eq!(header_of(&msg).untrusted_len, 16);
    }

    #[test]
    fn empty_messages_are_header_only() {
        for kind in [MSG_UNMAP, MSG_DESTROY] {
            let msg = encode_empty(kind, 9);
            assert_eq!(msg.len(), HEADER_SIZE);
            let header = header_of(&msg);
            assert_eq!(header.kind, kind);
            assert_eq!(header.untrusted_len, 0);
        }
    }

    #[test]
    fn payload_bytes_are_packed_little_endian() {
        let msg = encode(
            1,
            &Configure {
                x: 1,
                y: 2,
                width: 3,
                height: 4,
                override_redirect: 0,
            },
        );
        assert_eq!(msg.len(), HEADER_SIZE + 17);
        assert_eq!(&msg[HEADER_SIZE..HEADER_SIZE + 4], &[1, 0, 0, 0]);
        assert_eq!(&msg[HEADER_SIZE + 4..HEADER_SIZE + 8], &[2, 0, 0, 0]);
        assert_eq!(msg[HEADER_SIZE + 16], 0);
    }

    #[test]
    fn page_rounding() {
        assert_eq!(num_pages(0), 0);
        assert_eq!(num_pages(1), 1);
        assert_eq!(num_pages(PAGE_SIZE), 1);
        assert_eq!(num_pages(PAGE_SIZE + 1), 2);
        assert_eq!(window_dump_len(PAGE_SIZE * 3), 16 + 3 * SIZEOF_GRANT_REF);
    }
}
