/*! Low-level packet access and construction.

The `wire` module deals with the bit-exact representation of what goes on the
network. It provides functions to extract fields from sequences of octets and
to insert fields into sequences of octets; the lowercase [`tcp_segment`] type
wraps a byte slice that is structurally a TCP segment, and the address types
([`IpAddress`], [`Endpoint`]) carry the identities a segment is exchanged
between.

Parsing never copies: accessors read straight out of the wrapped slice, and a
value for which [`tcp_segment::check_len`] returned `Ok` will not panic in
any field accessor. Higher-level, possibly-owning segment values live in the
tcp layer, not here.

[`tcp_segment`]: struct.tcp_segment.html
[`tcp_segment::check_len`]: struct.tcp_segment.html#method.check_len
[`IpAddress`]: struct.IpAddress.html
[`Endpoint`]: struct.Endpoint.html
*/
// Copyright (C) 2016 whitequark@whitequark.org
// Copyright (C) 2019 Andreas Molzer <andreas.molzer@tum.de>
//
// in parts derived from `smoltcp` originally distributed under 0-clause BSD
//
// Applies to files in this folder unless otherwise noted. These are:
// * `ip.rs`
// * `mod.rs` (this file)
// * `tcp.rs`

// Wire fields are named after their RFC counterparts and mostly
// self-explanatory.
#![allow(missing_docs)]

mod field {
    pub(crate) type Field = ::core::ops::Range<usize>;
    pub(crate) type Rest = ::core::ops::RangeFrom<usize>;
}

mod error;
pub(crate) mod ip;
mod tcp;

pub use self::error::{Error, Result};

pub use self::ip::{
    Address as IpAddress,
    Endpoint,
    Protocol as IpProtocol};

pub use self::tcp::{
    tcp as tcp_segment,
    Flags as TcpFlags,
    SeqNumber as TcpSeqNumber,
    HEADER_LEN as TCP_HEADER_LEN};
