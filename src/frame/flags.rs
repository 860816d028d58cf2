use bitflags::bitflags;

bitflags! {
    /// The 10 flag bits of a frame header. Some bits have different meanings depending on the
    ///  frame type, so there are several names for the same bit.
    #[derive(Debug, PartialEq, Eq, Copy, Clone)]
    pub struct FrameFlags: u16 {
        /// the frame may be ignored if it is not understood
        const IGNORE = 0x200;
        const METADATA = 0x100;

        /// more fragments of the same payload follow (request and PAYLOAD frames)
        const FOLLOWS = 0x80;
        /// KEEPALIVE: the peer is asked to respond
        const RESPOND = 0x80;
        /// SETUP: the client has a resume token
        const RESUME_ENABLE = 0x80;

        const COMPLETE = 0x40;
        /// SETUP: the client will honor LEASE frames
        const LEASE = 0x40;

        const NEXT = 0x20;
    }
}

impl FrameFlags {
    pub const MASK: u16 = 0x3FF;
    pub const TYPE_SHIFT: u16 = 10;

    pub fn from_header(type_and_flags: u16) -> FrameFlags {
        FrameFlags::from_bits_truncate(type_and_flags & Self::MASK)
    }
}
