use num_enum::{IntoPrimitive, TryFromPrimitive};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum FrameType {
    Setup = 0x01,
    Lease = 0x02,
    KeepAlive = 0x03,
    RequestResponse = 0x04,
    RequestFnF = 0x05,
    RequestStream = 0x06,
    RequestChannel = 0x07,
    RequestN = 0x08,
    Cancel = 0x09,
    Payload = 0x0A,
    Error = 0x0B,
    MetadataPush = 0x0C,
    Resume = 0x0D,
    ResumeOk = 0x0E,
    Extension = 0x3F,
}

impl FrameType {
    /// frame types that open a new stream
    pub fn is_request(self) -> bool {
        matches!(self, FrameType::RequestFnF | FrameType::RequestResponse | FrameType::RequestStream | FrameType::RequestChannel)
    }

    pub fn has_initial_request(self) -> bool {
        matches!(self, FrameType::RequestStream | FrameType::RequestChannel)
    }

    /// frame types whose body is (or ends in) a payload, which is where the METADATA flag applies
    pub fn has_payload(self) -> bool {
        self.is_request()
            || matches!(self, FrameType::Payload | FrameType::Setup | FrameType::Extension)
    }

    pub fn name(self) -> &'static str {
        match self {
            FrameType::Setup => "SETUP",
            FrameType::Lease => "LEASE",
            FrameType::KeepAlive => "KEEPALIVE",
            FrameType::RequestResponse => "REQUEST_RESPONSE",
            FrameType::RequestFnF => "REQUEST_FNF",
            FrameType::RequestStream => "REQUEST_STREAM",
            FrameType::RequestChannel => "REQUEST_CHANNEL",
            FrameType::RequestN => "REQUEST_N",
            FrameType::Cancel => "CANCEL",
            FrameType::Payload => "PAYLOAD",
            FrameType::Error => "ERROR",
            FrameType::MetadataPush => "METADATA_PUSH",
            FrameType::Resume => "RESUME",
            FrameType::ResumeOk => "RESUME_OK",
            FrameType::Extension => "EXT",
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use super::*;

    #[rstest]
    #[case::fnf(FrameType::RequestFnF, true, false)]
    #[case::response(FrameType::RequestResponse, true, false)]
    #[case::stream(FrameType::RequestStream, true, true)]
    #[case::channel(FrameType::RequestChannel, true, true)]
    #[case::payload(FrameType::Payload, false, false)]
    #[case::request_n(FrameType::RequestN, false, false)]
    fn test_request_types(#[case] frame_type: FrameType, #[case] is_request: bool, #[case] has_initial_request: bool) {
        assert_eq!(frame_type.is_request(), is_request);
        assert_eq!(frame_type.has_initial_request(), has_initial_request);
    }

    #[rstest]
    #[case::reserved(0x00)]
    #[case::gap(0x0F)]
    #[case::below_extension(0x3E)]
    fn test_unknown_codes(#[case] code: u8) {
        assert!(FrameType::try_from(code).is_err());
    }

    #[test]
    fn test_extension_code() {
        assert_eq!(FrameType::try_from(0x3Fu8).unwrap(), FrameType::Extension);
        assert_eq!(u8::from(FrameType::Payload), 0x0A);
    }
}
