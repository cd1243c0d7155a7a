quick_error! {
    /// DecodeError is a malformed message received from a peer.
    /// It only affects the message being decoded.
    #[derive(Debug, Eq, PartialEq)]
    pub enum DecodeError {
        UnknownType(t: u8) {
            display("unknown message type: {}", t)
        }

        Truncated(field: &'static str, want: usize, remain: usize) {
            display("truncated {}: want {} bytes, remain {}", field, want, remain)
        }

        BadLength(field: &'static str, len: i32) {
            display("invalid length of {}: {}", field, len)
        }

        BadStatus(field: &'static str, b: u8) {
            display("invalid {}: {}", field, b)
        }

        Trailing(n: usize) {
            display("{} trailing bytes", n)
        }
    }
}
