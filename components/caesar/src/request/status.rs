/// Lifecycle of a request. It only moves forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RequestStatus {
    Init,
    FastPending,
    SlowPending,
    Stable,
    Executed,
}

impl Default for RequestStatus {
    fn default() -> Self {
        RequestStatus::Init
    }
}

impl RequestStatus {
    /// is_decided returns true once the order of a request is agreed and irrevocable.
    pub fn is_decided(&self) -> bool {
        *self >= RequestStatus::Stable
    }

    pub fn is_pending(&self) -> bool {
        *self == RequestStatus::FastPending || *self == RequestStatus::SlowPending
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(b: u8) -> Option<RequestStatus> {
        match b {
            0 => Some(RequestStatus::Init),
            1 => Some(RequestStatus::FastPending),
            2 => Some(RequestStatus::SlowPending),
            3 => Some(RequestStatus::Stable),
            4 => Some(RequestStatus::Executed),
            _ => None,
        }
    }
}
