use core::fmt::{self, Display, Formatter};

/// SMTP reply codes used by the server.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Status {
    ServiceReady,
    GoodBye,
    AuthSuccessful,
    Ok,
    AuthContinue,
    StartMailInput,
    Unavailable,
    InsufficientStorage,
    Unrecognised,
    SyntaxError,
    UnsupportedAuth,
    StartTlsRequired,
    InvalidCredentials,
    Error,
    ExceededStorage,
    /// Any other code, passed through as-is.
    Unknown(u32),
}

const NAMED: [Status; 15] = [
    Status::ServiceReady,
    Status::GoodBye,
    Status::AuthSuccessful,
    Status::Ok,
    Status::AuthContinue,
    Status::StartMailInput,
    Status::Unavailable,
    Status::InsufficientStorage,
    Status::Unrecognised,
    Status::SyntaxError,
    Status::UnsupportedAuth,
    Status::StartTlsRequired,
    Status::InvalidCredentials,
    Status::Error,
    Status::ExceededStorage,
];

impl Status {
    /// The three digit code sent on the wire.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::ServiceReady => 220,
            Self::GoodBye => 221,
            Self::AuthSuccessful => 235,
            Self::Ok => 250,
            Self::AuthContinue => 334,
            Self::StartMailInput => 354,
            Self::Unavailable => 421,
            Self::InsufficientStorage => 452,
            Self::Unrecognised => 500,
            Self::SyntaxError => 501,
            Self::UnsupportedAuth => 504,
            Self::StartTlsRequired => 530,
            Self::InvalidCredentials => 535,
            Self::Error => 550,
            Self::ExceededStorage => 552,
            Self::Unknown(code) => code,
        }
    }
}

impl From<u32> for Status {
    fn from(value: u32) -> Self {
        NAMED
            .into_iter()
            .find(|status| status.code() == value)
            .unwrap_or(Self::Unknown(value))
    }
}

impl From<Status> for u32 {
    fn from(value: Status) -> Self {
        value.code()
    }
}

impl Display for Status {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(fmt, "{}", self.code())
    }
}
