/// Close codes.
pub mod close_code {
    pub const NORMAL: u16 = 1000;
    pub const NO_STATUS: u16 = 1005;
    pub const ABNORMAL: u16 = 1006;

    pub const UNKNOWN_ERROR: u16 = 4000;
    pub const UNKNOWN_OPCODE: u16 = 4001;
    pub const DECODE_ERROR: u16 = 4002;
    pub const NOT_AUTHENTICATED: u16 = 4003;
    pub const AUTHENTICATION_FAILED: u16 = 4004;
    pub const ALREADY_AUTHENTICATED: u16 = 4005;
    pub const INVALID_SEQ: u16 = 4007;
    pub const RATE_LIMITED: u16 = 4008;
    pub const SESSION_TIMED_OUT: u16 = 4009;
    pub const INVALID_SHARD: u16 = 4010;
    pub const SHARDING_REQUIRED: u16 = 4011;
    pub const INVALID_API_VERSION: u16 = 4012;
    pub const INVALID_INTENTS: u16 = 4013;
    pub const DISALLOWED_INTENTS: u16 = 4014;
}

use close_code::*;

/// Every close code the protocol defines, and whether the session survives it.
const RESUMABLE: &[(u16, bool)] = &[
    (UNKNOWN_ERROR, true),
    (UNKNOWN_OPCODE, true),
    (DECODE_ERROR, true),
    (NOT_AUTHENTICATED, true),
    (AUTHENTICATION_FAILED, false),
    (ALREADY_AUTHENTICATED, true),
    (INVALID_SEQ, true),
    (RATE_LIMITED, true),
    (SESSION_TIMED_OUT, true),
    (INVALID_SHARD, false),
    (SHARDING_REQUIRED, false),
    (INVALID_API_VERSION, false),
    (INVALID_INTENTS, false),
    (DISALLOWED_INTENTS, false),
];

/// Whether a socket closed with `code` may be resumed. Codes the protocol
/// does not define are treated as fatal.
pub fn resumable(code: u16) -> bool {
    RESUMABLE
        .iter()
        .find(|(known, _)| *known == code)
        .is_some_and(|(_, resumable)| *resumable)
}
