//! Transaction Information Flags.
//!
//! The `tif=` field of every server reply: a bitset describing how the server
//! saw the request. Flags only accumulate while a reply is being built; nothing
//! clears one flag because another was set.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// A set of transaction information flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tif(u32);

impl Tif {
    /// No flags set.
    pub const NONE: Tif = Tif(0);

    /// The server recognises the identity in `idk`.
    pub const CURRENT_ID_MATCH: Tif = Tif(0x01);

    /// The server recognises the previous identity in `pidk`.
    pub const PREVIOUS_ID_MATCH: Tif = Tif(0x02);

    /// The request came from the same IP the issuing nut was bound to.
    pub const IP_MATCH: Tif = Tif(0x04);

    /// SQRL login has been disabled for this identity.
    pub const SQRL_DISABLED: Tif = Tif(0x08);

    /// The requested command is not supported by this server.
    pub const FUNCTION_NOT_SUPPORTED: Tif = Tif(0x10);

    /// Signatures were fine but something transient got in the way; the
    /// client should retry with the `nut=` and `qry=` in this reply.
    pub const TRANSIENT_ERROR: Tif = Tif(0x20);

    /// The command could not be completed. No account state changed.
    pub const COMMAND_FAILED: Tif = Tif(0x40);

    /// The request itself was malformed or invalid.
    pub const CLIENT_FAILURE: Tif = Tif(0x80);

    /// The identity on this query conflicts with the one bound to the nut.
    pub const BAD_ID_ASSOCIATION: Tif = Tif(0x100);

    pub const fn from_bits(bits: u32) -> Self {
        Tif(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub fn set(&mut self, flag: Tif) {
        self.0 |= flag.0;
    }

    pub fn clear(&mut self, flag: Tif) {
        self.0 &= !flag.0;
    }

    /// `true` if any bit of `flag` is present.
    pub const fn has(self, flag: Tif) -> bool {
        self.0 & flag.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Tif {
    type Output = Tif;

    fn bitor(self, rhs: Tif) -> Tif {
        Tif(self.0 | rhs.0)
    }
}

impl BitOrAssign for Tif {
    fn bitor_assign(&mut self, rhs: Tif) {
        self.0 |= rhs.0;
    }
}

/// Rendered as the decimal integer that goes on the wire.
impl fmt::Display for Tif {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_are_distinct_bits() {
        let all = [
            Tif::CURRENT_ID_MATCH,
            Tif::PREVIOUS_ID_MATCH,
            Tif::IP_MATCH,
            Tif::SQRL_DISABLED,
            Tif::FUNCTION_NOT_SUPPORTED,
            Tif::TRANSIENT_ERROR,
            Tif::COMMAND_FAILED,
            Tif::CLIENT_FAILURE,
            Tif::BAD_ID_ASSOCIATION,
        ];
        let mut combined = Tif::NONE;
        for flag in all {
            assert_eq!(flag.bits().count_ones(), 1);
            assert!(!combined.has(flag));
            combined |= flag;
        }
        assert_eq!(combined.bits(), 0x1FF);
    }

    #[test]
    fn test_has() {
        assert!(Tif::IP_MATCH.has(Tif::IP_MATCH));
        assert!((Tif::CLIENT_FAILURE | Tif::COMMAND_FAILED).has(Tif::COMMAND_FAILED));
        assert!((Tif::BAD_ID_ASSOCIATION | Tif::IP_MATCH).has(Tif::IP_MATCH));
        assert!(!Tif::FUNCTION_NOT_SUPPORTED.has(Tif::IP_MATCH));
        assert!(!Tif::NONE.has(Tif::SQRL_DISABLED));
    }

    #[test]
    fn test_set_and_clear() {
        let mut tif = Tif::NONE;
        tif.set(Tif::COMMAND_FAILED);
        tif.set(Tif::CLIENT_FAILURE);
        assert_eq!(tif.bits(), 0xC0);

        tif.clear(Tif::CLIENT_FAILURE);
        assert_eq!(tif, Tif::COMMAND_FAILED);

        // Clearing an absent flag is a no-op.
        tif.clear(Tif::IP_MATCH);
        assert_eq!(tif, Tif::COMMAND_FAILED);
    }

    #[test]
    fn test_display_is_decimal() {
        assert_eq!((Tif::CURRENT_ID_MATCH | Tif::IP_MATCH).to_string(), "5");
        assert_eq!(Tif::BAD_ID_ASSOCIATION.to_string(), "256");
    }
}
