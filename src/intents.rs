//! The gateway intents bitmask.
//!
//! Composing intents from the event categories a bot cares about is an
//! external concern (see spec's "Out of scope" list) — this type only needs
//! to carry the numeric bitmask Discord's `Identify` payload expects, and
//! round-trip it through JSON as a plain integer.

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

bitflags! {
    /// A bitmask of gateway intents.
    ///
    /// Only a handful of named, non-privileged constants are provided; any
    /// additional bits Discord introduces can still be requested via
    /// [`Intents::from_bits_retain`].
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct Intents: u64 {
        const GUILDS = 1 << 0;
        const GUILD_MEMBERS = 1 << 1;
        const GUILD_MODERATION = 1 << 2;
        const GUILD_EMOJIS_AND_STICKERS = 1 << 3;
        const GUILD_INTEGRATIONS = 1 << 4;
        const GUILD_WEBHOOKS = 1 << 5;
        const GUILD_INVITES = 1 << 6;
        const GUILD_VOICE_STATES = 1 << 7;
        const GUILD_PRESENCES = 1 << 8;
        const GUILD_MESSAGES = 1 << 9;
        const GUILD_MESSAGE_REACTIONS = 1 << 10;
        const GUILD_MESSAGE_TYPING = 1 << 11;
        const DIRECT_MESSAGES = 1 << 12;
        const DIRECT_MESSAGE_REACTIONS = 1 << 13;
        const DIRECT_MESSAGE_TYPING = 1 << 14;
        const MESSAGE_CONTENT = 1 << 15;
        const GUILD_SCHEDULED_EVENTS = 1 << 16;
    }
}

impl Serialize for Intents {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.bits())
    }
}

impl<'de> Deserialize<'de> for Intents {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = u64::deserialize(deserializer)?;

        Ok(Intents::from_bits_retain(bits))
    }
}

#[cfg(test)]
mod tests {
    use super::Intents;

    #[test]
    fn bits_round_trip() {
        let intents = Intents::GUILDS | Intents::GUILD_MESSAGES;
        assert_eq!(intents.bits(), 0b10_0000_0001);

        let json = serde_json::to_string(&intents).unwrap();
        let back: Intents = serde_json::from_str(&json).unwrap();
        assert_eq!(intents, back);
    }

    #[test]
    fn unknown_bits_are_retained() {
        let intents = Intents::from_bits_retain(1 << 20);
        assert_eq!(intents.bits(), 1 << 20);
    }
}
