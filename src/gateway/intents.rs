pub const GUILDS: u64 = 1 << 0;
pub const GUILD_MEMBERS: u64 = 1 << 1;
pub const GUILD_MODERATION: u64 = 1 << 2;
pub const GUILD_EMOJIS_AND_STICKERS: u64 = 1 << 3;
pub const GUILD_INTEGRATIONS: u64 = 1 << 4;
pub const GUILD_WEBHOOKS: u64 = 1 << 5;
pub const GUILD_INVITES: u64 = 1 << 6;
pub const GUILD_VOICE_STATES: u64 = 1 << 7;
pub const GUILD_PRESENCES: u64 = 1 << 8;
pub const GUILD_MESSAGES: u64 = 1 << 9;
pub const GUILD_MESSAGE_REACTIONS: u64 = 1 << 10;
pub const GUILD_MESSAGE_TYPING: u64 = 1 << 11;
pub const DIRECT_MESSAGES: u64 = 1 << 12;
pub const DIRECT_MESSAGE_REACTIONS: u64 = 1 << 13;
pub const DIRECT_MESSAGE_TYPING: u64 = 1 << 14;
pub const MESSAGE_CONTENT: u64 = 1 << 15;
pub const GUILD_SCHEDULED_EVENTS: u64 = 1 << 16;
pub const AUTO_MODERATION_CONFIGURATION: u64 = 1 << 20;
pub const AUTO_MODERATION_EXECUTION: u64 = 1 << 21;

/// All valid intent names.
pub const ALL_INTENTS: &[(&str, u64)] = &[
    ("guilds", GUILDS),
    ("guild_members", GUILD_MEMBERS),
    ("guild_moderation", GUILD_MODERATION),
    ("guild_emojis_and_stickers", GUILD_EMOJIS_AND_STICKERS),
    ("guild_integrations", GUILD_INTEGRATIONS),
    ("guild_webhooks", GUILD_WEBHOOKS),
    ("guild_invites", GUILD_INVITES),
    ("guild_voice_states", GUILD_VOICE_STATES),
    ("guild_presences", GUILD_PRESENCES),
    ("guild_messages", GUILD_MESSAGES),
    ("guild_message_reactions", GUILD_MESSAGE_REACTIONS),
    ("guild_message_typing", GUILD_MESSAGE_TYPING),
    ("direct_messages", DIRECT_MESSAGES),
    ("direct_message_reactions", DIRECT_MESSAGE_REACTIONS),
    ("direct_message_typing", DIRECT_MESSAGE_TYPING),
    ("message_content", MESSAGE_CONTENT),
    ("guild_scheduled_events", GUILD_SCHEDULED_EVENTS),
    ("auto_moderation_configuration", AUTO_MODERATION_CONFIGURATION),
    ("auto_moderation_execution", AUTO_MODERATION_EXECUTION),
];

/// Intents that must be enabled for the application before the gateway
/// accepts them.
pub const PRIVILEGED_INTENTS: u64 = GUILD_MEMBERS | GUILD_PRESENCES | MESSAGE_CONTENT;

/// Parse a comma-separated list of intent names and/or raw bitmasks.
/// Returns the first entry that is neither.
pub fn parse(list: &str) -> Result<u64, String> {
    let mut bits = 0;
    for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        if let Ok(raw) = entry.parse::<u64>() {
            bits |= raw;
            continue;
        }
        let name = entry.to_lowercase();
        match ALL_INTENTS.iter().find(|(n, _)| *n == name) {
            Some((_, bit)) => bits |= bit,
            None => return Err(entry.to_string()),
        }
    }
    Ok(bits)
}

/// Names of the intents set in `bits`.
pub fn names(bits: u64) -> Vec<&'static str> {
    ALL_INTENTS
        .iter()
        .filter(|(_, bit)| bits & bit != 0)
        .map(|(name, _)| *name)
        .collect()
}

pub fn has_privileged(bits: u64) -> bool {
    bits & PRIVILEGED_INTENTS != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        assert_eq!(parse("guilds, guild_messages").unwrap(), GUILDS | GUILD_MESSAGES);
        assert_eq!(parse("GUILDS").unwrap(), GUILDS);
    }

    #[test]
    fn test_parse_mixes_numbers_and_names() {
        assert_eq!(parse("512,direct_messages").unwrap(), GUILD_MESSAGES | DIRECT_MESSAGES);
    }

    #[test]
    fn test_parse_empty_is_zero() {
        assert_eq!(parse("").unwrap(), 0);
        assert_eq!(parse(" , ").unwrap(), 0);
    }

    #[test]
    fn test_parse_unknown_name() {
        assert_eq!(parse("guilds,not_an_intent").unwrap_err(), "not_an_intent");
    }

    #[test]
    fn test_names_round_trip() {
        let bits = GUILDS | MESSAGE_CONTENT | AUTO_MODERATION_EXECUTION;
        assert_eq!(
            names(bits),
            vec!["guilds", "message_content", "auto_moderation_execution"]
        );
    }

    #[test]
    fn test_privileged() {
        assert!(has_privileged(GUILDS | MESSAGE_CONTENT));
        assert!(!has_privileged(GUILDS | GUILD_MESSAGES));
    }
}
