//! Integration coverage for `Config`/`ConfigBuilder` from outside the crate,
//! the way a real caller would build one.

use portcullis::{Config, IdentifyProperties, Intents, LargeThresholdErrorType};

#[test]
fn defaults_match_documented_values() {
    let config = Config::builder("Bot abc").build();

    assert_eq!(config.token(), "Bot abc");
    assert_eq!(config.intents(), Intents::empty());
    assert!(config.zlib_stream());
    assert!(config.reconnect());
}

#[test]
fn builder_methods_compose() {
    let config = Config::builder("Bot abc")
        .intents(Intents::GUILDS | Intents::GUILD_MESSAGES)
        .zlib_stream(false)
        .large_threshold(200)
        .expect("200 is within 50..=250")
        .presence(serde_json::json!({ "status": "online" }))
        .identify_properties(IdentifyProperties::new("linux", "portcullis", "portcullis"))
        .reconnect(false)
        .build();

    assert_eq!(
        config.intents(),
        Intents::GUILDS | Intents::GUILD_MESSAGES
    );
    assert!(!config.zlib_stream());
    assert!(!config.reconnect());
}

#[test]
fn large_threshold_below_minimum_is_rejected() {
    let error = Config::builder("Bot abc").large_threshold(49).unwrap_err();
    assert!(matches!(
        error.kind(),
        LargeThresholdErrorType::TooFew { value: 49 }
    ));
}

#[test]
fn large_threshold_above_maximum_is_rejected() {
    let error = Config::builder("Bot abc")
        .large_threshold(251)
        .unwrap_err();
    assert!(matches!(
        error.kind(),
        LargeThresholdErrorType::TooMany { value: 251 }
    ));
}

#[test]
fn large_threshold_bounds_are_accepted() {
    let _ = Config::builder("Bot abc").large_threshold(50).unwrap().build();
    let _ = Config::builder("Bot abc").large_threshold(250).unwrap().build();
}
