//! Integration coverage for the public wire-adjacent types: `Intents` bit
//! composition and serialization, and `DispatchEvent`'s plain-data shape.

use portcullis::{DispatchEvent, IdentifyProperties, Intents};

#[test]
fn intents_compose_and_round_trip_through_json() {
    let intents = Intents::GUILDS | Intents::GUILD_MESSAGES | Intents::DIRECT_MESSAGES;

    assert!(intents.contains(Intents::GUILDS));
    assert!(intents.contains(Intents::GUILD_MESSAGES));
    assert!(!intents.contains(Intents::GUILD_MEMBERS));

    let value = serde_json::to_value(intents).expect("intents should serialize");
    let round_tripped: Intents =
        serde_json::from_value(value).expect("intents should deserialize");

    assert_eq!(intents, round_tripped);
}

#[test]
fn empty_intents_serialize_to_zero() {
    let value = serde_json::to_value(Intents::empty()).unwrap();
    assert_eq!(value, serde_json::json!(0));
}

#[test]
fn identify_properties_carries_caller_supplied_strings() {
    let properties = IdentifyProperties::new("linux", "my-browser", "my-device");
    assert_eq!(properties.os, "linux");
    assert_eq!(properties.browser, "my-browser");
    assert_eq!(properties.device, "my-device");
}

#[test]
fn dispatch_event_is_plain_data() {
    let event = DispatchEvent {
        name: "MESSAGE_CREATE".to_owned(),
        data: serde_json::json!({ "content": "hi" }),
        seq: 42,
    };

    assert_eq!(event.name, "MESSAGE_CREATE");
    assert_eq!(event.seq, 42);
    assert_eq!(event.data["content"], "hi");
}
