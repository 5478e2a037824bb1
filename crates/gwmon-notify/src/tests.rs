use crate::channels::telegram::{build_payload, TelegramChannel};
use crate::InlineAction;

#[test]
fn payload_without_actions_has_no_keyboard() {
    let payload = build_payload("-100123", "gateway is healthy", &[]);
    assert_eq!(payload["chat_id"], "-100123");
    assert_eq!(payload["text"], "gateway is healthy");
    assert_eq!(payload["parse_mode"], "HTML");
    assert!(payload.get("reply_markup").is_none());
}

#[test]
fn payload_with_actions_renders_one_keyboard_row() {
    let actions = vec![
        InlineAction::new("Mute 1h", "mute:3600"),
        InlineAction::new("Mute category", "mute:resources"),
    ];
    let payload = build_payload("42", "<b>CPU high</b>", &actions);

    let row = &payload["reply_markup"]["inline_keyboard"][0];
    assert_eq!(row.as_array().map(|r| r.len()), Some(2));
    assert_eq!(row[0]["text"], "Mute 1h");
    assert_eq!(row[0]["callback_data"], "mute:3600");
    assert_eq!(row[1]["callback_data"], "mute:resources");
}

#[test]
fn channel_rejects_empty_identity() {
    assert!(TelegramChannel::new("", "42").is_err());
    assert!(TelegramChannel::new("token", "").is_err());
    assert!(TelegramChannel::new("token", "42").is_ok());
}
