use s13_core::limits::{CHANNELS, PWM_NEUTRAL_US};
use s13_core::S13Error;
use s13_seq::SequenceStore;

const FIXTURE: &str = r#"{
  "sequences": {
    "wave": {
      "id": 3,
      "description": "front-leg wave",
      "frames": [
        { "servo_us": [1500, 1600, 1500, 1500, 1500, 1500, 1500, 1500], "t_ms": 200 },
        { "servo_us": [1500, 1400, 1500, 1500, 1500, 1500, 1500, 1500], "t_ms": 200 },
        { "servo_us": [1500, 1500, 1500, 1500, 1500, 1500, 1500, 1500] }
      ]
    },
    "crouch": {
      "id": 1,
      "frames": [
        { "servo_us": [1200, 1200], "t_ms": 500 }
      ]
    }
  }
}"#;

#[test]
fn parses_sequences_and_frames() {
    let store = SequenceStore::parse(FIXTURE).unwrap();
    assert_eq!(store.len(), 2);
    assert!(store.contains("wave"));
    assert_eq!(store.names().collect::<Vec<_>>(), vec!["crouch", "wave"]);

    let wave = store.get("wave").unwrap();
    assert_eq!(wave.id, 3);
    assert_eq!(wave.description, "front-leg wave");
    assert_eq!(wave.frames.len(), 3);
    assert_eq!(wave.frames[0].servo_us[1], 1600);
    assert_eq!(wave.frames[0].t_ms, 200);
    // t_ms falls back to 100 when omitted.
    assert_eq!(wave.frames[2].t_ms, 100);

    assert_eq!(store.by_id(1).unwrap().name, "crouch");
    assert!(store.by_id(99).is_none());
}

#[test]
fn short_frames_fill_with_neutral() {
    let store = SequenceStore::parse(FIXTURE).unwrap();
    let crouch = store.get("crouch").unwrap();
    assert_eq!(crouch.frames[0].servo_us[0], 1200);
    assert_eq!(crouch.frames[0].servo_us[1], 1200);
    for ch in 2..8 {
        assert_eq!(crouch.frames[0].servo_us[ch], PWM_NEUTRAL_US);
    }
}

#[test]
fn legacy_expansion_keeps_extras_neutral() {
    let store = SequenceStore::parse(FIXTURE).unwrap();
    let frame = &store.get("crouch").unwrap().frames[0];
    let pose = frame.expand();
    assert_eq!(pose.len(), CHANNELS);
    assert_eq!(pose[0], 1200);
    for ch in 8..CHANNELS {
        assert_eq!(pose[ch], PWM_NEUTRAL_US, "channel {} not neutral", ch);
    }
}

#[test]
fn iterator_walks_frames_in_order() {
    let store = SequenceStore::parse(FIXTURE).unwrap();
    let wave = store.get("wave").unwrap();

    let mut iter = wave.iter();
    assert_eq!(iter.total(), 3);
    assert!(!iter.is_complete());

    let mut seen = 0;
    while let Some(frame) = iter.current() {
        assert_eq!(frame.t_ms, wave.frames[seen].t_ms);
        iter.advance();
        seen += 1;
    }
    assert_eq!(seen, 3);
    assert!(iter.is_complete());

    iter.reset();
    assert_eq!(iter.position(), 0);
    assert!(!iter.is_complete());
}

#[test]
fn unknown_sequence_is_none() {
    let store = SequenceStore::parse(FIXTURE).unwrap();
    assert!(store.get("moonwalk").is_none());
}

#[test]
fn malformed_json_is_a_config_error() {
    assert_eq!(
        SequenceStore::parse("{ not json").unwrap_err(),
        S13Error::Config
    );
    // Valid JSON with the wrong shape is rejected the same way.
    assert_eq!(
        SequenceStore::parse(r#"{"frames": []}"#).unwrap_err(),
        S13Error::Config
    );
}

#[test]
fn loads_from_disk() {
    let dir = std::env::temp_dir();
    let path = dir.join("s13_seq_store_test.json");
    std::fs::write(&path, FIXTURE).unwrap();

    let store = SequenceStore::load_file(&path).unwrap();
    assert_eq!(store.len(), 2);
    std::fs::remove_file(&path).ok();

    assert_eq!(
        SequenceStore::load_file(dir.join("s13_seq_missing.json")).unwrap_err(),
        S13Error::Config
    );
}
