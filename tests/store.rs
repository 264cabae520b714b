//! Integration tests for the channel store: lookup, parts, views, records.

use channelpack::{
    Channel, ChannelId, ChannelStore, Conditions, ErrorCategory, PackError, Value, View,
};

fn sample() -> ChannelStore {
    ChannelStore::from_channels([
        (0, Channel::from(vec!["A", "A", "C", "D", "D", "A"])),
        (1, Channel::Integer(vec![0, 30, 60, 90, 120, 150])),
        (4, Channel::Float(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])),
    ])
    .unwrap()
    .with_names([(0, "txtdata"), (1, "RPT"), (4, "VG_STOP")])
}

#[test]
fn identifiers_resolve_through_three_tiers() {
    let store = sample();
    let by_key = store.get(4, None, None).unwrap().into_owned();
    let by_name = store.get("VG_STOP", None, None).unwrap().into_owned();
    let by_fallback = store.get("ch4", None, None).unwrap().into_owned();
    assert_eq!(by_key, by_name);
    assert_eq!(by_name, by_fallback);

    let err = store.get("ch3", None, None).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Lookup);
    assert!(store.get(ChannelId::Key(2), None, None).is_err());
}

#[test]
fn replacing_data_resets_the_mask() {
    let mut store = sample();
    store.set_mask(vec![false; 6]).unwrap();
    assert!(store.parts().is_empty());

    store.insert(1, Channel::Integer(vec![1; 6])).unwrap();
    assert_eq!(store.mask(), &[true; 6]);
    assert_eq!(store.parts(), vec![0]);
}

#[test]
fn mask_and_channel_lengths_are_checked() {
    let mut store = sample();
    let err = store.set_mask(vec![true; 5]).unwrap_err();
    assert!(matches!(err, PackError::LengthMismatch { expected: 6, found: 5, .. }));

    let err = store.insert(9, vec![1.0, 2.0]).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Validation);
    assert!(ChannelStore::from_channels([(0, vec![1.0]), (1, vec![1.0, 2.0])]).is_err());
}

#[test]
fn parts_and_views() {
    let mut store = sample();
    store
        .set_mask(vec![true, true, false, false, true, true])
        .unwrap();
    assert_eq!(store.parts(), vec![0, 1]);
    assert_eq!(
        store.get("RPT", Some(1), None).unwrap().into_owned(),
        Channel::Integer(vec![120, 150])
    );
    assert_eq!(
        store.get("RPT", Some(2), Some(View::Filter)).unwrap_err(),
        PackError::PartOutOfRange { part: 2, count: 2 }
    );

    store.set_view(View::Filter);
    assert_eq!(
        store.get("txtdata", None, None).unwrap().into_owned(),
        Channel::from(vec!["A", "A", "D", "A"])
    );
    let nan = store.get("txtdata", None, Some(View::Nan)).unwrap().into_owned();
    assert_eq!(nan.value(2), Some(Value::Null));
    assert_eq!(nan.value(3), Some(Value::Null));
    assert_eq!(nan.value(4), Some(Value::Text("D".into())));
}

#[test]
fn records_follow_names_and_view() {
    let mut store = sample();
    store.set_mask(vec![false, true, true, false, false, false]).unwrap();

    let records: Vec<_> = store.records(None, Some(View::Filter), false).unwrap().collect();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].fields(), ["txtdata", "RPT", "VG_STOP"]);
    assert_eq!(records[1].get("RPT"), Some(&Value::Integer(60)));
    assert_eq!(records[1][2], Value::Float(3.0));

    // a fresh iterator starts over
    assert_eq!(store.records(None, Some(View::Filter), false).unwrap().count(), 2);
}

#[test]
fn records_of_one_part() {
    let mut store = sample();
    store.set_mask(vec![true, false, false, true, true, false]).unwrap();

    let second: Vec<_> = store.records(Some(1), None, false).unwrap().collect();
    assert_eq!(second.len(), 2);
    assert_eq!(second[0].get("RPT"), Some(&Value::Integer(90)));
    assert_eq!(second[1].get("RPT"), Some(&Value::Integer(120)));
    assert!(matches!(
        store.records(Some(2), None, false),
        Err(PackError::PartOutOfRange { part: 2, count: 2 })
    ));
}

#[test]
fn unusable_field_names_need_fallback() {
    let mut store = sample();
    store.set_names([(0, "text data"), (1, "RPT"), (4, "VG_STOP")]);
    assert!(matches!(
        store.records(None, None, false),
        Err(PackError::InvalidFieldName(name)) if name == "text data"
    ));

    let records = store.records(None, None, true).unwrap();
    assert_eq!(records.fields(), ["ch0", "ch1", "ch4"]);
    assert_eq!(records.len(), 6);
}

#[test]
fn append_concatenates_and_resets() {
    let mut left = ChannelStore::from_channels([(0, vec![1i64, 2]), (1, vec![3i64, 4])]).unwrap();
    left.set_mask(vec![false, true]).unwrap();
    let right = ChannelStore::from_channels([
        (0, Channel::Float(vec![2.5])),
        (1, Channel::Integer(vec![5])),
    ])
    .unwrap();

    left.append(right).unwrap();
    assert_eq!(left.len(), 3);
    assert_eq!(left.mask(), &[true; 3]);
    assert_eq!(left.channel(0).unwrap(), &Channel::Float(vec![1.0, 2.0, 2.5]));
    assert_eq!(left.channel(1).unwrap(), &Channel::Integer(vec![3, 4, 5]));

    let other = ChannelStore::from_channels([(7, vec![1i64])]).unwrap();
    assert!(matches!(left.append(other), Err(PackError::KeySetMismatch(_))));
}

#[test]
fn empty_store_adopts_appended_data() {
    let mut store = ChannelStore::new();
    assert!(store.is_empty());
    store.append(sample()).unwrap();
    assert_eq!(store.len(), 6);
    assert_eq!(store.names().get(&1).map(String::as_str), Some("RPT"));
}

#[test]
fn conditions_drive_parts() {
    let mut store = sample();
    let mut conditions = Conditions::new();
    conditions.cond.push("(%('txtdata') == 'A') | (%('txtdata') == 'D')".into());
    store.apply_conditions(&conditions).unwrap();
    assert_eq!(store.mask(), &[true, true, false, true, true, true]);
    assert_eq!(store.parts(), vec![0, 1]);

    conditions.cond.push("%('RPT') >= 90".into());
    store.apply_conditions(&conditions).unwrap();
    assert_eq!(store.parts(), vec![0]);
    assert_eq!(
        store.get("txtdata", Some(0), None).unwrap().into_owned(),
        Channel::from(vec!["D", "D", "A"])
    );
}

#[test]
fn unknown_channel_in_condition_is_an_expression_error() {
    let mut store = sample();
    let mut conditions = Conditions::new();
    conditions.cond.push("%('nope') > 1".into());
    let err = store.apply_conditions(&conditions).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Expression);
    assert_eq!(store.mask(), &[true; 6]);
}
