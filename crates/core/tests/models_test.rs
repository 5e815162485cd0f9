use std::str::FromStr;

use liveclass_core::models::{
    Actor, Device, JoinGrants, PaymentStatus, Role, SessionFilter, SessionStatus, TrackSource,
};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::{from_str, json, to_string, to_value};

#[test]
fn test_role_round_trips_through_strings() {
    for role in Role::ALL {
        assert_eq!(Role::from_str(role.as_str()).unwrap(), role);
        assert_eq!(to_value(role).unwrap(), json!(role.as_str()));
    }
    assert!(Role::from_str("Teacher").is_err());
    assert!(Role::from_str("admin").is_err());
}

#[rstest]
#[case(Role::Teacher, false, false, true)]
#[case(Role::Student, false, true, false)]
#[case(Role::Parent, false, true, false)]
#[case(Role::Coordinator, true, false, true)]
#[case(Role::AcademicOperator, true, false, true)]
#[case(Role::Observer, true, false, true)]
fn test_role_capabilities(
    #[case] role: Role,
    #[case] observer: bool,
    #[case] fee_gated: bool,
    #[case] before_live: bool,
) {
    assert_eq!(role.is_observer_capable(), observer);
    assert_eq!(role.is_fee_gated(), fee_gated);
    assert_eq!(role.may_enter_before_live(), before_live);
}

#[test]
fn test_status_parsing_and_terminal_states() {
    assert_eq!(SessionStatus::from_str("live").unwrap(), SessionStatus::Live);
    assert!(SessionStatus::from_str("paused").is_err());
    assert!(SessionStatus::Ended.is_terminal());
    assert!(SessionStatus::Cancelled.is_terminal());
    assert!(!SessionStatus::Scheduled.is_terminal());
    assert!(!SessionStatus::Live.is_terminal());
}

#[rstest]
#[case(PaymentStatus::Overdue, true)]
#[case(PaymentStatus::Pending, true)]
#[case(PaymentStatus::Unpaid, false)]
#[case(PaymentStatus::Paid, false)]
#[case(PaymentStatus::Exempt, false)]
#[case(PaymentStatus::Unknown, false)]
fn test_payment_status_blocks_join(#[case] status: PaymentStatus, #[case] blocks: bool) {
    assert_eq!(status.blocks_join(), blocks);
}

#[test]
fn test_screen_device_grants_are_restricted() {
    let primary = JoinGrants::for_participant("r", Role::Teacher, Device::Primary);
    let screen = JoinGrants::for_participant("r", Role::Teacher, Device::Screen);

    assert!(primary.room_admin);
    assert!(primary.can_publish_sources.contains(&TrackSource::Camera));
    assert!(!screen.room_admin);
    assert!(!screen.can_publish_sources.contains(&TrackSource::Camera));
    assert!(!screen.can_publish_sources.contains(&TrackSource::Microphone));
    assert!(screen.can_publish_sources.contains(&TrackSource::ScreenShare));
}

#[test]
fn test_observer_grants_are_hidden() {
    for role in [Role::Coordinator, Role::AcademicOperator, Role::Observer] {
        let grants = JoinGrants::for_participant("r", role, Device::Primary);
        assert!(grants.hidden, "{role}");
        assert!(!grants.can_publish);
    }
    assert!(!JoinGrants::for_participant("r", Role::Student, Device::Primary).hidden);
}

#[test]
fn test_actor_serialization() {
    let person = Actor::person("a@b.org", Role::Coordinator);
    let system = Actor::system("auto_start");

    assert_eq!(person.label(), "a@b.org");
    assert_eq!(system.label(), "system:auto_start");
    let json = to_string(&person).unwrap();
    let back: Actor = from_str(&json).unwrap();
    assert_eq!(back, person);
}

#[test]
fn test_session_filter_deserializes_with_defaults() {
    let filter: SessionFilter = from_str(r#"{"from":"2026-10-19","to":null,"batch_id":null,"teacher_email":null}"#).unwrap();
    assert!(filter.statuses.is_empty());
    assert_eq!(filter.from.unwrap().to_string(), "2026-10-19");
}
