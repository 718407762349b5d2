//! Tests for derived occurrence status, identity and zone handling.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::America::Los_Angeles;
use chrono_tz::Asia::Tokyo;

use cadence_engine::activity::{occurrence_guid, parse_occurrence_guid};
use cadence_engine::{Activity, ActivityStatus, DstPolicy, ScheduledActivity};

fn instant(rfc3339: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc)
}

fn local(d: u32, h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2015, 4, d)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
}

fn occurrence(scheduled: Option<NaiveDateTime>, expires: Option<NaiveDateTime>) -> ScheduledActivity {
    ScheduledActivity {
        guid: "plan-1:activity-1:2015-04-12T13:00:00".to_string(),
        owner_id: "owner-1".to_string(),
        schedule_plan_guid: "plan-1".to_string(),
        activity: Activity::survey("activity-1", "Mood survey", "survey-guid"),
        local_scheduled_on: scheduled,
        local_expires_on: expires,
        started_on: None,
        finished_on: None,
        persistent: false,
        time_zone: None,
    }
}

// ---------------------------------------------------------------------------
// Status rules
// ---------------------------------------------------------------------------

#[test]
fn finished_without_start_or_window_is_deleted() {
    let mut o = occurrence(None, None);
    o.finished_on = Some(instant("2015-04-12T10:00:00Z"));
    assert_eq!(o.status(instant("2015-04-12T11:00:00Z")), ActivityStatus::Deleted);
}

#[test]
fn finished_with_window_or_start_is_finished() {
    let now = instant("2015-04-12T11:00:00Z");
    let mut scheduled = occurrence(Some(local(12, 13)), Some(local(12, 23)));
    scheduled.finished_on = Some(now);
    assert_eq!(scheduled.status(now), ActivityStatus::Finished);

    let mut started = occurrence(None, None);
    started.started_on = Some(now);
    started.finished_on = Some(now);
    assert_eq!(started.status(now), ActivityStatus::Finished);
}

#[test]
fn started_is_started_even_after_expiry() {
    let mut o = occurrence(Some(local(12, 13)), Some(local(12, 23)));
    o.started_on = Some(instant("2015-04-12T14:00:00Z"));
    assert_eq!(o.status(instant("2015-04-20T00:00:00Z")), ActivityStatus::Started);
}

#[test]
fn no_window_is_available() {
    assert_eq!(
        occurrence(None, None).status(instant("2015-04-12T11:00:00Z")),
        ActivityStatus::Available
    );
}

#[test]
fn window_drives_scheduled_available_expired() {
    let o = occurrence(Some(local(12, 13)), Some(local(12, 23)));
    assert_eq!(o.status(instant("2015-04-12T12:59:59Z")), ActivityStatus::Scheduled);
    assert_eq!(o.status(instant("2015-04-12T13:00:00Z")), ActivityStatus::Available);
    assert_eq!(o.status(instant("2015-04-12T23:00:00Z")), ActivityStatus::Available);
    assert_eq!(o.status(instant("2015-04-12T23:00:01Z")), ActivityStatus::Expired);
}

#[test]
fn no_expiry_stays_available() {
    let o = occurrence(Some(local(12, 13)), None);
    assert_eq!(o.status(instant("2016-01-01T00:00:00Z")), ActivityStatus::Available);
}

// ---------------------------------------------------------------------------
// Zones
// ---------------------------------------------------------------------------

#[test]
fn status_reads_now_in_attached_zone() {
    let now = instant("2015-04-12T19:30:00Z");
    let o = occurrence(Some(local(12, 13)), Some(local(12, 23)));
    assert_eq!(o.status(now), ActivityStatus::Available);
    assert_eq!(o.clone().with_time_zone(Los_Angeles).status(now), ActivityStatus::Scheduled);
}

#[test]
fn changing_zone_keeps_wall_clock_time() {
    let pacific = occurrence(Some(local(12, 13)), Some(local(12, 23))).with_time_zone(Los_Angeles);
    let tokyo = pacific.clone().with_time_zone(Tokyo);

    assert_eq!(tokyo.local_scheduled_on, pacific.local_scheduled_on);
    assert_eq!(tokyo.local_expires_on, pacific.local_expires_on);
    assert_eq!(
        pacific.scheduled_on(DstPolicy::default()).unwrap().to_rfc3339(),
        "2015-04-12T13:00:00-07:00"
    );
    assert_eq!(
        tokyo.scheduled_on(DstPolicy::default()).unwrap().to_rfc3339(),
        "2015-04-12T13:00:00+09:00"
    );
}

#[test]
fn zone_is_not_serialized() {
    let o = occurrence(Some(local(12, 13)), None).with_time_zone(Los_Angeles);
    let json = serde_json::to_value(&o).unwrap();
    assert_eq!(json["localScheduledOn"], "2015-04-12T13:00:00");
    assert!(json.get("timeZone").is_none());

    let back: ScheduledActivity = serde_json::from_value(json).unwrap();
    assert_eq!(back.time_zone, None);
    assert_eq!(back.local_scheduled_on, o.local_scheduled_on);
}

#[test]
fn view_carries_offset_and_status() {
    let o = occurrence(Some(local(12, 13)), Some(local(12, 23))).with_time_zone(Los_Angeles);
    let view = o.to_view(instant("2015-04-12T21:00:00Z"), DstPolicy::default());
    let json = serde_json::to_value(&view).unwrap();
    assert_eq!(json["scheduledOn"], "2015-04-12T13:00:00-07:00");
    assert_eq!(json["expiresOn"], "2015-04-12T23:00:00-07:00");
    assert_eq!(json["status"], "available");
    assert!(json.get("startedOn").is_none());
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

#[test]
fn identity_round_trips() {
    let guid = occurrence_guid("plan-1", "activity-1", local(12, 13));
    assert_eq!(guid, "plan-1:activity-1:2015-04-12T13:00:00");
    assert_eq!(
        parse_occurrence_guid(&guid),
        Some(("plan-1", "activity-1", local(12, 13)))
    );
    assert_eq!(parse_occurrence_guid("legacy"), None);
}
